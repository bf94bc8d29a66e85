use cellcut_core::config::EvaluationConfig;
use cellcut_core::{
    dependencies, evaluate, parse, BoundingBox, CancellationToken, CellTable, Evaluator,
    ExprError, JobControl, JobInterrupt, WarningKind,
};

fn boxes(count: usize) -> Vec<BoundingBox> {
    (0..count)
        .map(|index| {
            let x = index as f64 * 30.0;
            BoundingBox::new(x, 0.0, x + 20.0, 20.0)
        })
        .collect()
}

fn table_with(columns: &[(&str, Vec<f64>)]) -> CellTable {
    let count = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
    let mut table = CellTable::new(boxes(count));
    for (name, values) in columns {
        table.insert_column(*name, values.clone()).unwrap();
    }
    table
}

fn skewed_areas() -> Vec<f64> {
    // 1, 4, 9, ... 10000: non-degenerate and right-skewed.
    (1..=100).map(|value| (value * value) as f64).collect()
}

#[test]
fn area_above_mean_selects_a_strict_subset() {
    let areas = skewed_areas();
    let table = table_with(&[("area", areas.clone())]);
    let parsed = parse("area > mean(area)").unwrap();

    let outcome = evaluate(&parsed, &table).unwrap();
    assert_eq!(outcome.mask.len(), 100);
    let selected = outcome.selected_count();
    assert!(selected > 0 && selected < 100);

    let mean = areas.iter().sum::<f64>() / areas.len() as f64;
    for index in outcome.selected_indices() {
        assert!(areas[index] >= mean);
    }
    assert!(outcome.warnings.is_empty());
}

#[test]
fn evaluation_is_idempotent() {
    let table = table_with(&[("area", skewed_areas()), ("intensity", vec![0.5; 100])]);
    let parsed = parse("area > median(area) and not intensity < 0.1").unwrap();
    let first = evaluate(&parsed, &table).unwrap();
    let second = evaluate(&parsed, &table).unwrap();
    assert_eq!(first, second);
}

#[test]
fn chunking_does_not_change_the_mask() {
    let table = table_with(&[("area", skewed_areas())]);
    let parsed = parse("area >= percentile(area, 90) or area < std(area) / 10").unwrap();

    let whole = evaluate(&parsed, &table).unwrap();
    let chunked = Evaluator::new(&EvaluationConfig {
        chunk_size: 7,
        max_invalid_ratio: None,
    })
    .evaluate(&parsed, &table, &JobControl::new())
    .unwrap();
    assert_eq!(whole.mask, chunked.mask);
}

#[test]
fn percentile_uses_linear_interpolation() {
    let values: Vec<f64> = (1..=100).map(f64::from).collect();
    let table = table_with(&[("area", values)]);
    // Rank 0.9 * 99 = 89.1 -> 90.1, so 91..=100 pass.
    let parsed = parse("area >= percentile(area, 90)").unwrap();
    let outcome = evaluate(&parsed, &table).unwrap();
    assert_eq!(outcome.selected_count(), 10);
    assert_eq!(outcome.selected_indices().first(), Some(&90));
}

#[test]
fn division_by_zero_is_per_record_and_reported() {
    let table = table_with(&[
        ("area", vec![10.0, 20.0, 30.0, 40.0]),
        ("perimeter", vec![2.0, 0.0, 3.0, 0.0]),
    ]);
    let parsed = parse("area / perimeter > 1").unwrap();
    let outcome = evaluate(&parsed, &table).unwrap();

    assert_eq!(outcome.mask, vec![true, false, true, false]);
    assert_eq!(outcome.invalid_records, 2);
    assert_eq!(outcome.warnings.len(), 1);
    let warning = &outcome.warnings[0];
    assert_eq!(warning.kind, WarningKind::DivisionByZero);
    assert_eq!(warning.record_count, 2);
    assert_eq!(warning.sample_indices, vec![1, 3]);
}

#[test]
fn nested_divisions_are_reported_per_operator() {
    let table = table_with(&[
        ("a", vec![1.0, 2.0, 3.0]),
        ("b", vec![0.0, 1.0, 1.0]),
        ("c", vec![1.0, 1.0, 0.0]),
    ]);
    let parsed = parse("a / b / c > 0").unwrap();
    let outcome = evaluate(&parsed, &table).unwrap();

    assert_eq!(outcome.mask, vec![false, true, false]);
    assert_eq!(outcome.invalid_records, 2);
    assert_eq!(outcome.warnings.len(), 2);
    let mut samples: Vec<_> = outcome
        .warnings
        .iter()
        .map(|warning| (warning.kind, warning.sample_indices.clone()))
        .collect();
    samples.sort_by_key(|(_, indices)| indices.clone());
    assert_eq!(
        samples,
        vec![
            (WarningKind::DivisionByZero, vec![0]),
            (WarningKind::DivisionByZero, vec![2])
        ]
    );
}

#[test]
fn long_operator_chains_fail_with_syntax_error() {
    let text = format!("area{} > 0", " + area".repeat(10_000));
    assert!(matches!(parse(&text), Err(ExprError::Syntax { .. })));

    let table = table_with(&[("area", vec![1.0, -1.0])]);
    let accepted = parse(&format!("area{} > 0", " + area".repeat(100))).unwrap();
    assert_eq!(evaluate(&accepted, &table).unwrap().mask, vec![true, false]);
}

#[test]
fn nan_comparisons_are_false_without_warnings() {
    let table = table_with(&[("area", vec![1.0, f64::NAN, 3.0])]);
    let parsed = parse("area > 0").unwrap();
    let outcome = evaluate(&parsed, &table).unwrap();
    assert_eq!(outcome.mask, vec![true, false, true]);
    assert_eq!(outcome.invalid_records, 0);
}

#[test]
fn invalid_ratio_limit_aborts() {
    let table = table_with(&[("area", vec![1.0, 2.0, 3.0, 4.0]), ("zero", vec![0.0; 4])]);
    let parsed = parse("area / zero > 1").unwrap();
    let err = Evaluator::new(&EvaluationConfig {
        chunk_size: 2,
        max_invalid_ratio: Some(0.5),
    })
    .evaluate(&parsed, &table, &JobControl::new())
    .unwrap_err();
    assert!(matches!(
        err,
        ExprError::TooManyInvalidRecords {
            invalid: 4,
            total: 4,
            ..
        }
    ));
}

#[test]
fn unsafe_constructs_are_rejected_at_parse_time() {
    for text in [
        "__import__('os')",
        "area.mean() > 1",
        "area = 3",
        "system(area) > 0",
        "area[0] > 1",
        "lambda > 1",
    ] {
        let err = parse(text).unwrap_err();
        assert!(err.is_security_rejection(), "{text} -> {err}");
        assert!(err.position().is_some());
    }
}

#[test]
fn malformed_and_ill_typed_input_reports_position() {
    let syntax = parse("area > (1 + ").unwrap_err();
    assert!(matches!(syntax, ExprError::Syntax { .. }));

    let typed = parse("area + 1").unwrap_err();
    assert!(matches!(typed, ExprError::Type { .. }));

    let connective = parse("area and 1 > 0").unwrap_err();
    assert!(matches!(connective, ExprError::Type { .. }));
}

#[test]
fn unknown_columns_fail_before_evaluation() {
    let table = table_with(&[("area", vec![1.0, 2.0])]);
    let parsed = parse("area > 1 and circularity > 0.8").unwrap();

    let err = dependencies(&parsed, &table).unwrap_err();
    match err {
        ExprError::UnknownColumn {
            column, position, ..
        } => {
            assert_eq!(column, "circularity");
            assert_eq!(position, 13);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        evaluate(&parsed, &table),
        Err(ExprError::UnknownColumn { .. })
    ));
}

#[test]
fn quoted_columns_and_keywords_are_case_insensitive() {
    let table = table_with(&[("cell area", vec![5.0, 50.0]), ("flag", vec![1.0, 1.0])]);
    let parsed = parse("`cell area` > 10 AND flag == 1").unwrap();
    assert_eq!(
        dependencies(&parsed, &table).unwrap().into_iter().collect::<Vec<_>>(),
        vec!["cell area".to_string(), "flag".to_string()]
    );
    assert_eq!(evaluate(&parsed, &table).unwrap().mask, vec![false, true]);
}

#[test]
fn cancelled_evaluation_returns_no_mask() {
    let table = table_with(&[("area", skewed_areas())]);
    let parsed = parse("area > 1").unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = Evaluator::default()
        .evaluate(&parsed, &table, &JobControl::with_token(token))
        .unwrap_err();
    assert_eq!(err, ExprError::Interrupted(JobInterrupt::Cancelled));
}
