//! Vectorized evaluation of parsed expressions.
//!
//! # Responsibility
//! - Resolve statistics (`mean(area)`, ...) once over the full dataset.
//! - Evaluate the remaining per-record tree chunk by chunk, with a
//!   cooperative checkpoint before each chunk.
//!
//! # Invariants
//! - The returned mask has exactly `record_count()` entries.
//! - Comparisons involving NaN are `false`.
//! - Records hit by a division by zero are `false` in the final mask and
//!   are reported as `WarningKind::DivisionByZero`.
//! - No state survives between calls; re-evaluation is idempotent.

use crate::config::EvaluationConfig;
use crate::expr::ast::{BinaryOperator, Expr, Function, Literal, Span, UnaryOperator};
use crate::expr::error::{EvaluationWarning, ExprError, ExprResult, WarningCollector, WarningKind};
use crate::expr::{dependencies, ParsedExpression};
use crate::model::cell::CellDataset;
use crate::session::job::JobControl;
use log::{debug, info, warn};
use serde::Serialize;
use std::ops::Range;
use std::time::Instant;

/// Result of one evaluation: the mask plus aggregated numeric warnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub mask: Vec<bool>,
    pub warnings: Vec<EvaluationWarning>,
    /// Records forced to `false` by numeric failures.
    pub invalid_records: usize,
}

impl EvaluationOutcome {
    pub fn selected_count(&self) -> usize {
        self.mask.iter().filter(|selected| **selected).count()
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(index, selected)| selected.then_some(index))
            .collect()
    }
}

/// Stateless evaluator configured with chunking and failure-rate limits.
#[derive(Debug, Clone)]
pub struct Evaluator {
    chunk_size: usize,
    max_invalid_ratio: Option<f64>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(&EvaluationConfig::default())
    }
}

impl Evaluator {
    pub fn new(config: &EvaluationConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            max_invalid_ratio: config.max_invalid_ratio,
        }
    }

    /// Evaluates `parsed` against every record of `dataset`.
    ///
    /// # Errors
    /// - `UnknownColumn` before any evaluation work.
    /// - `InvalidArgument` for out-of-range statistic arguments.
    /// - `Interrupted` when `control` trips at a checkpoint; no mask is returned.
    /// - `TooManyInvalidRecords` when the configured ratio is exceeded.
    pub fn evaluate<D: CellDataset + ?Sized>(
        &self,
        parsed: &ParsedExpression,
        dataset: &D,
        control: &JobControl,
    ) -> ExprResult<EvaluationOutcome> {
        let started = Instant::now();
        dependencies(parsed, dataset)?;
        control.checkpoint()?;

        let total = dataset.record_count();
        let mut warnings = WarningCollector::default();
        let bound = {
            let mut binder = Frame::new(parsed.source(), dataset, 0..total, &mut warnings);
            binder.bind(parsed.root(), control)?
        };

        let mut mask = Vec::with_capacity(total);
        let mut invalid_records = 0;
        let mut start = 0;
        while start < total {
            control.checkpoint()?;
            let end = (start + self.chunk_size).min(total);
            let mut frame = Frame::new(parsed.source(), dataset, start..end, &mut warnings);
            let value = frame.eval(&bound)?;
            let invalid = frame.invalid;
            for (offset, selected) in value.into_flags(end - start).into_iter().enumerate() {
                if invalid[offset] {
                    invalid_records += 1;
                    mask.push(false);
                } else {
                    mask.push(selected);
                }
            }
            debug!(
                "event=expr_chunk module=expr status=ok start={} end={}",
                start, end
            );
            start = end;
        }

        if let Some(max_ratio) = self.max_invalid_ratio {
            if total > 0 && (invalid_records as f64 / total as f64) > max_ratio {
                warn!(
                    "event=expr_evaluated module=expr status=error invalid={} total={}",
                    invalid_records, total
                );
                return Err(ExprError::TooManyInvalidRecords {
                    invalid: invalid_records,
                    total,
                    max_ratio,
                });
            }
        }

        let outcome = EvaluationOutcome {
            mask,
            warnings: warnings.into_warnings(),
            invalid_records,
        };
        info!(
            "event=expr_evaluated module=expr status=ok records={} selected={} warnings={} elapsed_ms={}",
            total,
            outcome.selected_count(),
            outcome.warnings.len(),
            started.elapsed().as_millis()
        );
        Ok(outcome)
    }
}

enum Value {
    Scalar(f64),
    Numbers(Vec<f64>),
    Flag(bool),
    Flags(Vec<bool>),
}

impl Value {
    fn number_at(&self, index: usize) -> f64 {
        match self {
            Self::Scalar(value) => *value,
            Self::Numbers(values) => values[index],
            _ => f64::NAN,
        }
    }

    fn flag_at(&self, index: usize) -> bool {
        match self {
            Self::Flag(value) => *value,
            Self::Flags(values) => values[index],
            _ => false,
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Flag(_))
    }

    fn into_flags(self, len: usize) -> Vec<bool> {
        match self {
            Self::Flags(values) => values,
            Self::Flag(value) => vec![value; len],
            _ => vec![false; len],
        }
    }

    fn into_numbers(self, len: usize) -> Vec<f64> {
        match self {
            Self::Numbers(values) => values,
            Self::Scalar(value) => vec![value; len],
            _ => Vec::new(),
        }
    }
}

struct Frame<'a, D: ?Sized> {
    source: &'a str,
    dataset: &'a D,
    range: Range<usize>,
    invalid: Vec<bool>,
    warnings: &'a mut WarningCollector,
}

impl<'a, D: CellDataset + ?Sized> Frame<'a, D> {
    fn new(
        source: &'a str,
        dataset: &'a D,
        range: Range<usize>,
        warnings: &'a mut WarningCollector,
    ) -> Self {
        let len = range.len();
        Self {
            source,
            dataset,
            range,
            invalid: vec![false; len],
            warnings,
        }
    }

    fn len(&self) -> usize {
        self.range.len()
    }

    /// Replaces every statistic call with its value over the full dataset.
    fn bind(&mut self, expr: &Expr, control: &JobControl) -> ExprResult<Expr> {
        Ok(match expr {
            Expr::Literal { .. } | Expr::ColumnRef { .. } => expr.clone(),
            Expr::UnaryOp { op, operand, span } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(self.bind(operand, control)?),
                span: *span,
            },
            Expr::BinaryOp {
                op,
                left,
                right,
                span,
            } => Expr::BinaryOp {
                op: *op,
                left: Box::new(self.bind(left, control)?),
                right: Box::new(self.bind(right, control)?),
                span: *span,
            },
            Expr::Call {
                function,
                args,
                span,
            } => {
                let mut bound_args = Vec::with_capacity(args.len());
                for arg in args {
                    bound_args.push(self.bind(arg, control)?);
                }
                if function.is_aggregate() {
                    control.checkpoint()?;
                    let value = self.aggregate(*function, &bound_args, *span)?;
                    Expr::Literal {
                        value: Literal::Number(value),
                        span: *span,
                    }
                } else {
                    Expr::Call {
                        function: *function,
                        args: bound_args,
                        span: *span,
                    }
                }
            }
        })
    }

    fn eval(&mut self, expr: &Expr) -> ExprResult<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                Literal::Number(number) => Value::Scalar(*number),
                Literal::Bool(flag) => Value::Flag(*flag),
            }),
            Expr::ColumnRef { name, span } => {
                let column = self.dataset.column(name).ok_or_else(|| ExprError::UnknownColumn {
                    column: name.clone(),
                    position: span.start,
                    snippet: name.clone(),
                })?;
                let values = column
                    .get(self.range.clone())
                    .ok_or_else(|| ExprError::ColumnLength {
                        column: name.clone(),
                        expected: self.dataset.record_count(),
                        actual: column.len(),
                    })?;
                Ok(Value::Numbers(values.to_vec()))
            }
            Expr::UnaryOp { op, operand, .. } => {
                let value = self.eval(operand)?;
                Ok(match (op, value) {
                    (UnaryOperator::Neg, Value::Scalar(number)) => Value::Scalar(-number),
                    (UnaryOperator::Neg, Value::Numbers(numbers)) => {
                        Value::Numbers(numbers.into_iter().map(|number| -number).collect())
                    }
                    (UnaryOperator::Not, Value::Flag(flag)) => Value::Flag(!flag),
                    (UnaryOperator::Not, Value::Flags(flags)) => {
                        Value::Flags(flags.into_iter().map(|flag| !flag).collect())
                    }
                    (_, other) => other,
                })
            }
            Expr::BinaryOp {
                op,
                left,
                right,
                span,
            } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                if op.is_arithmetic() {
                    Ok(self.arithmetic(*op, *span, left, right))
                } else if op.is_comparison() {
                    Ok(self.compare(*op, left, right))
                } else {
                    Ok(self.connect(*op, left, right))
                }
            }
            Expr::Call {
                function,
                args,
                span,
            } => {
                if function.is_aggregate() {
                    let value = self.aggregate(*function, args, *span)?;
                    return Ok(Value::Scalar(value));
                }
                let value = match args.first() {
                    Some(arg) => self.eval(arg)?,
                    None => Value::Scalar(f64::NAN),
                };
                Ok(self.elementwise(*function, *span, value))
            }
        }
    }

    fn arithmetic(&mut self, op: BinaryOperator, span: Span, left: Value, right: Value) -> Value {
        if left.is_scalar() && right.is_scalar() {
            let (value, fault) = apply_arithmetic(op, left.number_at(0), right.number_at(0));
            if let Some(kind) = fault {
                self.fault_all(kind, span);
            }
            return Value::Scalar(value);
        }

        let len = self.len();
        let mut out = Vec::with_capacity(len);
        let mut division_faults = Vec::new();
        let mut domain_faults = Vec::new();
        for index in 0..len {
            let (value, fault) =
                apply_arithmetic(op, left.number_at(index), right.number_at(index));
            match fault {
                Some(WarningKind::DivisionByZero) => division_faults.push(index),
                Some(_) => domain_faults.push(index),
                None => {}
            }
            out.push(value);
        }
        self.fault_records(WarningKind::DivisionByZero, span, &division_faults);
        self.fault_records(WarningKind::DomainError, span, &domain_faults);
        Value::Numbers(out)
    }

    fn compare(&self, op: BinaryOperator, left: Value, right: Value) -> Value {
        if left.is_scalar() && right.is_scalar() {
            return Value::Flag(apply_comparison(
                op,
                left.number_at(0),
                right.number_at(0),
            ));
        }
        Value::Flags(
            (0..self.len())
                .map(|index| apply_comparison(op, left.number_at(index), right.number_at(index)))
                .collect(),
        )
    }

    fn connect(&self, op: BinaryOperator, left: Value, right: Value) -> Value {
        let combine = |a: bool, b: bool| match op {
            BinaryOperator::And => a && b,
            _ => a || b,
        };
        if left.is_scalar() && right.is_scalar() {
            return Value::Flag(combine(left.flag_at(0), right.flag_at(0)));
        }
        Value::Flags(
            (0..self.len())
                .map(|index| combine(left.flag_at(index), right.flag_at(index)))
                .collect(),
        )
    }

    fn elementwise(&mut self, function: Function, span: Span, value: Value) -> Value {
        match value {
            Value::Scalar(number) => {
                let (result, fault) = apply_elementwise(function, number);
                if fault {
                    self.fault_all(WarningKind::DomainError, span);
                }
                Value::Scalar(result)
            }
            other => {
                let numbers = other.into_numbers(self.len());
                let mut faults = Vec::new();
                let mut out = Vec::with_capacity(numbers.len());
                for (index, number) in numbers.into_iter().enumerate() {
                    let (result, fault) = apply_elementwise(function, number);
                    if fault {
                        faults.push(index);
                    }
                    out.push(result);
                }
                self.fault_records(WarningKind::DomainError, span, &faults);
                Value::Numbers(out)
            }
        }
    }

    /// Computes a statistic of `args[0]` over every record of the dataset.
    fn aggregate(&mut self, function: Function, args: &[Expr], span: Span) -> ExprResult<f64> {
        let total = self.dataset.record_count();
        let (values, rank) = {
            let mut full = Frame::new(self.source, self.dataset, 0..total, &mut *self.warnings);
            let values = match args.first() {
                Some(arg) => full.eval(arg)?.into_numbers(total),
                None => Vec::new(),
            };
            let rank = match args.get(1) {
                Some(arg) => Some(full.eval(arg)?.number_at(0)),
                None => None,
            };
            (values, rank)
        };

        let mut finite: Vec<f64> = values.into_iter().filter(|value| !value.is_nan()).collect();
        let result = match function {
            Function::Count => return Ok(finite.len() as f64),
            Function::Sum => return Ok(finite.iter().sum()),
            Function::Mean => mean(&finite),
            Function::Var => sample_variance(&finite),
            Function::Std => sample_variance(&finite).map(f64::sqrt),
            Function::Min => finite.iter().copied().reduce(f64::min),
            Function::Max => finite.iter().copied().reduce(f64::max),
            Function::Median => percentile(&mut finite, 50.0),
            Function::Percentile => {
                let rank = rank.unwrap_or(f64::NAN);
                if !(0.0..=100.0).contains(&rank) {
                    return Err(ExprError::InvalidArgument {
                        function: Function::Percentile.name(),
                        message: format!("rank must be within 0..=100, got {rank}"),
                    });
                }
                percentile(&mut finite, rank)
            }
            Function::Abs | Function::Sqrt | Function::Log | Function::Log10 => None,
        };

        Ok(match result {
            Some(value) => value,
            None => {
                self.warnings
                    .record(self.source, WarningKind::EmptyStatistic, span, 0..total);
                f64::NAN
            }
        })
    }

    fn fault_all(&mut self, kind: WarningKind, span: Span) {
        let all: Vec<usize> = (0..self.len()).collect();
        self.fault_records(kind, span, &all);
    }

    fn fault_records(&mut self, kind: WarningKind, span: Span, positions: &[usize]) {
        if positions.is_empty() {
            return;
        }
        if kind == WarningKind::DivisionByZero {
            for position in positions {
                self.invalid[*position] = true;
            }
        }
        let offset = self.range.start;
        self.warnings.record(
            self.source,
            kind,
            span,
            positions.iter().map(|position| offset + position),
        );
    }
}

fn apply_arithmetic(op: BinaryOperator, a: f64, b: f64) -> (f64, Option<WarningKind>) {
    match op {
        BinaryOperator::Add => (a + b, None),
        BinaryOperator::Sub => (a - b, None),
        BinaryOperator::Mul => (a * b, None),
        BinaryOperator::Div => {
            if b == 0.0 {
                (f64::NAN, Some(WarningKind::DivisionByZero))
            } else {
                (a / b, None)
            }
        }
        BinaryOperator::Pow => {
            let value = a.powf(b);
            if value.is_nan() && !a.is_nan() && !b.is_nan() {
                (value, Some(WarningKind::DomainError))
            } else {
                (value, None)
            }
        }
        _ => (f64::NAN, None),
    }
}

fn apply_comparison(op: BinaryOperator, a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return false;
    }
    match op {
        BinaryOperator::Lt => a < b,
        BinaryOperator::Le => a <= b,
        BinaryOperator::Gt => a > b,
        BinaryOperator::Ge => a >= b,
        BinaryOperator::Eq => a == b,
        BinaryOperator::Ne => a != b,
        _ => false,
    }
}

/// Returns the value and whether the input was outside the real domain.
fn apply_elementwise(function: Function, value: f64) -> (f64, bool) {
    if value.is_nan() {
        return (value, false);
    }
    match function {
        Function::Abs => (value.abs(), false),
        Function::Sqrt if value < 0.0 => (f64::NAN, true),
        Function::Sqrt => (value.sqrt(), false),
        Function::Log | Function::Log10 if value <= 0.0 => (f64::NAN, true),
        Function::Log => (value.ln(), false),
        Function::Log10 => (value.log10(), false),
        _ => (f64::NAN, false),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator).
fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let center = mean(values)?;
    let squares: f64 = values.iter().map(|value| (value - center).powi(2)).sum();
    Some(squares / (values.len() - 1) as f64)
}

/// Percentile with linear interpolation between closest ranks.
fn percentile(values: &mut [f64], rank: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let position = rank / 100.0 * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * fraction)
}
