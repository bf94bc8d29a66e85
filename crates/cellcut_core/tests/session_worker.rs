use cellcut_core::config::{EvaluationConfig, ExtractionConfig};
use cellcut_core::{
    parse, BackgroundWorker, BoundingBox, CellTable, CoordinateTransformer, ExportError,
    ExprError, ImageFormat, ImageMetadata, JobInterrupt, PixelPoint, SelectionDraft,
    SelectionManager, SelectionSource, SessionContext, StagePoint, WorkerError,
};
use std::sync::Arc;
use std::time::Duration;

fn dataset(count: usize) -> Arc<CellTable> {
    let boxes = (0..count)
        .map(|index| {
            let x = (index % 40) as f64 * 25.0;
            let y = (index / 40) as f64 * 25.0;
            BoundingBox::new(x, y, x + 20.0, y + 20.0)
        })
        .collect();
    let areas = (0..count).map(|index| (index % 17) as f64).collect();
    Arc::new(CellTable::new(boxes).with_column("area", areas).unwrap())
}

#[test]
fn background_evaluation_matches_foreground() {
    let table = dataset(1_000);
    let parsed = parse("area > mean(area)").unwrap();
    let expected = cellcut_core::evaluate(&parsed, table.as_ref()).unwrap();

    let worker = BackgroundWorker::new();
    let handle = worker
        .spawn_evaluation(parsed, Arc::clone(&table), &EvaluationConfig::default())
        .unwrap();
    assert_eq!(handle.name(), "evaluation");
    assert_eq!(handle.wait().unwrap().unwrap(), expected);
}

#[test]
fn only_one_job_at_a_time() {
    let worker = BackgroundWorker::new();
    let (release, gate) = crossbeam_channel::bounded::<()>(0);
    let blocker = worker
        .spawn("blocker", move |_| {
            let _ = gate.recv();
        })
        .unwrap();

    let parsed = parse("area > 1").unwrap();
    let rejected = worker.spawn_evaluation(parsed, dataset(10), &EvaluationConfig::default());
    assert!(matches!(rejected, Err(WorkerError::Busy)));

    release.send(()).unwrap();
    blocker.wait().unwrap();
}

#[test]
fn cancelling_a_job_discards_its_result() {
    let worker = BackgroundWorker::new();
    let (started, ready) = crossbeam_channel::bounded::<()>(1);
    let handle = worker
        .spawn("cancellable", move |control| loop {
            let _ = started.try_send(());
            if let Err(reason) = control.checkpoint() {
                return Err::<u32, _>(reason);
            }
            std::thread::sleep(Duration::from_millis(1));
        })
        .unwrap();

    ready.recv().unwrap();
    handle.cancel();
    assert_eq!(handle.wait().unwrap(), Err(JobInterrupt::Cancelled));
}

#[test]
fn worker_deadline_interrupts_evaluation() {
    let worker = BackgroundWorker::new().with_deadline(Duration::ZERO);
    let parsed = parse("area > 1").unwrap();
    let handle = worker
        .spawn_evaluation(parsed, dataset(100), &EvaluationConfig::default())
        .unwrap();
    assert_eq!(
        handle.wait().unwrap().unwrap_err(),
        ExprError::Interrupted(JobInterrupt::DeadlineExceeded)
    );
}

#[test]
fn background_export_uses_snapshots() {
    let table = dataset(80);
    let mut transformer = CoordinateTransformer::new(SessionContext::default());
    transformer
        .add_point(PixelPoint::new(0.0, 0.0), StagePoint::new(0.0, 0.0))
        .unwrap();
    transformer
        .add_point(PixelPoint::new(1000.0, 0.0), StagePoint::new(10.0, 0.0))
        .unwrap();
    transformer.calculate().unwrap();

    let mut manager = SelectionManager::new(SessionContext::default());
    let mut draft = SelectionDraft::new(SelectionSource::Mixed);
    draft.add_cells(0..40);
    manager.create(draft).unwrap();

    let image = ImageMetadata {
        file_name: "scan.png".to_string(),
        width: 1024,
        height: 1024,
        format: ImageFormat::Png,
    };
    let worker = BackgroundWorker::new();
    let handle = worker
        .spawn_export(
            manager.list().to_vec(),
            Arc::clone(&table),
            image,
            transformer.clone(),
            ExtractionConfig::default(),
        )
        .unwrap();

    // Invalidating the live calibration does not affect the running export.
    transformer.clear();

    let (document, report) = handle.wait().unwrap().unwrap();
    assert_eq!(document.entries.len(), 40);
    assert!(report.is_empty());
}

#[test]
fn background_export_without_calibration_fails() {
    let worker = BackgroundWorker::new();
    let mut manager = SelectionManager::new(SessionContext::default());
    let mut draft = SelectionDraft::new(SelectionSource::Mixed);
    draft.add_cells([0]);
    manager.create(draft).unwrap();

    let handle = worker
        .spawn_export(
            manager.list().to_vec(),
            dataset(4),
            ImageMetadata {
                file_name: "scan.jpg".to_string(),
                width: 100,
                height: 100,
                format: ImageFormat::Jpg,
            },
            CoordinateTransformer::new(SessionContext::default()),
            ExtractionConfig::default(),
        )
        .unwrap();
    assert!(matches!(
        handle.wait().unwrap(),
        Err(ExportError::NoCalibration)
    ));
}
