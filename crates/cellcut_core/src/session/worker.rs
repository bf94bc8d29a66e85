//! Single-slot background worker for evaluation and export jobs.
//!
//! # Responsibility
//! - Run CPU-bound jobs off the interactive thread.
//! - Hand results back over a channel; expose cancellation per job.
//!
//! # Invariants
//! - At most one job runs per worker at any time.
//! - The slot is released even when the job panics.
//! - A cancelled job's partial work is never delivered as success; jobs
//!   observe cancellation at their own checkpoints.

use crate::calibration::transformer::CoordinateTransformer;
use crate::config::{EvaluationConfig, ExtractionConfig};
use crate::expr::error::ExprResult;
use crate::expr::eval::{EvaluationOutcome, Evaluator};
use crate::expr::ParsedExpression;
use crate::export::document::{
    build_document, ExportResult, ImageMetadata, ProtocolDocument, SkipReport,
};
use crate::model::cell::CellDataset;
use crate::model::selection::Selection;
use crate::session::job::{CancellationToken, JobControl};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Another job already occupies the slot.
    Busy,
    /// The job ended without delivering a result (it panicked).
    Disconnected,
    Spawn(String),
}

impl Display for WorkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "a background job is already running"),
            Self::Disconnected => write!(f, "background job ended without a result"),
            Self::Spawn(message) => write!(f, "failed to start background job: {message}"),
        }
    }
}

impl Error for WorkerError {}

/// Result handle for one background job.
pub struct JobHandle<T> {
    name: &'static str,
    token: CancellationToken,
    receiver: Receiver<T>,
}

impl<T> JobHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Requests cooperative cancellation; the job stops at its next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Blocks until the job delivers its result.
    pub fn wait(self) -> Result<T, WorkerError> {
        self.receiver.recv().map_err(|_| WorkerError::Disconnected)
    }

    /// Waits up to `timeout`; `Ok(None)` when the job is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<T>, WorkerError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Ok(Some(result)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Non-blocking poll; `Ok(None)` when the job is still running.
    pub fn try_result(&self) -> Result<Option<T>, WorkerError> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }
}

struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundWorker {
    busy: Arc<AtomicBool>,
    deadline: Option<Duration>,
}

impl BackgroundWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a caller-supplied time limit to every job started afterwards.
    pub fn with_deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(limit);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Starts `job` on a new thread if the slot is free.
    pub fn spawn<T, F>(&self, name: &'static str, job: F) -> Result<JobHandle<T>, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce(&JobControl) -> T + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WorkerError::Busy);
        }
        let guard = SlotGuard(Arc::clone(&self.busy));

        let token = CancellationToken::new();
        let mut control = JobControl::with_token(token.clone());
        if let Some(limit) = self.deadline {
            control = control.with_timeout(limit);
        }
        let (sender, receiver) = bounded(1);

        std::thread::Builder::new()
            .name(format!("cellcut-{name}"))
            .spawn(move || {
                // Locals drop in reverse order, so an unwinding job frees
                // the slot before the channel disconnects.
                let sender = sender;
                let guard = guard;
                info!("event=job_started module=session status=ok job={name}");
                let result = job(&control);
                if control.token().is_cancelled() {
                    info!("event=job_cancelled module=session status=ok job={name}");
                } else {
                    info!("event=job_finished module=session status=ok job={name}");
                }
                drop(guard);
                let _ = sender.send(result);
            })
            .map_err(|err| {
                error!("event=job_started module=session status=error job={name} error={err}");
                WorkerError::Spawn(err.to_string())
            })?;

        Ok(JobHandle {
            name,
            token,
            receiver,
        })
    }

    /// Evaluates `parsed` over `dataset` in the background.
    pub fn spawn_evaluation<D>(
        &self,
        parsed: ParsedExpression,
        dataset: Arc<D>,
        settings: &EvaluationConfig,
    ) -> Result<JobHandle<ExprResult<EvaluationOutcome>>, WorkerError>
    where
        D: CellDataset + Send + Sync + ?Sized + 'static,
    {
        let evaluator = Evaluator::new(settings);
        self.spawn("evaluation", move |control| {
            evaluator.evaluate(&parsed, dataset.as_ref(), control)
        })
    }

    /// Builds the protocol document in the background.
    ///
    /// Works on snapshots, so later edits to the live selections or
    /// calibration do not affect a running export.
    pub fn spawn_export<D>(
        &self,
        selections: Vec<Selection>,
        dataset: Arc<D>,
        image: ImageMetadata,
        transformer: CoordinateTransformer,
        settings: ExtractionConfig,
    ) -> Result<JobHandle<ExportResult<(ProtocolDocument, SkipReport)>>, WorkerError>
    where
        D: CellDataset + Send + Sync + ?Sized + 'static,
    {
        self.spawn("export", move |control| {
            build_document(
                &selections,
                dataset.as_ref(),
                &image,
                &transformer,
                &settings,
                control,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{BackgroundWorker, WorkerError};
    use crossbeam_channel::bounded;

    #[test]
    fn second_job_is_rejected_while_first_runs() {
        let worker = BackgroundWorker::new();
        let (release, gate) = bounded::<()>(0);
        let first = worker
            .spawn("blocked", move |_| {
                let _ = gate.recv();
                7
            })
            .unwrap();
        assert!(worker.is_busy());
        assert!(matches!(worker.spawn("second", |_| 0), Err(WorkerError::Busy)));

        release.send(()).unwrap();
        assert_eq!(first.wait().unwrap(), 7);
        assert!(!worker.is_busy());
        assert_eq!(worker.spawn("third", |_| 1).unwrap().wait().unwrap(), 1);
    }

    #[test]
    fn panicking_job_frees_the_slot() {
        let worker = BackgroundWorker::new();
        let handle = worker.spawn("boom", |_| -> u8 { panic!("job failed") }).unwrap();
        assert_eq!(handle.wait().unwrap_err(), WorkerError::Disconnected);
        assert!(!worker.is_busy());
    }
}
