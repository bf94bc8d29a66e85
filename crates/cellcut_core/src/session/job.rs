//! Cooperative cancellation and deadlines for long-running jobs.
//!
//! # Invariants
//! - Jobs only observe cancellation at explicit `checkpoint()` calls.
//! - An interrupted job returns an error and commits no partial result.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Reason a job stopped at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobInterrupt {
    Cancelled,
    DeadlineExceeded,
}

impl Display for JobInterrupt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "job was cancelled"),
            Self::DeadlineExceeded => write!(f, "job exceeded its deadline"),
        }
    }
}

impl Error for JobInterrupt {}

/// Cancellation token plus optional caller-supplied deadline.
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl JobControl {
    /// Control that never interrupts unless its token is cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `Err` when the job must stop. Cancellation wins over deadline.
    pub fn checkpoint(&self) -> Result<(), JobInterrupt> {
        if self.token.is_cancelled() {
            return Err(JobInterrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(JobInterrupt::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CancellationToken, JobControl, JobInterrupt};
    use std::time::Instant;

    #[test]
    fn fresh_control_passes_checkpoint() {
        assert_eq!(JobControl::new().checkpoint(), Ok(()));
    }

    #[test]
    fn cancelled_token_is_seen_by_clones() {
        let token = CancellationToken::new();
        let control = JobControl::with_token(token.clone());
        token.cancel();
        assert_eq!(control.checkpoint(), Err(JobInterrupt::Cancelled));
    }

    #[test]
    fn past_deadline_interrupts() {
        let control = JobControl::new().with_deadline(Instant::now());
        assert_eq!(control.checkpoint(), Err(JobInterrupt::DeadlineExceeded));
    }
}
