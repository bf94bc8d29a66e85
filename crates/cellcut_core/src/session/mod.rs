//! Interactive session plumbing.
//!
//! # Responsibility
//! - Share configuration and change notifications (`context`).
//! - Cooperative cancellation and deadlines (`job`).
//! - Run at most one evaluation or export at a time (`worker`).
//!
//! # Invariants
//! - Calibration and selection state have exactly one owner, the caller
//!   holding the `CoordinateTransformer` and `SelectionManager`.

pub mod context;
pub mod job;
pub mod worker;
