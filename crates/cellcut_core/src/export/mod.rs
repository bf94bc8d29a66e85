//! Extraction geometry and protocol output.
//!
//! # Responsibility
//! - Compute square pixel crops per cell (`crop`).
//! - Combine crops with calibrated stage boxes into a document (`document`).
//! - Serialize the document to the instrument's text format (`protocol`).
//!
//! # Invariants
//! - Missing calibration aborts the whole export.
//! - Per-cell crop failures are collected in a `SkipReport`.

pub mod crop;
pub mod document;
pub mod protocol;
