//! Pixel-to-stage calibration.
//!
//! # Responsibility
//! - Fit affine maps from verified pixel/stage correspondences (`affine`).
//! - Own calibration state and convert coordinates (`transformer`).
//!
//! # See also
//! - `export::document` for the consumer that requires a valid transform.

pub mod affine;
pub mod transformer;
