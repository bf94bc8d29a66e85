//! Selection use-case services.
//!
//! # Responsibility
//! - Own committed selections and their well/colour assignment.
//! - Turn interactive input (rectangles, masks) into selection drafts.
//!
//! # See also
//! - `model::selection`

pub mod region;
pub mod selection_service;
