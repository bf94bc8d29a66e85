//! Domain model shared by the evaluation, calibration and export layers.
//!
//! # Responsibility
//! - Define canonical value types for cells, wells, colours and selections.
//! - Keep external collaborators behind the `CellDataset` trait.
//!
//! # Invariants
//! - Cells are addressed by integer index only; records are never copied in.
//! - Wells and colours are closed sets (`WellId`, `PaletteColor`).

pub mod cell;
pub mod color;
pub mod geometry;
pub mod selection;
pub mod well;
