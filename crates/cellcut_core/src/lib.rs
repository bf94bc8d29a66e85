//! Core domain logic for cellcut: filter cells, calibrate pixel to stage
//! coordinates, group cells into well-assigned selections and emit the
//! sorting protocol.
//! This crate is the single source of truth for business invariants.

pub mod calibration;
pub mod config;
pub mod export;
pub mod expr;
pub mod logging;
pub mod model;
pub mod service;
pub mod session;

pub use calibration::affine::{AffineTransform, CalibrationPoint, FitModel};
pub use calibration::transformer::{
    CalibrationError, CalibrationQuality, CalibrationResult, CoordinateTransformer, QualityGrade,
};
pub use config::{ConfigError, CoreConfig};
pub use export::crop::{compute_crop, CropError, CropRegion};
pub use export::document::{
    build_document, ExportError, ExportResult, ImageFormat, ImageMetadata, ProtocolDocument,
    ProtocolEntry, SkipReport, SkippedCell,
};
pub use export::protocol::serialize;
pub use expr::error::{EvaluationWarning, ExprError, ExprResult, WarningKind};
pub use expr::eval::{EvaluationOutcome, Evaluator};
pub use expr::{dependencies, evaluate, parse, ParsedExpression};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::cell::{BoundingBox, CellDataset, CellTable, CellTableError, PixelPoint, PixelRect};
pub use model::color::{PaletteColor, PALETTE};
pub use model::geometry::{StageBox, StagePoint};
pub use model::selection::{
    Selection, SelectionDraft, SelectionId, SelectionSource, SelectionState,
};
pub use model::well::{WellId, WellSet, WELL_COUNT};
pub use service::region::{draft_from_rect, select_in_rect};
pub use service::selection_service::{
    ColorConflict, SelectionError, SelectionManager, SelectionResult, SelectionStats,
    SelectionUpdate,
};
pub use session::context::{EventBus, SessionContext, SessionEvent};
pub use session::job::{CancellationToken, JobControl, JobInterrupt};
pub use session::worker::{BackgroundWorker, JobHandle, WorkerError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
