//! Protocol document assembly.
//!
//! # Responsibility
//! - Turn active selections into per-cell crop + stage geometry.
//! - Report every skipped cell instead of dropping it.
//!
//! # Invariants
//! - Without a valid calibration no document is produced at all.
//! - Entry order: selection order as given, then ascending cell index.
//! - Cancelled or timed-out builds return no partial document.

use crate::calibration::transformer::CoordinateTransformer;
use crate::config::ExtractionConfig;
use crate::export::crop::{compute_crop, CropError, CropRegion};
use crate::model::cell::CellDataset;
use crate::model::color::PaletteColor;
use crate::model::geometry::StageBox;
use crate::model::selection::{Selection, SelectionId};
use crate::model::well::WellId;
use crate::session::job::{JobControl, JobInterrupt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug)]
pub enum ExportError {
    NoCalibration,
    /// More cells were skipped than `extraction.max_skip_ratio` allows.
    SkipThresholdExceeded {
        skipped: usize,
        total: usize,
        max_ratio: f64,
    },
    Interrupted(JobInterrupt),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCalibration => {
                write!(f, "export requires a valid calibration; calculate one first")
            }
            Self::SkipThresholdExceeded {
                skipped,
                total,
                max_ratio,
            } => write!(
                f,
                "{skipped} of {total} cells could not be cropped (limit {:.1}%)",
                max_ratio * 100.0
            ),
            Self::Interrupted(reason) => write!(f, "export stopped: {reason}"),
            Self::Io { path, source } => {
                write!(f, "failed to write protocol `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Interrupted(reason) => Some(reason),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<JobInterrupt> for ExportError {
    fn from(value: JobInterrupt) -> Self {
        Self::Interrupted(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    #[serde(rename = "TIF")]
    Tif,
    #[serde(rename = "JPG")]
    Jpg,
    #[serde(rename = "PNG")]
    Png,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tif => "TIF",
            Self::Jpg => "JPG",
            Self::Png => "PNG",
        }
    }

    /// Infers the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "tif" | "tiff" => Some(Self::Tif),
            "jpg" | "jpeg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolEntry {
    pub selection_id: SelectionId,
    pub cell_index: usize,
    pub pixel_crop: CropRegion,
    pub stage_box: StageBox,
    pub color: PaletteColor,
    pub well: WellId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolDocument {
    pub image: ImageMetadata,
    pub entries: Vec<ProtocolEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCell {
    pub selection_id: SelectionId,
    pub cell_index: usize,
    pub reason: CropError,
}

/// Cells excluded from a document, with reasons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkipReport {
    pub skipped: Vec<SkippedCell>,
    /// Cells considered, exported or not.
    pub total_cells: usize,
}

impl SkipReport {
    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn skip_ratio(&self) -> f64 {
        if self.total_cells == 0 {
            0.0
        } else {
            self.skipped.len() as f64 / self.total_cells as f64
        }
    }
}

/// Builds the protocol document for every active selection.
///
/// # Errors
/// - `NoCalibration` when `transformer` holds no valid transform.
/// - `Interrupted` when `control` is cancelled or past its deadline; checked
///   before each selection.
/// - `SkipThresholdExceeded` when `settings.max_skip_ratio` is set and the
///   skipped share is above it.
pub fn build_document<D: CellDataset + ?Sized>(
    selections: &[Selection],
    dataset: &D,
    image: &ImageMetadata,
    transformer: &CoordinateTransformer,
    settings: &ExtractionConfig,
    control: &JobControl,
) -> ExportResult<(ProtocolDocument, SkipReport)> {
    if !transformer.is_calibrated() {
        warn!("event=export_built module=export status=error reason=no_calibration");
        return Err(ExportError::NoCalibration);
    }

    let mut entries = Vec::new();
    let mut report = SkipReport::default();
    for selection in selections.iter().filter(|selection| selection.is_active()) {
        control.checkpoint()?;
        for &cell_index in &selection.cell_indices {
            report.total_cells += 1;
            let crop = dataset
                .bounding_box(cell_index)
                .ok_or(CropError::MissingCell)
                .and_then(|bbox| {
                    compute_crop(&bbox, image.width, image.height, settings.min_crop_size_px)
                });
            let pixel_crop = match crop {
                Ok(crop) => crop,
                Err(reason) => {
                    debug!(
                        "event=cell_skipped module=export status=ok selection={} cell={} reason=\"{}\"",
                        selection.id, cell_index, reason
                    );
                    report.skipped.push(SkippedCell {
                        selection_id: selection.id,
                        cell_index,
                        reason,
                    });
                    continue;
                }
            };
            let stage_box = transformer
                .transform_bbox(&pixel_crop.bounds())
                .map_err(|_| ExportError::NoCalibration)?;
            entries.push(ProtocolEntry {
                selection_id: selection.id,
                cell_index,
                pixel_crop,
                stage_box,
                color: selection.color,
                well: selection.well,
            });
        }
    }

    if let Some(max_ratio) = settings.max_skip_ratio {
        if report.skip_ratio() > max_ratio {
            warn!(
                "event=export_built module=export status=error reason=skip_threshold skipped={} total={}",
                report.skipped.len(),
                report.total_cells
            );
            return Err(ExportError::SkipThresholdExceeded {
                skipped: report.skipped.len(),
                total: report.total_cells,
                max_ratio,
            });
        }
    }

    info!(
        "event=export_built module=export status=ok points={} skipped={} total={}",
        entries.len(),
        report.skipped.len(),
        report.total_cells
    );
    Ok((
        ProtocolDocument {
            image: image.clone(),
            entries,
        },
        report,
    ))
}
