//! Square crop geometry around one cell.
//!
//! # Invariants
//! - A returned `CropRegion` lies fully inside `[0, width] x [0, height]`.
//! - Clamping shifts the crop; it never resizes it.

use crate::model::cell::BoundingBox;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Square pixel region, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl CropRegion {
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            f64::from(self.x),
            f64::from(self.y),
            f64::from(self.x) + f64::from(self.size),
            f64::from(self.y) + f64::from(self.size),
        )
    }
}

/// Per-cell crop failure. Never fatal for a whole export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CropError {
    /// Box has non-finite or inverted bounds.
    InvalidBoundingBox,
    CropTooSmall { size: u32, minimum: u32 },
    DoesNotFitImage { size: u32, width: u32, height: u32 },
    /// Cell index has no record in the dataset.
    MissingCell,
}

impl Display for CropError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBoundingBox => write!(f, "cell bounding box is malformed"),
            Self::CropTooSmall { size, minimum } => {
                write!(f, "crop of {size} px is below the {minimum} px minimum")
            }
            Self::DoesNotFitImage {
                size,
                width,
                height,
            } => write!(f, "crop of {size} px does not fit a {width}x{height} image"),
            Self::MissingCell => write!(f, "cell is not present in the dataset"),
        }
    }
}

impl Error for CropError {}

/// Square crop of side `floor(min(w, h))` centred on the box centre.
///
/// # Errors
/// - `InvalidBoundingBox` for non-finite or inverted boxes.
/// - `CropTooSmall` when the side is below `min_size`.
/// - `DoesNotFitImage` when the side exceeds either image dimension.
pub fn compute_crop(
    bbox: &BoundingBox,
    image_width: u32,
    image_height: u32,
    min_size: u32,
) -> Result<CropRegion, CropError> {
    if !bbox.is_well_formed() {
        return Err(CropError::InvalidBoundingBox);
    }
    let side = bbox.width().min(bbox.height()).floor();
    if side < f64::from(min_size) {
        return Err(CropError::CropTooSmall {
            size: side as u32,
            minimum: min_size,
        });
    }
    if side > f64::from(image_width) || side > f64::from(image_height) {
        return Err(CropError::DoesNotFitImage {
            size: side as u32,
            width: image_width,
            height: image_height,
        });
    }
    let size = side as u32;
    let center = bbox.center();
    Ok(CropRegion {
        x: clamp_origin(center.x, size, image_width),
        y: clamp_origin(center.y, size, image_height),
        size,
    })
}

fn clamp_origin(center: f64, size: u32, extent: u32) -> u32 {
    let origin = (center - f64::from(size) / 2.0).round();
    origin.clamp(0.0, f64::from(extent - size)) as u32
}

#[cfg(test)]
mod tests {
    use super::{compute_crop, CropError, CropRegion};
    use crate::model::cell::BoundingBox;

    #[test]
    fn centred_crop_uses_shorter_side() {
        let crop = compute_crop(&BoundingBox::new(100.0, 200.0, 140.0, 230.5), 1000, 1000, 10)
            .unwrap();
        assert_eq!(
            crop,
            CropRegion {
                x: 105,
                y: 200,
                size: 30
            }
        );
    }

    #[test]
    fn crop_at_edges_is_shifted_inside() {
        let near_origin = compute_crop(&BoundingBox::new(-5.0, -8.0, 15.0, 12.0), 50, 40, 10)
            .unwrap();
        assert_eq!((near_origin.x, near_origin.y), (0, 0));

        let near_far_edge =
            compute_crop(&BoundingBox::new(38.0, 30.0, 58.0, 50.0), 50, 40, 10).unwrap();
        assert_eq!(near_far_edge.size, 20);
        assert_eq!((near_far_edge.x, near_far_edge.y), (30, 20));
    }

    #[test]
    fn rejects_small_and_malformed_boxes() {
        assert_eq!(
            compute_crop(&BoundingBox::new(0.0, 0.0, 9.9, 50.0), 100, 100, 10),
            Err(CropError::CropTooSmall {
                size: 9,
                minimum: 10
            })
        );
        assert_eq!(
            compute_crop(&BoundingBox::new(5.0, 0.0, 1.0, 50.0), 100, 100, 10),
            Err(CropError::InvalidBoundingBox)
        );
        assert!(matches!(
            compute_crop(&BoundingBox::new(0.0, 0.0, 80.0, 80.0), 60, 100, 10),
            Err(CropError::DoesNotFitImage { size: 80, .. })
        ));
    }
}
