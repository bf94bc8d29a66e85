//! Calibration state owner and pixel/stage converter.
//!
//! # Responsibility
//! - Own the ordered calibration point list.
//! - Fit, score and keep the current pixel-to-stage transform.
//! - Convert points and bounding boxes in both directions.
//!
//! # Invariants
//! - A transform exists only after a successful `calculate()`.
//! - `remove_point()` and `clear()` drop the current transform.
//! - A failed `calculate()` leaves the previous transform untouched.
//! - The first two points must be at least `min_point_distance_px` apart.

use crate::calibration::affine::{AffineTransform, CalibrationPoint, FitModel};
use crate::model::cell::{BoundingBox, PixelPoint};
use crate::model::geometry::{StageBox, StagePoint};
use crate::session::context::{SessionContext, SessionEvent};
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CalibrationResult<T> = Result<T, CalibrationError>;

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    InsufficientPoints { available: usize },
    /// First two points are closer than the configured threshold.
    DegenerateCalibration { distance: f64, threshold: f64 },
    /// No successful calibration is available.
    NoCalibration,
    PointIndexOutOfRange { index: usize, len: usize },
    /// Pixel or stage coordinate is NaN or infinite.
    InvalidPoint,
    /// Fitted map collapses space (e.g. all stage points identical).
    SingularTransform,
}

impl Display for CalibrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientPoints { available } => write!(
                f,
                "calibration needs at least 2 points, {available} available"
            ),
            Self::DegenerateCalibration {
                distance,
                threshold,
            } => write!(
                f,
                "calibration points are {distance:.1} px apart; at least {threshold:.1} px required"
            ),
            Self::NoCalibration => write!(f, "no valid calibration; add points and calculate"),
            Self::PointIndexOutOfRange { index, len } => {
                write!(f, "calibration point {index} out of range (have {len})")
            }
            Self::InvalidPoint => write!(f, "calibration coordinates must be finite"),
            Self::SingularTransform => {
                write!(f, "calibration maps distinct pixels onto one stage position")
            }
        }
    }
}

impl Error for CalibrationError {}

/// Quality bucket derived from `confidence_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    /// Confidence of at least 95%.
    Excellent,
    /// Confidence from 80% up to 95%.
    Good,
    /// Confidence below 80%.
    Poor,
}

impl QualityGrade {
    pub fn from_confidence(confidence_score: f64) -> Self {
        if confidence_score >= 95.0 {
            Self::Excellent
        } else if confidence_score >= 80.0 {
            Self::Good
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationQuality {
    /// Mean re-projection error in stage units.
    pub average_residual_error: f64,
    pub max_residual_error: f64,
    /// Percentage in `[0, 100]`.
    pub confidence_score: f64,
    pub grade: QualityGrade,
    pub model: FitModel,
    pub point_count: usize,
}

#[derive(Debug, Clone)]
struct Calibration {
    transform: AffineTransform,
    inverse: AffineTransform,
    quality: CalibrationQuality,
}

#[derive(Debug, Clone)]
pub struct CoordinateTransformer {
    context: SessionContext,
    min_point_distance_px: f64,
    points: Vec<CalibrationPoint>,
    current: Option<Calibration>,
}

impl CoordinateTransformer {
    pub fn new(context: SessionContext) -> Self {
        let min_point_distance_px = context.config().calibration.min_point_distance_px;
        Self {
            context,
            min_point_distance_px,
            points: Vec::new(),
            current: None,
        }
    }

    /// Appends a point and returns its index. Does not recalculate.
    pub fn add_point(&mut self, pixel: PixelPoint, stage: StagePoint) -> CalibrationResult<usize> {
        if ![pixel.x, pixel.y, stage.x, stage.y]
            .iter()
            .all(|value| value.is_finite())
        {
            return Err(CalibrationError::InvalidPoint);
        }
        self.points.push(CalibrationPoint::new(pixel, stage));
        Ok(self.points.len() - 1)
    }

    /// Removes one point and invalidates the current transform.
    pub fn remove_point(&mut self, index: usize) -> CalibrationResult<CalibrationPoint> {
        if index >= self.points.len() {
            return Err(CalibrationError::PointIndexOutOfRange {
                index,
                len: self.points.len(),
            });
        }
        let removed = self.points.remove(index);
        self.invalidate();
        Ok(removed)
    }

    /// Removes all points and invalidates the current transform.
    pub fn clear(&mut self) {
        self.points.clear();
        self.invalidate();
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn min_point_distance_px(&self) -> f64 {
        self.min_point_distance_px
    }

    /// Overrides the degeneracy threshold for subsequent `calculate()` calls.
    pub fn set_min_point_distance_px(&mut self, threshold: f64) {
        self.min_point_distance_px = threshold;
    }

    /// Fits a transform from the current points.
    ///
    /// Two points give an exact similarity transform. Three or more give a
    /// least-squares affine fit, falling back to a least-squares similarity
    /// fit when the pixel positions are collinear.
    ///
    /// # Errors
    /// - `InsufficientPoints` with fewer than two points.
    /// - `DegenerateCalibration` when the first two points are too close.
    /// - `SingularTransform` when the fit cannot be inverted.
    pub fn calculate(&mut self) -> CalibrationResult<CalibrationQuality> {
        match self.fit() {
            Ok(calibration) => {
                let quality = calibration.quality.clone();
                info!(
                    "event=calibration_calculated module=calibration status=ok points={} model={:?} confidence={:.1} avg_residual={:.6}",
                    quality.point_count,
                    quality.model,
                    quality.confidence_score,
                    quality.average_residual_error
                );
                self.current = Some(calibration);
                self.context.publish(SessionEvent::CalibrationUpdated {
                    point_count: quality.point_count,
                    confidence_score: quality.confidence_score,
                });
                Ok(quality)
            }
            Err(err) => {
                warn!(
                    "event=calibration_failed module=calibration status=error points={} kept_previous={} reason=\"{}\"",
                    self.points.len(),
                    self.current.is_some(),
                    err
                );
                Err(err)
            }
        }
    }

    fn fit(&self) -> CalibrationResult<Calibration> {
        if self.points.len() < 2 {
            return Err(CalibrationError::InsufficientPoints {
                available: self.points.len(),
            });
        }
        let separation = self.points[0].pixel.distance_to(self.points[1].pixel);
        if separation < self.min_point_distance_px {
            return Err(CalibrationError::DegenerateCalibration {
                distance: separation,
                threshold: self.min_point_distance_px,
            });
        }

        let affine = if self.points.len() >= 3 {
            AffineTransform::fit_affine(&self.points)
        } else {
            None
        };
        let (transform, model) = match affine {
            Some(transform) => (transform, FitModel::Affine),
            None => (
                AffineTransform::fit_similarity(&self.points).ok_or(
                    CalibrationError::DegenerateCalibration {
                        distance: separation,
                        threshold: self.min_point_distance_px,
                    },
                )?,
                FitModel::Similarity,
            ),
        };
        let inverse = transform
            .inverse()
            .ok_or(CalibrationError::SingularTransform)?;
        let quality = self.score(&transform, model);
        Ok(Calibration {
            transform,
            inverse,
            quality,
        })
    }

    fn score(&self, transform: &AffineTransform, model: FitModel) -> CalibrationQuality {
        let settings = &self.context.config().calibration;
        let separation = max_pairwise_distance(&self.points);
        let separation_confidence =
            (separation / settings.confidence_reference_distance_px).min(1.0);

        let (average, max, confidence) = if self.points.len() == 2 {
            (0.0, 0.0, separation_confidence)
        } else {
            let residuals: Vec<f64> = self
                .points
                .iter()
                .map(|point| transform.apply(point.pixel).distance_to(point.stage))
                .collect();
            let average = residuals.iter().sum::<f64>() / residuals.len() as f64;
            let max = residuals.iter().copied().fold(0.0, f64::max);
            let residual_confidence = (1.0 - average / settings.residual_tolerance).max(0.0);
            (
                average,
                max,
                separation_confidence.min(residual_confidence),
            )
        };
        let confidence_score = (confidence * 100.0).clamp(0.0, 100.0);
        CalibrationQuality {
            average_residual_error: average,
            max_residual_error: max,
            confidence_score,
            grade: QualityGrade::from_confidence(confidence_score),
            model,
            point_count: self.points.len(),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.current.is_some()
    }

    pub fn quality(&self) -> Option<&CalibrationQuality> {
        self.current.as_ref().map(|calibration| &calibration.quality)
    }

    pub fn current_transform(&self) -> Option<&AffineTransform> {
        self.current.as_ref().map(|calibration| &calibration.transform)
    }

    pub fn transform(&self, pixel: PixelPoint) -> CalibrationResult<StagePoint> {
        let calibration = self.current.as_ref().ok_or(CalibrationError::NoCalibration)?;
        Ok(calibration.transform.apply(pixel))
    }

    pub fn inverse_transform(&self, stage: StagePoint) -> CalibrationResult<PixelPoint> {
        let calibration = self.current.as_ref().ok_or(CalibrationError::NoCalibration)?;
        Ok(calibration.inverse.apply_to_stage(stage))
    }

    /// Transforms each corner independently and returns the enclosing box.
    pub fn transform_bbox(&self, bbox: &BoundingBox) -> CalibrationResult<StageBox> {
        let corners = self.transform_corners(bbox)?;
        StageBox::enclosing(&corners).ok_or(CalibrationError::NoCalibration)
    }

    /// Corners in `BoundingBox::corners()` order, mapped to stage space.
    pub fn transform_corners(&self, bbox: &BoundingBox) -> CalibrationResult<[StagePoint; 4]> {
        let calibration = self.current.as_ref().ok_or(CalibrationError::NoCalibration)?;
        Ok(bbox
            .corners()
            .map(|corner| calibration.transform.apply(corner)))
    }

    fn invalidate(&mut self) {
        if self.current.take().is_some() {
            info!("event=calibration_invalidated module=calibration status=ok");
            self.context.publish(SessionEvent::CalibrationInvalidated);
        }
    }
}

fn max_pairwise_distance(points: &[CalibrationPoint]) -> f64 {
    let mut max = 0.0f64;
    for (index, first) in points.iter().enumerate() {
        for second in &points[index + 1..] {
            max = max.max(first.pixel.distance_to(second.pixel));
        }
    }
    max
}
