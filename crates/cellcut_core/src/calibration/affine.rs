//! Affine pixel-to-stage map and its least-squares solvers.
//!
//! `stage.x = a * px + b * py + tx`, `stage.y = c * px + d * py + ty`.

use crate::model::cell::PixelPoint;
use crate::model::geometry::StagePoint;
use serde::{Deserialize, Serialize};

/// Relative determinant below which a system is treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

/// Verified correspondence between one pixel and one stage position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub pixel: PixelPoint,
    pub stage: StagePoint,
}

impl CalibrationPoint {
    pub fn new(pixel: PixelPoint, stage: StagePoint) -> Self {
        Self { pixel, stage }
    }
}

/// Model used to fit the current transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitModel {
    /// Rotation + uniform scale + translation (4 degrees of freedom).
    Similarity,
    /// Full affine (6 degrees of freedom); needs non-collinear points.
    Affine,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    pub fn apply(&self, pixel: PixelPoint) -> StagePoint {
        StagePoint::new(
            self.a * pixel.x + self.b * pixel.y + self.tx,
            self.c * pixel.x + self.d * pixel.y + self.ty,
        )
    }

    /// Applies the same linear map to stage coordinates. Used with the
    /// transform returned by `inverse()` to go back to pixel space.
    pub fn apply_to_stage(&self, stage: StagePoint) -> PixelPoint {
        PixelPoint::new(
            self.a * stage.x + self.b * stage.y + self.tx,
            self.c * stage.x + self.d * stage.y + self.ty,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// Inverse map, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        let det = self.determinant();
        let magnitude = self.a.abs() + self.b.abs() + self.c.abs() + self.d.abs();
        if !det.is_finite() || det.abs() <= SINGULAR_EPSILON * magnitude * magnitude {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Self {
            a,
            b,
            c,
            d,
            tx: -(a * self.tx + b * self.ty),
            ty: -(c * self.tx + d * self.ty),
        })
    }

    /// Stage units per pixel (geometric mean of both axes).
    pub fn scale(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    /// Rotation of the pixel x-axis in stage space, in degrees.
    pub fn rotation_degrees(&self) -> f64 {
        self.c.atan2(self.a).to_degrees()
    }

    /// Least-squares similarity fit. Exact for two distinct points.
    ///
    /// Returns `None` when all pixel positions coincide.
    pub fn fit_similarity(points: &[CalibrationPoint]) -> Option<Self> {
        let centroid = Centroids::of(points)?;
        let mut spread = 0.0;
        let mut dot = 0.0;
        let mut cross = 0.0;
        for point in points {
            let (dx, dy) = (point.pixel.x - centroid.px, point.pixel.y - centroid.py);
            let (sx, sy) = (point.stage.x - centroid.sx, point.stage.y - centroid.sy);
            spread += dx * dx + dy * dy;
            dot += dx * sx + dy * sy;
            cross += dx * sy - dy * sx;
        }
        if spread <= 0.0 || !spread.is_finite() {
            return None;
        }
        let scale_cos = dot / spread;
        let scale_sin = cross / spread;
        Some(Self {
            a: scale_cos,
            b: -scale_sin,
            c: scale_sin,
            d: scale_cos,
            tx: centroid.sx - scale_cos * centroid.px + scale_sin * centroid.py,
            ty: centroid.sy - scale_sin * centroid.px - scale_cos * centroid.py,
        })
    }

    /// Least-squares full affine fit over three or more points.
    ///
    /// Returns `None` for fewer than three points or collinear pixel positions.
    pub fn fit_affine(points: &[CalibrationPoint]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let centroid = Centroids::of(points)?;
        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        let (mut xu, mut yu, mut xv, mut yv) = (0.0, 0.0, 0.0, 0.0);
        for point in points {
            let (dx, dy) = (point.pixel.x - centroid.px, point.pixel.y - centroid.py);
            let (du, dv) = (point.stage.x - centroid.sx, point.stage.y - centroid.sy);
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
            xu += dx * du;
            yu += dy * du;
            xv += dx * dv;
            yv += dy * dv;
        }
        let det = sxx * syy - sxy * sxy;
        let magnitude = sxx + syy;
        if !det.is_finite() || det.abs() <= SINGULAR_EPSILON * magnitude * magnitude {
            return None;
        }
        let a = (syy * xu - sxy * yu) / det;
        let b = (sxx * yu - sxy * xu) / det;
        let c = (syy * xv - sxy * yv) / det;
        let d = (sxx * yv - sxy * xv) / det;
        Some(Self {
            a,
            b,
            c,
            d,
            tx: centroid.sx - a * centroid.px - b * centroid.py,
            ty: centroid.sy - c * centroid.px - d * centroid.py,
        })
    }
}

struct Centroids {
    px: f64,
    py: f64,
    sx: f64,
    sy: f64,
}

impl Centroids {
    fn of(points: &[CalibrationPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let mut centroid = Self {
            px: 0.0,
            py: 0.0,
            sx: 0.0,
            sy: 0.0,
        };
        for point in points {
            centroid.px += point.pixel.x;
            centroid.py += point.pixel.y;
            centroid.sx += point.stage.x;
            centroid.sy += point.stage.y;
        }
        centroid.px /= n;
        centroid.py /= n;
        centroid.sx /= n;
        centroid.sy /= n;
        Some(centroid)
    }
}
