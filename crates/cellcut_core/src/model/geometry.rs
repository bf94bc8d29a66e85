//! Stage-space geometry.
//!
//! Stage coordinates are physical positions reported by the instrument,
//! in stage units (millimetres on the supported hardware).

use serde::{Deserialize, Serialize};

/// Point in physical stage space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StagePoint {
    pub x: f64,
    pub y: f64,
}

impl StagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: StagePoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned stage-space box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl StageBox {
    /// Smallest box enclosing all `points`. Returns `None` for an empty slice.
    pub fn enclosing(points: &[StagePoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for point in &points[1..] {
            bounds.min_x = bounds.min_x.min(point.x);
            bounds.min_y = bounds.min_y.min(point.y);
            bounds.max_x = bounds.max_x.max(point.x);
            bounds.max_y = bounds.max_y.max(point.y);
        }
        Some(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::{StageBox, StagePoint};

    #[test]
    fn enclosing_orders_bounds() {
        let bounds = StageBox::enclosing(&[
            StagePoint::new(1.0, -2.0),
            StagePoint::new(-1.0, 3.0),
            StagePoint::new(0.5, 0.0),
        ])
        .unwrap();
        assert_eq!(bounds.min_x, -1.0);
        assert_eq!(bounds.max_y, 3.0);
        assert!(StageBox::enclosing(&[]).is_none());
    }
}
