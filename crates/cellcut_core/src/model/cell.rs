//! Cell records, pixel geometry and the dataset seam.
//!
//! # Responsibility
//! - Define pixel-space primitives (`PixelPoint`, `PixelRect`, `BoundingBox`).
//! - Define the read-only `CellDataset` contract supplied by the tabular
//!   loading collaborator.
//! - Provide `CellTable`, an in-memory columnar dataset.
//!
//! # Invariants
//! - Every column in a `CellTable` has exactly `record_count()` values.
//! - Cells are referenced by their integer index into the dataset only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Point in image pixel space. `x` grows right, `y` grows down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other` in pixels.
    pub fn distance_to(&self, other: PixelPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned pixel-space bounding box of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Returns the four corners: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [PixelPoint; 4] {
        [
            PixelPoint::new(self.min_x, self.min_y),
            PixelPoint::new(self.max_x, self.min_y),
            PixelPoint::new(self.max_x, self.max_y),
            PixelPoint::new(self.min_x, self.max_y),
        ]
    }

    /// A box is well-formed when all bounds are finite and not inverted.
    pub fn is_well_formed(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|value| value.is_finite())
            && self.max_x >= self.min_x
            && self.max_y >= self.min_y
    }
}

/// Rectangle dragged by the user in pixel space.
///
/// Corners may be given in any order; `normalized()` orders them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub start: PixelPoint,
    pub end: PixelPoint,
}

impl PixelRect {
    pub fn new(start: PixelPoint, end: PixelPoint) -> Self {
        Self { start, end }
    }

    pub fn normalized(&self) -> BoundingBox {
        BoundingBox::new(
            self.start.x.min(self.end.x),
            self.start.y.min(self.end.y),
            self.start.x.max(self.end.x),
            self.start.y.max(self.end.y),
        )
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: PixelPoint) -> bool {
        let bounds = self.normalized();
        point.x >= bounds.min_x
            && point.x <= bounds.max_x
            && point.y >= bounds.min_y
            && point.y <= bounds.max_y
    }
}

/// Read-only view over per-cell records owned by the data-loading collaborator.
///
/// Implementations must be cheap to query repeatedly; evaluation reads whole
/// columns as slices.
pub trait CellDataset {
    fn record_count(&self) -> usize;
    /// Numeric feature column by exact name.
    fn column(&self, name: &str) -> Option<&[f64]>;
    /// Column names in schema order.
    fn column_names(&self) -> Vec<String>;
    fn bounding_box(&self, index: usize) -> Option<BoundingBox>;

    fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Errors raised while assembling a `CellTable`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellTableError {
    /// Column length differs from the bounding-box count.
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },
    DuplicateColumn(String),
    EmptyColumnName,
}

impl Display for CellTableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ColumnLength {
                column,
                expected,
                actual,
            } => write!(
                f,
                "column `{column}` has {actual} values, expected {expected}"
            ),
            Self::DuplicateColumn(name) => write!(f, "column `{name}` is defined twice"),
            Self::EmptyColumnName => write!(f, "column name must not be blank"),
        }
    }
}

impl Error for CellTableError {}

/// In-memory columnar dataset: bounding boxes plus named numeric columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellTable {
    boxes: Vec<BoundingBox>,
    order: Vec<String>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl CellTable {
    /// Creates a table with only bounding boxes and no feature columns.
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            order: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    /// Adds one feature column, validating its length against the record count.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, CellTableError> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), CellTableError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CellTableError::EmptyColumnName);
        }
        if values.len() != self.boxes.len() {
            return Err(CellTableError::ColumnLength {
                column: name,
                expected: self.boxes.len(),
                actual: values.len(),
            });
        }
        if self.columns.contains_key(&name) {
            return Err(CellTableError::DuplicateColumn(name));
        }
        self.order.push(name.clone());
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn bounding_boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }
}

impl CellDataset for CellTable {
    fn record_count(&self) -> usize {
        self.boxes.len()
    }

    fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    fn column_names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn bounding_box(&self, index: usize) -> Option<BoundingBox> {
        self.boxes.get(index).copied()
    }
}
