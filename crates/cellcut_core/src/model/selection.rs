//! Selection domain model.
//!
//! # Responsibility
//! - Define the committed `Selection` record tracked by the selection service.
//! - Define `SelectionDraft`, the interactive state before commit.
//!
//! # Invariants
//! - `id` is stable and never reused for another selection.
//! - A committed selection always holds at least one cell index.
//! - `well` uniqueness is enforced by `SelectionManager`, not by this type.
//!
//! # See also
//! - `service::selection_service`

use crate::model::cell::PixelRect;
use crate::model::color::PaletteColor;
use crate::model::well::WellId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable identifier of one selection.
pub type SelectionId = Uuid;

/// How the cell set of a selection was produced.
///
/// Expression text is retained for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionSource {
    /// Cells whose box centre fell inside a user-dragged rectangle.
    ManualRectangle { rect: PixelRect },
    /// Cells matched by a filter expression.
    Expression { text: String },
    /// Union of several sources, e.g. after membership edits.
    Mixed,
}

/// Lifecycle stage of a committed selection.
///
/// The draft stage is [`SelectionDraft`]. An edit is applied atomically and
/// the record stays `Active`; `Selection::revision` counts edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    Active,
    /// Removed. Terminal.
    Deleted,
}

/// Named, coloured, well-assigned group of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub id: SelectionId,
    pub cell_indices: BTreeSet<usize>,
    pub label: String,
    pub color: PaletteColor,
    pub well: WellId,
    pub source: SelectionSource,
    pub state: SelectionState,
    /// Number of committed edits.
    pub revision: u32,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the latest edit (or creation).
    pub updated_at: i64,
}

impl Selection {
    pub fn cell_count(&self) -> usize {
        self.cell_indices.len()
    }

    /// Exportable selections are committed and not deleted.
    pub fn is_active(&self) -> bool {
        self.state != SelectionState::Deleted
    }
}

/// Selection being defined interactively, before it is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionDraft {
    pub cell_indices: BTreeSet<usize>,
    pub label: Option<String>,
    pub color: Option<PaletteColor>,
    pub well: Option<WellId>,
    pub source: SelectionSource,
}

impl SelectionDraft {
    pub fn new(source: SelectionSource) -> Self {
        Self {
            cell_indices: BTreeSet::new(),
            label: None,
            color: None,
            well: None,
            source,
        }
    }

    /// Draft seeded from a boolean mask, e.g. an expression result.
    pub fn from_mask(mask: &[bool], source: SelectionSource) -> Self {
        let mut draft = Self::new(source);
        draft.cell_indices = mask
            .iter()
            .enumerate()
            .filter_map(|(index, selected)| selected.then_some(index))
            .collect();
        draft
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color(mut self, color: PaletteColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_well(mut self, well: WellId) -> Self {
        self.well = Some(well);
        self
    }

    pub fn add_cells(&mut self, indices: impl IntoIterator<Item = usize>) {
        self.cell_indices.extend(indices);
    }

    pub fn remove_cells(&mut self, indices: impl IntoIterator<Item = usize>) {
        for index in indices {
            self.cell_indices.remove(&index);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cell_indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{SelectionDraft, SelectionSource};

    #[test]
    fn draft_from_mask_keeps_true_positions() {
        let draft = SelectionDraft::from_mask(
            &[false, true, true, false, true],
            SelectionSource::Expression {
                text: "area > 1".to_string(),
            },
        );
        assert_eq!(draft.cell_indices.into_iter().collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn draft_membership_edits() {
        let mut draft = SelectionDraft::new(SelectionSource::Mixed);
        assert!(draft.is_empty());
        draft.add_cells([3, 1, 3]);
        draft.remove_cells([1]);
        assert_eq!(draft.cell_indices.len(), 1);
    }

    #[test]
    fn source_serializes_with_kind_tag() {
        let source = SelectionSource::Expression {
            text: "area > mean(area)".to_string(),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["kind"], "expression");
        assert_eq!(json["text"], "area > mean(area)");
    }
}
