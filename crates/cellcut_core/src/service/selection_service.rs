//! Selection manager.
//!
//! # Responsibility
//! - Own every committed selection in creation order.
//! - Assign and validate wells and palette colours.
//! - Apply edits atomically and report per-selection statistics.
//!
//! # Invariants
//! - No two active selections share a well.
//! - A committed selection always holds at least one cell.
//! - Failed `create`/`update` calls leave every selection unchanged.
//! - Duplicate colours are allowed but logged and published.
//!
//! # See also
//! - `model::selection` for the record types.

use crate::model::cell::{CellDataset, PixelPoint};
use crate::model::color::{PaletteColor, UnknownColor, PALETTE};
use crate::model::selection::{
    Selection, SelectionDraft, SelectionId, SelectionSource, SelectionState,
};
use crate::model::well::{InvalidWell, WellId, WellSet};
use crate::session::context::{SessionContext, SessionEvent};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type SelectionResult<T> = Result<T, SelectionError>;

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionError {
    EmptySelection,
    DuplicateWell { well: WellId, owner: SelectionId },
    NotFound(SelectionId),
    /// All 96 wells are claimed.
    NoFreeWell,
    InvalidWell(String),
    InvalidColor(String),
}

impl Display for SelectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySelection => write!(f, "selection must contain at least one cell"),
            Self::DuplicateWell { well, owner } => {
                write!(f, "well {well} is already assigned to selection {owner}")
            }
            Self::NotFound(id) => write!(f, "selection not found: {id}"),
            Self::NoFreeWell => write!(f, "all wells are assigned"),
            Self::InvalidWell(text) => write!(f, "invalid well `{text}`; expected A01..H12"),
            Self::InvalidColor(text) => write!(f, "unknown palette colour `{text}`"),
        }
    }
}

impl Error for SelectionError {}

impl From<InvalidWell> for SelectionError {
    fn from(value: InvalidWell) -> Self {
        Self::InvalidWell(value.0)
    }
}

impl From<UnknownColor> for SelectionError {
    fn from(value: UnknownColor) -> Self {
        Self::InvalidColor(value.0)
    }
}

/// Partial edit applied by `SelectionManager::update`.
///
/// `None` fields are left untouched. A blank label counts as unset, the same
/// rule `create` applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionUpdate {
    pub label: Option<String>,
    pub color: Option<PaletteColor>,
    pub well: Option<WellId>,
    pub cell_indices: Option<BTreeSet<usize>>,
}

impl SelectionUpdate {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn color(mut self, color: PaletteColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn well(mut self, well: WellId) -> Self {
        self.well = Some(well);
        self
    }

    /// Parses a well label such as `"C07"` from user input.
    pub fn well_text(self, text: &str) -> SelectionResult<Self> {
        Ok(self.well(text.parse::<WellId>()?))
    }

    /// Parses a palette colour name from user input.
    pub fn color_text(self, text: &str) -> SelectionResult<Self> {
        Ok(self.color(text.parse::<PaletteColor>()?))
    }

    pub fn cells(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.cell_indices = Some(indices.into_iter().collect());
        self
    }

    fn normalized(mut self) -> Self {
        self.label = self.label.and_then(normalize_label);
        self
    }

    fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.color.is_none()
            && self.well.is_none()
            && self.cell_indices.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionStats {
    pub cell_count: usize,
    /// Mean of the cell box centres; `None` when no box could be resolved.
    pub bbox_centroid: Option<PixelPoint>,
    pub color: PaletteColor,
    pub well: WellId,
}

/// One colour shared by two or more active selections.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorConflict {
    pub color: PaletteColor,
    pub selections: Vec<SelectionId>,
}

/// Single owner of all selections in one session.
pub struct SelectionManager {
    context: SessionContext,
    selections: Vec<Selection>,
    claimed_wells: WellSet,
    color_usage: [u32; PALETTE.len()],
    created_total: u64,
}

impl SelectionManager {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            selections: Vec::new(),
            claimed_wells: WellSet::new(),
            color_usage: [0; PALETTE.len()],
            created_total: 0,
        }
    }

    /// Commits a draft.
    ///
    /// # Contract
    /// - Unset well: lowest free slot (A01, B01, ..., H01, A02, ...).
    /// - Unset colour: least-used palette entry, ties broken by palette order.
    /// - Unset label: `"Selection N"`, counting every creation in the session.
    ///
    /// # Errors
    /// - `EmptySelection` when the draft has no cells.
    /// - `DuplicateWell` when the requested well belongs to another selection.
    /// - `NoFreeWell` when all 96 wells are in use.
    pub fn create(&mut self, draft: SelectionDraft) -> SelectionResult<Selection> {
        if draft.is_empty() {
            return Err(SelectionError::EmptySelection);
        }
        let well = match draft.well {
            Some(well) => {
                if let Some(owner) = self.well_owner(well) {
                    return Err(SelectionError::DuplicateWell { well, owner });
                }
                well
            }
            None => self
                .claimed_wells
                .first_free()
                .ok_or(SelectionError::NoFreeWell)?,
        };
        let color = draft.color.unwrap_or_else(|| self.least_used_color());

        self.created_total += 1;
        let now = now_epoch_ms();
        let selection = Selection {
            id: Uuid::new_v4(),
            cell_indices: draft.cell_indices,
            label: draft
                .label
                .and_then(normalize_label)
                .unwrap_or_else(|| format!("Selection {}", self.created_total)),
            color,
            well,
            source: draft.source,
            state: SelectionState::Active,
            revision: 0,
            created_at: now,
            updated_at: now,
        };

        self.claimed_wells.claim(well);
        self.color_usage[color.index()] += 1;
        self.selections.push(selection.clone());

        info!(
            "event=selection_created module=selection status=ok id={} well={} color={} cells={}",
            selection.id,
            well,
            color,
            selection.cell_count()
        );
        self.context.publish(SessionEvent::SelectionCreated {
            id: selection.id,
            well,
        });
        self.report_duplicate_color(color);
        Ok(selection)
    }

    /// Applies a partial edit after validating every field.
    ///
    /// An empty update returns the selection unchanged without bumping its
    /// revision.
    pub fn update(&mut self, id: SelectionId, update: SelectionUpdate) -> SelectionResult<Selection> {
        let position = self.position(id)?;
        let update = update.normalized();
        if update.is_empty() {
            return Ok(self.selections[position].clone());
        }
        if let Some(cells) = &update.cell_indices {
            if cells.is_empty() {
                return Err(SelectionError::EmptySelection);
            }
        }
        if let Some(well) = update.well {
            match self.well_owner(well) {
                Some(owner) if owner != id => {
                    return Err(SelectionError::DuplicateWell { well, owner });
                }
                _ => {}
            }
        }

        let previous_color = self.selections[position].color;
        let previous_well = self.selections[position].well;
        if let Some(well) = update.well {
            self.claimed_wells.release(previous_well);
            self.claimed_wells.claim(well);
        }
        if let Some(color) = update.color {
            self.color_usage[previous_color.index()] =
                self.color_usage[previous_color.index()].saturating_sub(1);
            self.color_usage[color.index()] += 1;
        }

        let selection = &mut self.selections[position];
        if let Some(label) = update.label {
            selection.label = label;
        }
        if let Some(color) = update.color {
            selection.color = color;
        }
        if let Some(well) = update.well {
            selection.well = well;
        }
        if let Some(cells) = update.cell_indices {
            if cells != selection.cell_indices {
                selection.source = SelectionSource::Mixed;
            }
            selection.cell_indices = cells;
        }
        selection.revision += 1;
        selection.updated_at = now_epoch_ms().max(selection.updated_at);
        let updated = selection.clone();

        info!(
            "event=selection_updated module=selection status=ok id={} revision={} well={} color={}",
            updated.id, updated.revision, updated.well, updated.color
        );
        self.context.publish(SessionEvent::SelectionUpdated { id });
        if updated.color != previous_color {
            self.report_duplicate_color(updated.color);
        }
        Ok(updated)
    }

    /// Removes a selection and frees its well and colour.
    ///
    /// Returns the removed record in its terminal `Deleted` state.
    pub fn delete(&mut self, id: SelectionId) -> SelectionResult<Selection> {
        let position = self.position(id)?;
        let mut removed = self.selections.remove(position);
        self.claimed_wells.release(removed.well);
        self.color_usage[removed.color.index()] =
            self.color_usage[removed.color.index()].saturating_sub(1);
        removed.state = SelectionState::Deleted;
        removed.updated_at = now_epoch_ms().max(removed.updated_at);

        info!(
            "event=selection_deleted module=selection status=ok id={} well={}",
            removed.id, removed.well
        );
        self.context.publish(SessionEvent::SelectionDeleted {
            id,
            well: removed.well,
        });
        Ok(removed)
    }

    /// Active selections in creation order.
    pub fn list(&self) -> &[Selection] {
        &self.selections
    }

    pub fn get(&self, id: SelectionId) -> Option<&Selection> {
        self.selections.iter().find(|selection| selection.id == id)
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn stats<D: CellDataset + ?Sized>(
        &self,
        id: SelectionId,
        dataset: &D,
    ) -> SelectionResult<SelectionStats> {
        let selection = self.get(id).ok_or(SelectionError::NotFound(id))?;
        let mut resolved = 0usize;
        let (mut sum_x, mut sum_y) = (0.0, 0.0);
        for index in &selection.cell_indices {
            if let Some(bbox) = dataset.bounding_box(*index) {
                let center = bbox.center();
                sum_x += center.x;
                sum_y += center.y;
                resolved += 1;
            }
        }
        let bbox_centroid = (resolved > 0)
            .then(|| PixelPoint::new(sum_x / resolved as f64, sum_y / resolved as f64));
        Ok(SelectionStats {
            cell_count: selection.cell_count(),
            bbox_centroid,
            color: selection.color,
            well: selection.well,
        })
    }

    /// Colours currently shared by more than one selection, in palette order.
    pub fn color_conflicts(&self) -> Vec<ColorConflict> {
        PALETTE
            .iter()
            .filter(|color| self.color_usage[color.index()] > 1)
            .map(|color| ColorConflict {
                color: *color,
                selections: self.selections_with_color(*color),
            })
            .collect()
    }

    /// Whether `well` is assigned to an active selection.
    pub fn is_well_claimed(&self, well: WellId) -> bool {
        self.claimed_wells.contains(well)
    }

    fn position(&self, id: SelectionId) -> SelectionResult<usize> {
        self.selections
            .iter()
            .position(|selection| selection.id == id)
            .ok_or(SelectionError::NotFound(id))
    }

    fn well_owner(&self, well: WellId) -> Option<SelectionId> {
        if !self.claimed_wells.contains(well) {
            return None;
        }
        self.selections
            .iter()
            .find(|selection| selection.well == well)
            .map(|selection| selection.id)
    }

    fn least_used_color(&self) -> PaletteColor {
        // `min_by_key` keeps the first minimum, i.e. palette order on ties.
        PALETTE
            .iter()
            .copied()
            .min_by_key(|color| self.color_usage[color.index()])
            .unwrap_or(PALETTE[0])
    }

    fn selections_with_color(&self, color: PaletteColor) -> Vec<SelectionId> {
        self.selections
            .iter()
            .filter(|selection| selection.color == color)
            .map(|selection| selection.id)
            .collect()
    }

    fn report_duplicate_color(&self, color: PaletteColor) {
        if self.color_usage[color.index()] < 2 {
            return;
        }
        let selections = self.selections_with_color(color);
        warn!(
            "event=duplicate_color module=selection status=ok color={} selections={}",
            color,
            selections.len()
        );
        self.context
            .publish(SessionEvent::DuplicateColor { color, selections });
    }
}

/// Trimmed label, or `None` when nothing but whitespace remains.
fn normalize_label(label: String) -> Option<String> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
