//! Manual rectangle selection over cell box centres.

use crate::model::cell::{CellDataset, PixelRect};
use crate::model::selection::{SelectionDraft, SelectionSource};

/// Indices of cells whose bounding-box centre lies inside `rect` (inclusive).
///
/// Cells without a resolvable or well-formed box are ignored.
pub fn select_in_rect<D: CellDataset + ?Sized>(dataset: &D, rect: PixelRect) -> Vec<usize> {
    (0..dataset.record_count())
        .filter(|index| {
            dataset
                .bounding_box(*index)
                .filter(|bbox| bbox.is_well_formed())
                .is_some_and(|bbox| rect.contains(bbox.center()))
        })
        .collect()
}

/// Draft seeded from a dragged rectangle, tagged with its source.
pub fn draft_from_rect<D: CellDataset + ?Sized>(dataset: &D, rect: PixelRect) -> SelectionDraft {
    let mut draft = SelectionDraft::new(SelectionSource::ManualRectangle { rect });
    draft.add_cells(select_in_rect(dataset, rect));
    draft
}

#[cfg(test)]
mod tests {
    use super::{draft_from_rect, select_in_rect};
    use crate::model::cell::{BoundingBox, CellTable, PixelPoint, PixelRect};
    use crate::model::selection::SelectionSource;

    fn table() -> CellTable {
        CellTable::new(vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(20.0, 20.0, 40.0, 40.0),
            BoundingBox::new(90.0, 90.0, 110.0, 110.0),
            BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0),
        ])
    }

    #[test]
    fn centre_inside_counts_even_when_box_overflows() {
        // Rect corners given bottom-right first.
        let rect = PixelRect::new(PixelPoint::new(100.0, 100.0), PixelPoint::new(5.0, 5.0));
        assert_eq!(select_in_rect(&table(), rect), vec![0, 1, 2]);
    }

    #[test]
    fn boundary_is_inclusive() {
        let rect = PixelRect::new(PixelPoint::new(30.0, 30.0), PixelPoint::new(50.0, 50.0));
        assert_eq!(select_in_rect(&table(), rect), vec![1]);
    }

    #[test]
    fn draft_keeps_rectangle_source() {
        let rect = PixelRect::new(PixelPoint::new(0.0, 0.0), PixelPoint::new(12.0, 12.0));
        let draft = draft_from_rect(&table(), rect);
        assert_eq!(draft.source, SelectionSource::ManualRectangle { rect });
        assert_eq!(draft.cell_indices.len(), 1);
    }
}
