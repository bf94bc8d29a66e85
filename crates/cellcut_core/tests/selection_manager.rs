use cellcut_core::{
    draft_from_rect, BoundingBox, CellTable, PaletteColor, PixelPoint, PixelRect, SelectionDraft,
    SelectionError, SelectionManager, SelectionSource, SelectionState, SelectionUpdate,
    SessionContext, SessionEvent, WellId, WELL_COUNT,
};

fn manager() -> SelectionManager {
    SelectionManager::new(SessionContext::default())
}

fn draft(cells: &[usize]) -> SelectionDraft {
    let mut draft = SelectionDraft::new(SelectionSource::Expression {
        text: "area > mean(area)".to_string(),
    });
    draft.add_cells(cells.iter().copied());
    draft
}

fn well(label: &str) -> WellId {
    label.parse().unwrap()
}

#[test]
fn create_then_list_contains_selection_once() {
    let mut manager = manager();
    let created = manager.create(draft(&[3, 1, 2])).unwrap();

    let listed: Vec<_> = manager
        .list()
        .iter()
        .filter(|selection| selection.id == created.id)
        .collect();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, SelectionState::Active);
    assert_eq!(listed[0].cell_count(), 3);
    assert_eq!(listed[0].label, "Selection 1");
}

#[test]
fn empty_selection_is_rejected() {
    let mut manager = manager();
    assert_eq!(
        manager.create(draft(&[])),
        Err(SelectionError::EmptySelection)
    );
    assert!(manager.is_empty());
}

#[test]
fn wells_follow_plate_order_and_freed_wells_are_reused() {
    let mut manager = manager();
    let first = manager.create(draft(&[0])).unwrap();
    let second = manager.create(draft(&[1])).unwrap();
    assert_eq!(first.well.to_string(), "A01");
    assert_eq!(second.well.to_string(), "B01");

    let deleted = manager.delete(first.id).unwrap();
    assert_eq!(deleted.state, SelectionState::Deleted);
    assert!(manager.list().iter().all(|selection| selection.id != first.id));
    assert!(!manager.is_well_claimed(well("A01")));

    let third = manager.create(draft(&[2])).unwrap();
    assert_eq!(third.well.to_string(), "A01");
}

#[test]
fn list_keeps_creation_order() {
    let mut manager = manager();
    let ids: Vec<_> = (0..4)
        .map(|index| manager.create(draft(&[index])).unwrap().id)
        .collect();
    manager
        .update(ids[0], SelectionUpdate::default().label("renamed"))
        .unwrap();
    let listed: Vec<_> = manager.list().iter().map(|selection| selection.id).collect();
    assert_eq!(listed, ids);
}

#[test]
fn duplicate_well_update_changes_nothing() {
    let mut manager = manager();
    let first = manager.create(draft(&[0])).unwrap();
    let second = manager.create(draft(&[1])).unwrap();

    let err = manager
        .update(
            second.id,
            SelectionUpdate::default()
                .label("moved")
                .color(PaletteColor::Navy)
                .well(first.well),
        )
        .unwrap_err();
    assert_eq!(
        err,
        SelectionError::DuplicateWell {
            well: first.well,
            owner: first.id
        }
    );
    assert_eq!(manager.get(first.id), Some(&first));
    assert_eq!(manager.get(second.id), Some(&second));
}

#[test]
fn duplicate_manual_well_on_create_is_rejected() {
    let mut manager = manager();
    manager.create(draft(&[0]).with_well(well("C07"))).unwrap();
    let err = manager
        .create(draft(&[1]).with_well(well("c07")))
        .unwrap_err();
    assert!(matches!(err, SelectionError::DuplicateWell { .. }));
    assert_eq!(manager.len(), 1);
}

#[test]
fn update_moves_well_and_tracks_revision() {
    let mut manager = manager();
    let created = manager.create(draft(&[0, 1])).unwrap();
    let updated = manager
        .update(
            created.id,
            SelectionUpdate::default()
                .well_text("H12")
                .unwrap()
                .color(PaletteColor::Teal),
        )
        .unwrap();
    assert_eq!(updated.well.to_string(), "H12");
    assert_eq!(updated.color, PaletteColor::Teal);
    assert_eq!(updated.state, SelectionState::Active);
    assert!(updated.is_active());
    assert_eq!(updated.revision, 1);
    assert!(updated.updated_at >= created.updated_at);
    assert!(!manager.is_well_claimed(created.well));

    // Same well as its own is not a conflict.
    let again = manager
        .update(created.id, SelectionUpdate::default().well(updated.well))
        .unwrap();
    assert_eq!(again.revision, 2);

    assert_eq!(
        manager.update(created.id, SelectionUpdate::default().cells(Vec::<usize>::new())),
        Err(SelectionError::EmptySelection)
    );
}

#[test]
fn unknown_ids_are_reported() {
    let mut manager = manager();
    let created = manager.create(draft(&[0])).unwrap();
    manager.delete(created.id).unwrap();
    assert_eq!(
        manager.delete(created.id),
        Err(SelectionError::NotFound(created.id))
    );
}

#[test]
fn plate_exhaustion_reports_no_free_well() {
    let mut manager = manager();
    for index in 0..WELL_COUNT {
        manager.create(draft(&[index])).unwrap();
    }
    assert_eq!(
        manager.create(draft(&[0])),
        Err(SelectionError::NoFreeWell)
    );
}

#[test]
fn duplicate_colors_are_allowed_and_flagged() {
    let context = SessionContext::default();
    let events = context.subscribe();
    let mut manager = SelectionManager::new(context);

    let first = manager
        .create(draft(&[0]).with_color(PaletteColor::Orange))
        .unwrap();
    let second = manager
        .create(draft(&[1]).with_color(PaletteColor::Orange))
        .unwrap();

    let conflicts = manager.color_conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].color, PaletteColor::Orange);
    assert_eq!(conflicts[0].selections, vec![first.id, second.id]);

    let flagged = events
        .try_iter()
        .any(|event| matches!(event, SessionEvent::DuplicateColor { color: PaletteColor::Orange, .. }));
    assert!(flagged);
}

#[test]
fn stats_report_centroid_of_box_centres() {
    let table = CellTable::new(vec![
        BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        BoundingBox::new(20.0, 0.0, 30.0, 10.0),
        BoundingBox::new(100.0, 100.0, 110.0, 110.0),
    ]);
    let mut manager = manager();
    let created = manager.create(draft(&[0, 1])).unwrap();

    let stats = manager.stats(created.id, &table).unwrap();
    assert_eq!(stats.cell_count, 2);
    assert_eq!(stats.bbox_centroid, Some(PixelPoint::new(15.0, 5.0)));
    assert_eq!(stats.well, created.well);
    assert_eq!(stats.color, created.color);
}

#[test]
fn rectangle_drafts_commit_with_their_source() {
    let table = CellTable::new(vec![
        BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        BoundingBox::new(200.0, 200.0, 210.0, 210.0),
    ]);
    let rect = PixelRect::new(PixelPoint::new(0.0, 0.0), PixelPoint::new(50.0, 50.0));
    let mut manager = manager();
    let created = manager.create(draft_from_rect(&table, rect)).unwrap();
    assert_eq!(created.cell_indices.iter().copied().collect::<Vec<_>>(), vec![0]);
    assert_eq!(created.source, SelectionSource::ManualRectangle { rect });
}
