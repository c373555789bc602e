mod common;

use common::{list, location, trip, Harness};
use trip_planner_core::model::ListPatch;
use trip_planner_core::remote::RemoteCall;
use trip_planner_core::{Event, LatLon, ListId, LocationId, Operation, SyncError, TripId};

#[tokio::test]
async fn dragging_a_list_to_the_top_renumbers_the_trip() {
    let h = Harness::new(
        vec![trip("t")],
        vec![list("a", "t", 0), list("b", "t", 1), list("c", "t", 2)],
        vec![],
    );
    h.open("t").await;

    h.planner
        .dispatch(Event::ListDragEnded {
            trip_id: TripId::new("t"),
            list_id: ListId::new("c"),
            from: 2,
            to: 0,
        })
        .await
        .unwrap();

    assert_eq!(
        h.list_order("t"),
        [("c".into(), 0), ("a".into(), 1), ("b".into(), 2)]
    );
    // One batch carrying only the new rank of each list.
    let calls = h.lists.calls();
    assert_eq!(calls.len(), 1);
    let RemoteCall::UpdateBatch(batch) = &calls[0] else {
        panic!("expected a batch update, got {calls:?}");
    };
    assert_eq!(
        batch,
        &vec![
            (ListId::new("c"), ListPatch::default().display_order(0)),
            (ListId::new("a"), ListPatch::default().display_order(1)),
            (ListId::new("b"), ListPatch::default().display_order(2)),
        ]
    );
    assert_eq!(h.lists.row(&ListId::new("c")).unwrap().display_order, 0);
}

#[tokio::test]
async fn failed_reorder_restores_the_previous_order() {
    let h = Harness::new(
        vec![trip("t")],
        vec![],
        vec![
            location("p1", "t", "l", 0),
            location("p2", "t", "l", 1),
            location("p3", "t", "l", 2),
        ],
    );
    h.open("t").await;
    let before = h.planner.locations().snapshot();
    h.locations.fail_next(Operation::Reorder);

    let err = h
        .planner
        .dispatch(Event::LocationDragEnded {
            list_id: ListId::new("l"),
            location_id: LocationId::new("p1"),
            from: 0,
            to: 2,
        })
        .await
        .unwrap_err();

    assert!(err.is_remote());
    assert_eq!(h.planner.locations().snapshot(), before);
}

#[tokio::test]
async fn failed_location_delete_restores_it_and_its_siblings() {
    let h = Harness::new(
        vec![trip("t")],
        vec![list("l", "t", 0)],
        vec![location("p1", "t", "l", 0), location("p2", "t", "l", 1)],
    );
    h.open("t").await;
    let mut failures = h.planner.subscribe_failures();
    h.locations.fail_next(Operation::Delete);

    let result = h
        .planner
        .dispatch(Event::DeleteLocation {
            location_id: LocationId::new("p1"),
        })
        .await;

    assert!(matches!(result, Err(SyncError::Remote { .. })));
    assert_eq!(h.location_order("l"), [("p1".into(), 0), ("p2".into(), 1)]);
    // The renumber batch is never sent once the delete fails.
    assert!(h.locations.calls_of(Operation::Reorder).is_empty());

    let failure = failures.try_recv().unwrap();
    assert_eq!(failure.operation, Operation::Delete);
    assert_eq!(failure.entity_id, "p1");
}

#[tokio::test]
async fn rolled_back_edit_leaves_state_identical_to_before() {
    let h = Harness::new(vec![trip("t")], vec![], vec![]);
    h.open("t").await;
    let before = h.planner.trips().snapshot();
    h.trips.fail_next(Operation::Update);

    let moved = h
        .planner
        .dispatch(Event::TripCenterMoved {
            trip_id: TripId::new("t"),
            center: LatLon::new(35.68, 139.69).unwrap(),
        })
        .await;

    assert!(moved.is_err());
    assert_eq!(h.planner.trips().snapshot(), before);
    assert!(!h.planner.trips().is_pending(&TripId::new("t")));

    // A second edit after the rollback goes through normally.
    let center = LatLon::new(35.68, 139.69).unwrap();
    h.planner
        .dispatch(Event::TripCenterMoved {
            trip_id: TripId::new("t"),
            center,
        })
        .await
        .unwrap();
    assert_eq!(h.trips.row(&TripId::new("t")).unwrap().center, center);
}

#[tokio::test]
async fn new_locations_are_ranked_after_their_siblings() {
    let h = Harness::new(
        vec![trip("t")],
        vec![list("full", "t", 0), list("empty", "t", 1)],
        vec![
            location("p1", "t", "full", 0),
            location("p2", "t", "full", 1),
            location("p3", "t", "full", 2),
        ],
    );
    h.open("t").await;

    assert_eq!(h.planner.locations().next_order_in(&ListId::new("full")), 3);
    assert_eq!(h.planner.locations().next_order_in(&ListId::new("empty")), 0);
}
