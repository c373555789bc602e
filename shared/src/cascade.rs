//! Operations that span more than one store.
//!
//! Each cascade opens one ticket per touched collection. The remote delete
//! (or update) of the primary record decides the outcome: if it fails, every
//! ticket rolls back together. Once it succeeds the primary change is final,
//! and follow-up writes (child deletes, sibling renumbering) that fail only
//! undo their own local effect and surface as `SyncError::PartialCascade`.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Operation, SyncError};
use crate::model::{
    Entity, EntityKind, List, ListId, Location, LocationId, LocationPatch, NewLocation, Ranked,
    TripId, ValidationError,
};
use crate::mutator::Ticket;
use crate::ordering;
use crate::remote::{BlobStorage, RemoteError};
use crate::store::{image_path, Confirmed, EntityStore, ListStore, LocationStore, TripStore};

#[derive(Clone)]
pub struct CascadeCoordinator {
    trips: TripStore,
    lists: ListStore,
    locations: LocationStore,
    storage: Arc<dyn BlobStorage>,
}

async fn delete_children<E: Entity>(
    store: &EntityStore<E>,
    children: &[E],
) -> Result<(), RemoteError> {
    for child in children {
        store.call(store.remote().delete(child.id())).await?;
    }
    Ok(())
}

/// Renumber the children of `parent` locally, in their own ticket.
fn renumber_locally<E: Ranked>(
    store: &EntityStore<E>,
    parent: &E::Parent,
) -> Result<(Ticket<E>, Vec<(E::Id, E::Patch)>), SyncError> {
    store.mutator().begin("renumber", |draft| {
        let siblings = draft.siblings(parent);
        Ok(draft.apply_ranks(&ordering::renumber_after_removal(siblings)))
    })
}

impl CascadeCoordinator {
    pub fn new(
        trips: TripStore,
        lists: ListStore,
        locations: LocationStore,
        storage: Arc<dyn BlobStorage>,
    ) -> Self {
        Self {
            trips,
            lists,
            locations,
            storage,
        }
    }

    fn partial(
        &self,
        kind: EntityKind,
        id: impl ToString,
        operation: Operation,
        source: RemoteError,
    ) -> SyncError {
        let err = SyncError::PartialCascade {
            kind,
            id: id.to_string(),
            operation,
            source,
        };
        self.lists.reporter().publish_error(kind, operation, &err);
        err
    }

    /// Persist rank patches written after the primary change settled.
    async fn follow_up_ranks<E: Ranked>(
        &self,
        store: &EntityStore<E>,
        ticket: Ticket<E>,
        batch: Vec<(E::Id, E::Patch)>,
        deleted: &E::Id,
    ) -> Result<(), SyncError> {
        if ticket.is_empty() {
            store.mutator().commit(ticket);
            return Ok(());
        }
        match store.call(store.remote().update_batch(&batch)).await {
            Ok(()) => {
                store.mutator().commit(ticket);
                Ok(())
            }
            Err(source) => {
                // Local ranks go back to what the remote store still holds.
                store.mutator().rollback(ticket);
                Err(self.partial(E::KIND, deleted, Operation::Reorder, source))
            }
        }
    }

    // --- Lists ---

    /// Locations can only reference a list the server already holds.
    fn confirmed_list(&self, list_id: &ListId) -> Result<List, SyncError> {
        let list = self
            .lists
            .get(list_id)
            .ok_or_else(|| SyncError::not_found(EntityKind::List, list_id))?;
        if self.lists.is_inserting(list_id) {
            return Err(ValidationError::ListUnconfirmed(list_id.to_string()).into());
        }
        Ok(list)
    }

    /// Turn routing on or off. Routing cannot be enabled on a list holding
    /// more locations than the routing limit.
    pub async fn set_routing(&self, list_id: &ListId, routing: bool) -> Result<(), SyncError> {
        let list_id = self.lists.mutator().resolve(list_id);
        let max = self.lists.config().max_routing_locations;
        let count = self.locations.count_in(&list_id);
        if routing && count > max {
            return Err(ValidationError::RoutingLimit { count, max }.into());
        }
        self.lists.write_routing(&list_id, routing).await
    }

    async fn enforce_routing_limit(&self, list_id: &ListId) {
        let Some(list) = self.lists.get(list_id) else {
            return;
        };
        let max = self.lists.config().max_routing_locations;
        let count = self.locations.count_in(list_id);
        if list.routing && count > max {
            info!(list = %list_id, count, max, "routing limit exceeded, turning routing off");
            if let Err(err) = self.lists.write_routing(list_id, false).await {
                warn!(list = %list_id, %err, "could not turn routing off");
            }
        }
    }

    /// Delete a list with all of its locations and close the gap in the
    /// trip's list ranks.
    #[instrument(skip_all, fields(list = %list_id))]
    pub async fn delete_list(&self, list_id: &ListId) -> Result<(), SyncError> {
        let lists = self.lists.mutator();
        let locations = self.locations.mutator();
        let list_id = lists.resolve(list_id);
        let list = self
            .lists
            .get(&list_id)
            .ok_or_else(|| SyncError::not_found(EntityKind::List, &list_id))?;

        self.lists.discard_pending(&list_id);
        for location in self.locations.locations_in(&list_id) {
            self.locations.discard_pending(&location.id);
        }

        let (list_ticket, ()) = lists.begin("delete list", |draft| {
            draft
                .remove(&list_id)
                .map(|_| ())
                .ok_or_else(|| SyncError::not_found(EntityKind::List, &list_id))
        })?;
        let (children_ticket, children) = match locations.begin("delete list locations", |draft| {
            Ok(draft.remove_where(|l: &Location| l.list_id == list_id))
        }) {
            Ok(applied) => applied,
            Err(err) => {
                lists.rollback(list_ticket);
                return Err(err);
            }
        };
        let (ranks_ticket, batch) = match renumber_locally(&self.lists, &list.trip_id) {
            Ok(applied) => applied,
            Err(err) => {
                locations.rollback(children_ticket);
                lists.rollback(list_ticket);
                return Err(err);
            }
        };
        debug!(children = children.len(), "list removed locally");

        if let Err(err) = self.lists.call(self.lists.remote().delete(&list_id)).await {
            lists.rollback(ranks_ticket);
            locations.rollback(children_ticket);
            lists.rollback(list_ticket);
            return Err(self.lists.fail(Operation::Delete, &list_id, err));
        }
        lists.commit(list_ticket);
        locations.commit(children_ticket);
        info!("list deleted");

        let children_deleted = delete_children(&self.locations, &children).await;
        let ranks = self
            .follow_up_ranks(&self.lists, ranks_ticket, batch, &list_id)
            .await;
        if let Err(source) = children_deleted {
            return Err(self.partial(EntityKind::List, &list_id, Operation::Delete, source));
        }
        ranks
    }

    // --- Locations ---

    /// Append a location to a list of the same trip.
    #[instrument(skip_all, fields(list = %new.list_id))]
    pub async fn add_location(&self, new: NewLocation) -> Result<Confirmed<Location>, SyncError> {
        let list_id = self.lists.mutator().resolve(&new.list_id);
        let list = self.confirmed_list(&list_id)?;
        if list.trip_id != new.trip_id {
            return Err(ValidationError::ListOutsideTrip {
                list: list_id.to_string(),
                trip: new.trip_id.to_string(),
            }
            .into());
        }

        self.locations.heal_ranks(&list_id).await;
        let order = self.locations.next_order_in(&list_id);
        let record = NewLocation { list_id, ..new }.into_location(order);
        let confirmed = self.locations.insert(record).await?;
        self.enforce_routing_limit(&list.id).await;
        Ok(confirmed)
    }

    /// Delete a location and close the gap in its list.
    #[instrument(skip_all, fields(location = %location_id))]
    pub async fn delete_location(&self, location_id: &LocationId) -> Result<(), SyncError> {
        let locations = self.locations.mutator();
        let id = locations.resolve(location_id);
        let location = self
            .locations
            .get(&id)
            .ok_or_else(|| SyncError::not_found(EntityKind::Location, &id))?;

        self.locations.discard_pending(&id);
        let (ticket, ()) = locations.begin("delete location", |draft| {
            draft
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| SyncError::not_found(EntityKind::Location, &id))
        })?;
        let (ranks_ticket, batch) = match renumber_locally(&self.locations, &location.list_id) {
            Ok(applied) => applied,
            Err(err) => {
                locations.rollback(ticket);
                return Err(err);
            }
        };

        if let Err(err) = self.locations.call(self.locations.remote().delete(&id)).await {
            locations.rollback(ranks_ticket);
            locations.rollback(ticket);
            return Err(self.locations.fail(Operation::Delete, &id, err));
        }
        locations.commit(ticket);
        info!("location deleted");

        self.follow_up_ranks(&self.locations, ranks_ticket, batch, &id)
            .await
    }

    /// Reassign a location to another list of its trip, appending it there.
    #[instrument(skip_all, fields(location = %location_id, target = %target_list))]
    pub async fn move_location(
        &self,
        location_id: &LocationId,
        target_list: &ListId,
    ) -> Result<(), SyncError> {
        let locations = self.locations.mutator();
        let id = locations.resolve(location_id);
        let location = self
            .locations
            .get(&id)
            .ok_or_else(|| SyncError::not_found(EntityKind::Location, &id))?;
        let target_id = self.lists.mutator().resolve(target_list);
        let target = self.confirmed_list(&target_id)?;
        if target.trip_id != location.trip_id {
            return Err(ValidationError::ListOutsideTrip {
                list: target_id.to_string(),
                trip: location.trip_id.to_string(),
            }
            .into());
        }
        if location.list_id == target_id {
            return Ok(());
        }

        self.locations.heal_ranks(&target_id).await;
        let patch = LocationPatch::default()
            .list_id(target_id.clone())
            .display_order(self.locations.next_order_in(&target_id));
        let (move_ticket, ()) = locations.begin("move location", |draft| {
            draft.patch(&id, patch.clone());
            Ok(())
        })?;
        let (ranks_ticket, batch) = match renumber_locally(&self.locations, &location.list_id) {
            Ok(applied) => applied,
            Err(err) => {
                locations.rollback(move_ticket);
                return Err(err);
            }
        };

        if let Err(err) = self.locations.call(self.locations.remote().update(&id, &patch)).await {
            locations.rollback(ranks_ticket);
            locations.rollback(move_ticket);
            return Err(self.locations.fail(Operation::Update, &id, err));
        }
        locations.commit(move_ticket);

        let ranks = self
            .follow_up_ranks(&self.locations, ranks_ticket, batch, &id)
            .await;
        self.enforce_routing_limit(&target_id).await;
        ranks
    }

    // --- Trips ---

    /// Delete a trip, its stored image, its lists and their locations.
    #[instrument(skip_all, fields(trip = %trip_id))]
    pub async fn delete_trip(&self, trip_id: &TripId) -> Result<(), SyncError> {
        let id = self.trips.mutator().resolve(trip_id);
        let trip = self
            .trips
            .get(&id)
            .ok_or_else(|| SyncError::not_found(EntityKind::Trip, &id))?;

        self.trips.discard_pending(&id);
        for list in self.lists.lists_for(&id) {
            self.lists.discard_pending(&list.id);
        }
        for location in self.locations.locations_for_trip(&id) {
            self.locations.discard_pending(&location.id);
        }

        let (trip_ticket, ()) = self.trips.mutator().begin("delete trip", |draft| {
            draft
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| SyncError::not_found(EntityKind::Trip, &id))
        })?;
        let (lists_ticket, lists) = self
            .lists
            .mutator()
            .begin("delete trip lists", |draft| {
                Ok(draft.remove_where(|l: &List| l.trip_id == id))
            })?;
        let (locations_ticket, locations) = self
            .locations
            .mutator()
            .begin("delete trip locations", |draft| {
                Ok(draft.remove_where(|l: &Location| l.trip_id == id))
            })?;

        let rollback_all = |trip_ticket, lists_ticket, locations_ticket| {
            self.locations.mutator().rollback(locations_ticket);
            self.lists.mutator().rollback(lists_ticket);
            self.trips.mutator().rollback(trip_ticket);
        };

        if let Some(path) = trip
            .image_url
            .as_deref()
            .and_then(|url| image_path(url, &self.trips.config().image_bucket))
        {
            if let Err(err) = self.trips.call(self.storage.remove(&path)).await {
                rollback_all(trip_ticket, lists_ticket, locations_ticket);
                return Err(self.trips.fail(Operation::RemoveImage, &id, err));
            }
        }

        if let Err(err) = self.trips.call(self.trips.remote().delete(&id)).await {
            rollback_all(trip_ticket, lists_ticket, locations_ticket);
            return Err(self.trips.fail(Operation::Delete, &id, err));
        }
        self.trips.mutator().commit(trip_ticket);
        self.lists.mutator().commit(lists_ticket);
        self.locations.mutator().commit(locations_ticket);
        info!("trip deleted");

        if let Err(source) = delete_children(&self.locations, &locations).await {
            return Err(self.partial(EntityKind::Trip, &id, Operation::Delete, source));
        }
        if let Err(source) = delete_children(&self.lists, &lists).await {
            return Err(self.partial(EntityKind::Trip, &id, Operation::Delete, source));
        }
        Ok(())
    }

    pub async fn update_trip_image(
        &self,
        trip_id: &TripId,
        file_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, SyncError> {
        self.trips
            .update_image(self.storage.as_ref(), trip_id, file_name, bytes, content_type)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::{fixtures, HexColor, LatLon, ListIcon, NewList, Trip, UserId};
    use crate::remote::{MemoryBlobStorage, MemoryTable, RemoteCall};
    use crate::report::FailureReporter;
    use std::time::Duration;
    use url::Url;

    struct Harness {
        coordinator: CascadeCoordinator,
        trips: TripStore,
        lists: ListStore,
        locations: LocationStore,
        trip_table: Arc<MemoryTable<Trip>>,
        list_table: Arc<MemoryTable<List>>,
        location_table: Arc<MemoryTable<Location>>,
        storage: Arc<MemoryBlobStorage>,
    }

    async fn harness(config: EngineConfig) -> Harness {
        let trip_table = Arc::new(MemoryTable::with_rows([fixtures::trip("t", "u")]));
        let list_table = Arc::new(MemoryTable::with_rows([
            fixtures::list("l1", "t", 0),
            fixtures::list("l2", "t", 1),
            fixtures::list("l3", "t", 2),
        ]));
        let location_table = Arc::new(MemoryTable::with_rows([
            fixtures::location("p1", "t", "l1", 0),
            fixtures::location("p2", "t", "l1", 1),
            fixtures::location("p3", "t", "l2", 0),
        ]));
        let storage = Arc::new(MemoryBlobStorage::new(
            Url::parse("https://cdn.test/public/TripImage/").unwrap(),
        ));
        let config = Arc::new(config);
        let reporter = FailureReporter::new(16);
        let trips: TripStore = EntityStore::new(trip_table.clone(), config.clone(), reporter.clone());
        let lists: ListStore = EntityStore::new(list_table.clone(), config.clone(), reporter.clone());
        let locations: LocationStore = EntityStore::new(location_table.clone(), config, reporter);

        let trip = TripId::new("t");
        trips.fetch_trips(&UserId::new("u")).await.unwrap();
        lists.fetch_for(&trip).await.unwrap();
        locations.fetch_for(&trip).await.unwrap();
        list_table.clear_calls();
        location_table.clear_calls();

        Harness {
            coordinator: CascadeCoordinator::new(
                trips.clone(),
                lists.clone(),
                locations.clone(),
                storage.clone(),
            ),
            trips,
            lists,
            locations,
            trip_table,
            list_table,
            location_table,
            storage,
        }
    }

    fn new_location(list: &str) -> NewLocation {
        NewLocation {
            trip_id: TripId::new("t"),
            list_id: ListId::new(list),
            name: "Cafe".into(),
            address: "1 Main St".into(),
            notes: String::new(),
            position: LatLon::new(41.0, 2.0).unwrap(),
        }
    }

    #[tokio::test]
    async fn delete_list_removes_children_and_renumbers_siblings() {
        let h = harness(EngineConfig::default()).await;
        h.coordinator.delete_list(&ListId::new("l1")).await.unwrap();

        let ranks: Vec<(String, u32)> = h
            .lists
            .lists_for(&TripId::new("t"))
            .into_iter()
            .map(|l| (l.id.to_string(), l.display_order))
            .collect();
        assert_eq!(ranks, [("l2".into(), 0), ("l3".into(), 1)]);
        assert_eq!(h.locations.count_in(&ListId::new("l1")), 0);
        assert_eq!(h.location_table.rows().len(), 1);
        assert_eq!(h.list_table.rows().len(), 2);
    }

    #[tokio::test]
    async fn failed_list_delete_restores_everything() {
        let h = harness(EngineConfig::default()).await;
        let lists_before = h.lists.snapshot();
        let locations_before = h.locations.snapshot();
        h.list_table.fail_next(Operation::Delete);

        let err = h.coordinator.delete_list(&ListId::new("l1")).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote { .. }));
        assert_eq!(h.lists.snapshot(), lists_before);
        assert_eq!(h.locations.snapshot(), locations_before);
    }

    #[tokio::test]
    async fn failed_renumber_after_delete_is_partial() {
        let h = harness(EngineConfig::default()).await;
        h.list_table.fail_next(Operation::Reorder);

        let err = h.coordinator.delete_list(&ListId::new("l1")).await.unwrap_err();
        assert!(matches!(err, SyncError::PartialCascade { .. }));

        // The delete stands; ranks match what the remote store still holds.
        assert!(h.lists.get(&ListId::new("l1")).is_none());
        let local: Vec<u32> = h
            .lists
            .lists_for(&TripId::new("t"))
            .iter()
            .map(|l| l.display_order)
            .collect();
        assert_eq!(local, [1, 2]);
    }

    #[tokio::test]
    async fn add_location_rejects_a_list_of_another_trip() {
        let h = harness(EngineConfig::default()).await;
        let mut new = new_location("l1");
        new.trip_id = TripId::new("other");

        let err = h.coordinator.add_location(new).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::ListOutsideTrip { .. })
        ));
        assert!(h.location_table.calls().is_empty());
    }

    #[tokio::test]
    async fn adding_past_the_routing_limit_turns_routing_off() {
        let config = EngineConfig {
            max_routing_locations: 2,
            ..EngineConfig::default()
        };
        let h = harness(config).await;
        h.coordinator
            .set_routing(&ListId::new("l1"), true)
            .await
            .unwrap();

        let added = h.coordinator.add_location(new_location("l1")).await.unwrap();
        assert_eq!(added.record.display_order, 2);
        assert!(!h.lists.get(&ListId::new("l1")).unwrap().routing);

        let err = h
            .coordinator
            .set_routing(&ListId::new("l1"), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::RoutingLimit { count: 3, max: 2 })
        ));
    }

    #[tokio::test]
    async fn move_location_appends_to_target_and_renumbers_source() {
        let h = harness(EngineConfig::default()).await;
        h.coordinator
            .move_location(&LocationId::new("p1"), &ListId::new("l2"))
            .await
            .unwrap();

        let moved = h.locations.get(&LocationId::new("p1")).unwrap();
        assert_eq!(moved.list_id, ListId::new("l2"));
        assert_eq!(moved.display_order, 1);
        assert_eq!(
            h.locations.get(&LocationId::new("p2")).unwrap().display_order,
            0
        );

        let calls = h.location_table.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], RemoteCall::Update(id, _) if id == &LocationId::new("p1")));
        assert!(matches!(&calls[1], RemoteCall::UpdateBatch(batch) if batch.len() == 1));
    }

    fn new_list(name: &str) -> NewList {
        NewList {
            trip_id: TripId::new("t"),
            name: name.into(),
            color: HexColor::default(),
            icon: ListIcon::Wine,
            routing: false,
        }
    }

    #[tokio::test]
    async fn list_rank_gaps_close_on_the_next_add() {
        let h = harness(EngineConfig::default()).await;
        h.list_table.fail_next(Operation::Reorder);
        let err = h.coordinator.delete_list(&ListId::new("l1")).await.unwrap_err();
        assert!(matches!(err, SyncError::PartialCascade { .. }));

        let confirmed = h.lists.add_list(new_list("Night")).await.unwrap();
        assert_eq!(confirmed.record.display_order, 2);

        let local: Vec<u32> = h
            .lists
            .lists_for(&TripId::new("t"))
            .iter()
            .map(|l| l.display_order)
            .collect();
        assert_eq!(local, [0, 1, 2]);
        assert_eq!(h.list_table.row(&ListId::new("l2")).unwrap().display_order, 0);
        assert_eq!(h.list_table.row(&ListId::new("l3")).unwrap().display_order, 1);
    }

    #[tokio::test]
    async fn location_rank_gaps_close_on_the_next_add() {
        let h = harness(EngineConfig::default()).await;
        h.location_table.fail_next(Operation::Reorder);
        let err = h
            .coordinator
            .delete_location(&LocationId::new("p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PartialCascade { .. }));
        assert_eq!(h.location_table.row(&LocationId::new("p2")).unwrap().display_order, 1);

        let added = h.coordinator.add_location(new_location("l1")).await.unwrap();
        assert_eq!(added.record.display_order, 1);
        assert_eq!(h.locations.get(&LocationId::new("p2")).unwrap().display_order, 0);
        assert_eq!(h.location_table.row(&LocationId::new("p2")).unwrap().display_order, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn locations_wait_for_their_list_to_be_confirmed() {
        let list_table = Arc::new(MemoryTable::<List>::new().with_id_assigner(|| ListId::new("srv")));
        list_table.set_latency(Operation::Insert, Duration::from_millis(100));
        let location_table = Arc::new(MemoryTable::<Location>::new());
        let config = Arc::new(EngineConfig::default());
        let reporter = FailureReporter::new(16);
        let trips: TripStore =
            EntityStore::new(Arc::new(MemoryTable::<Trip>::new()), config.clone(), reporter.clone());
        let lists: ListStore = EntityStore::new(list_table.clone(), config.clone(), reporter.clone());
        let locations: LocationStore = EntityStore::new(location_table.clone(), config, reporter);
        let storage = Arc::new(MemoryBlobStorage::new(
            Url::parse("https://cdn.test/public/TripImage/").unwrap(),
        ));
        let coordinator = CascadeCoordinator::new(trips, lists.clone(), locations.clone(), storage);

        let creating = tokio::spawn({
            let lists = lists.clone();
            async move { lists.add_list(new_list("Food")).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let local_id = lists.lists_for(&TripId::new("t"))[0].id.clone();
        assert!(lists.is_inserting(&local_id));
        let err = coordinator
            .add_location(new_location(&local_id.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::ListUnconfirmed(_))
        ));
        assert!(locations.all().is_empty());
        assert!(location_table.calls().is_empty());

        let confirmed = creating.await.unwrap().unwrap();
        assert_eq!(confirmed.record.id, ListId::new("srv"));
        assert_eq!(confirmed.replaced_id, Some(local_id.clone()));

        // The local id still works once the server row exists.
        let added = coordinator
            .add_location(new_location(&local_id.to_string()))
            .await
            .unwrap();
        assert_eq!(added.record.list_id, ListId::new("srv"));
        assert_eq!(
            location_table.row(&added.record.id).unwrap().list_id,
            ListId::new("srv")
        );
    }

    #[tokio::test]
    async fn delete_trip_removes_image_lists_and_locations() {
        let h = harness(EngineConfig::default()).await;
        let url = h
            .coordinator
            .update_trip_image(&TripId::new("t"), "a.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        assert!(url.contains("t/trip-image.png"));

        h.coordinator.delete_trip(&TripId::new("t")).await.unwrap();
        assert!(h.trips.all().is_empty());
        assert!(h.lists.all().is_empty());
        assert!(h.locations.all().is_empty());
        assert!(h.storage.paths().is_empty());
        assert!(h.trip_table.rows().is_empty());
        assert!(h.list_table.rows().is_empty());
        assert!(h.location_table.rows().is_empty());
    }

    #[tokio::test]
    async fn image_removal_failure_aborts_trip_delete() {
        let h = harness(EngineConfig::default()).await;
        h.coordinator
            .update_trip_image(&TripId::new("t"), "a.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        h.storage.fail_next(Operation::RemoveImage);

        let err = h.coordinator.delete_trip(&TripId::new("t")).await.unwrap_err();
        assert!(err.is_remote());
        assert_eq!(h.trips.all().len(), 1);
        assert_eq!(h.lists.all().len(), 3);
        assert_eq!(h.locations.all().len(), 3);
        assert!(h.trip_table.calls_of(Operation::Delete).is_empty());
    }
}
