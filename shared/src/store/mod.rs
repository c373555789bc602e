//! Entity stores.
//!
//! `EntityStore<E>` owns one collection, the remote table it mirrors, and the
//! debounced writes pending against it. Operations shared by all entities
//! live here; entity-specific ones are in the submodules.

mod lists;
mod locations;
mod trips;

pub use trips::{cache_busted, image_path};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::debounce::{DebouncedWriter, WriteFuture};
use crate::error::{Operation, SyncError};
use crate::model::{Entity, FieldPatch, List, Location, Ranked, Trip};
use crate::mutator::{OptimisticMutator, Ticket};
use crate::ordering::{self, Ordered, OrderingError};
use crate::remote::{bounded, RemoteError, RemoteTable};
use crate::report::FailureReporter;
use crate::snapshot::EntitySnapshot;

pub type TripStore = EntityStore<Trip>;
pub type ListStore = EntityStore<List>;
pub type LocationStore = EntityStore<Location>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
}

/// Result of a confirmed insert.
#[derive(Clone, Debug, PartialEq)]
pub struct Confirmed<E: Entity> {
    pub record: E,
    /// Local id the server replaced, if it assigned its own.
    pub replaced_id: Option<E::Id>,
}

/// Coalesced edits waiting for the debounce timer.
struct PendingEdit<E: Entity> {
    patch: E::Patch,
    tickets: Vec<Ticket<E>>,
}

pub struct EntityStore<E: Entity> {
    mutator: OptimisticMutator<E>,
    remote: Arc<dyn RemoteTable<E>>,
    writer: DebouncedWriter<E::Id, PendingEdit<E>>,
    loads: Arc<Mutex<HashMap<E::Scope, LoadState>>>,
    config: Arc<EngineConfig>,
    reporter: FailureReporter,
}

impl<E: Entity> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            mutator: self.mutator.clone(),
            remote: Arc::clone(&self.remote),
            writer: self.writer.clone(),
            loads: Arc::clone(&self.loads),
            config: Arc::clone(&self.config),
            reporter: self.reporter.clone(),
        }
    }
}

impl<E: Entity> EntityStore<E> {
    pub fn new(
        remote: Arc<dyn RemoteTable<E>>,
        config: Arc<EngineConfig>,
        reporter: FailureReporter,
    ) -> Self {
        Self {
            mutator: OptimisticMutator::default(),
            remote,
            writer: DebouncedWriter::new(),
            loads: Arc::new(Mutex::new(HashMap::new())),
            config,
            reporter,
        }
    }

    // --- Reads ---

    pub fn get(&self, id: &E::Id) -> Option<E> {
        self.mutator.get(id)
    }

    pub fn all(&self) -> Vec<E> {
        self.mutator.read(|c| c.iter().cloned().collect())
    }

    pub fn snapshot(&self) -> EntitySnapshot<E> {
        self.mutator.snapshot()
    }

    pub fn count_for(&self, scope: &E::Scope) -> usize {
        self.mutator.read(|c| c.in_scope(scope).count())
    }

    pub fn load_state(&self, scope: &E::Scope) -> LoadState {
        self.loads().get(scope).copied().unwrap_or_default()
    }

    pub fn is_pending(&self, id: &E::Id) -> bool {
        self.mutator.is_pending(id)
    }

    /// True until the server has confirmed the insert of `id`.
    pub fn is_inserting(&self, id: &E::Id) -> bool {
        self.mutator.is_inserting(id)
    }

    pub fn has_pending_edit(&self, id: &E::Id) -> bool {
        self.writer.is_pending(&self.mutator.resolve(id))
    }

    pub(crate) fn mutator(&self) -> &OptimisticMutator<E> {
        &self.mutator
    }

    pub(crate) fn remote(&self) -> &dyn RemoteTable<E> {
        self.remote.as_ref()
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn reporter(&self) -> &FailureReporter {
        &self.reporter
    }

    fn loads(&self) -> MutexGuard<'_, HashMap<E::Scope, LoadState>> {
        self.loads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a remote call under the configured timeout.
    pub(crate) async fn call<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        bounded(self.config.remote_timeout(), call).await
    }

    pub(crate) fn fail(
        &self,
        operation: Operation,
        id: impl ToString,
        source: RemoteError,
    ) -> SyncError {
        self.reporter.remote_failure(E::KIND, operation, id, source)
    }

    fn not_found(id: &E::Id) -> SyncError {
        SyncError::not_found(E::KIND, id)
    }

    // --- Load ---

    /// Fetch one scope from the remote store. On failure the collection is
    /// left as it was.
    #[instrument(skip_all, fields(kind = %E::KIND, %scope))]
    pub async fn fetch_for(&self, scope: &E::Scope) -> Result<(), SyncError> {
        let previous = {
            let mut loads = self.loads();
            let previous = loads.get(scope).copied().unwrap_or_default();
            loads.insert(scope.clone(), LoadState::Loading);
            previous
        };

        match self.call(self.remote.select(scope)).await {
            Ok(records) => {
                let count = records.len();
                self.mutator.merge_fetched(scope, records);
                self.loads().insert(scope.clone(), LoadState::Loaded);
                info!(count, "fetched");
                Ok(())
            }
            Err(err) => {
                let restored = match previous {
                    LoadState::Loaded => LoadState::Loaded,
                    LoadState::Idle | LoadState::Loading => LoadState::Idle,
                };
                self.loads().insert(scope.clone(), restored);
                Err(self.fail(Operation::Fetch, scope, err))
            }
        }
    }

    // --- Create ---

    pub async fn insert(&self, record: E) -> Result<Confirmed<E>, SyncError> {
        self.insert_at(record, usize::MAX).await
    }

    /// Insert optimistically at `index` (clamped), then confirm remotely.
    #[instrument(skip_all, fields(kind = %E::KIND, id = %record.id()))]
    pub(crate) async fn insert_at(&self, record: E, index: usize) -> Result<Confirmed<E>, SyncError> {
        let local_id = record.id().clone();
        let (ticket, pending) = self.mutator.begin("insert", |draft| {
            draft.insert_at(index, record.clone());
            Ok(record)
        })?;

        match self.call(self.remote.insert(&pending)).await {
            Ok(canonical) => {
                let replaced = self.mutator.confirm_insert(ticket, &local_id, &canonical);
                let record = self
                    .get(canonical.id())
                    .unwrap_or(canonical);
                info!("insert confirmed");
                Ok(Confirmed {
                    record,
                    replaced_id: replaced.map(|(old, _)| old),
                })
            }
            Err(err) => {
                self.mutator.rollback(ticket);
                Err(self.fail(Operation::Insert, &local_id, err))
            }
        }
    }

    // --- Update ---

    /// Apply `patch` locally and write it remotely right away.
    #[instrument(skip_all, fields(kind = %E::KIND, %id))]
    pub async fn update_now(&self, id: &E::Id, patch: E::Patch) -> Result<(), SyncError> {
        let id = self.mutator.resolve(id);
        let (ticket, ()) = self.mutator.begin("update", |draft| {
            if draft.patch(&id, patch.clone()) {
                Ok(())
            } else {
                Err(Self::not_found(&id))
            }
        })?;

        match self.call(self.remote.update(&id, &patch)).await {
            Ok(()) => {
                self.mutator.commit(ticket);
                Ok(())
            }
            Err(err) => {
                self.mutator.rollback(ticket);
                Err(self.fail(Operation::Update, &id, err))
            }
        }
    }

    /// Write `patch` remotely first and only then apply it locally.
    pub(crate) async fn update_confirmed(&self, id: &E::Id, patch: E::Patch) -> Result<(), SyncError> {
        let id = self.mutator.resolve(id);
        self.call(self.remote.update(&id, &patch))
            .await
            .map_err(|err| self.fail(Operation::Update, &id, err))?;
        let (ticket, ()) = self.mutator.begin("confirmed update", |draft| {
            if draft.patch(&id, patch) {
                Ok(())
            } else {
                Err(Self::not_found(&id))
            }
        })?;
        self.mutator.commit(ticket);
        Ok(())
    }

    /// Apply `patch` locally now and coalesce the remote write with other
    /// edits to the same record arriving within the debounce window.
    ///
    /// Fails with [`SyncError::NoRuntime`] outside a Tokio runtime, before
    /// anything changes locally.
    pub fn update_debounced(&self, id: &E::Id, patch: E::Patch) -> Result<(), SyncError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SyncError::NoRuntime);
        }
        let id = self.mutator.resolve(id);
        let (ticket, ()) = self.mutator.begin("debounced update", |draft| {
            if draft.patch(&id, patch.clone()) {
                Ok(())
            } else {
                Err(Self::not_found(&id))
            }
        })?;

        let store = self.clone();
        let write_id = id.clone();
        self.writer.schedule_with(
            id,
            self.config.debounce(),
            move |pending| match pending {
                Some(mut edit) => {
                    edit.patch = edit.patch.merge(patch);
                    edit.tickets.push(ticket);
                    edit
                }
                None => PendingEdit {
                    patch,
                    tickets: vec![ticket],
                },
            },
            move |edit| -> WriteFuture { Box::pin(async move { store.persist_edit(write_id, edit).await }) },
        );
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %E::KIND, %id, edits = edit.tickets.len()))]
    async fn persist_edit(&self, id: E::Id, edit: PendingEdit<E>) {
        let id = self.mutator.resolve(&id);
        match self.call(self.remote.update(&id, &edit.patch)).await {
            Ok(()) => {
                for ticket in edit.tickets {
                    self.mutator.commit(ticket);
                }
                info!("debounced edit saved");
            }
            Err(err) => {
                for ticket in edit.tickets.into_iter().rev() {
                    self.mutator.rollback(ticket);
                }
                self.fail(Operation::Update, &id, err);
            }
        }
    }

    /// Drop the unsent edit for `id`, reverting it locally.
    pub fn discard_pending(&self, id: &E::Id) -> bool {
        let id = self.mutator.resolve(id);
        let Some(edit) = self.writer.cancel(&id) else {
            return false;
        };
        warn!(kind = %E::KIND, %id, patch = ?edit.patch, "discarding unsaved edit");
        for ticket in edit.tickets.into_iter().rev() {
            self.mutator.rollback(ticket);
        }
        true
    }

    pub fn discard_all_pending(&self) -> usize {
        let keys = self.writer.pending_keys();
        keys.iter().filter(|id| self.discard_pending(id)).count()
    }

    /// Send the pending edit for `id` now instead of waiting for the timer.
    pub async fn flush_pending(&self, id: &E::Id) -> bool {
        self.writer.flush(&self.mutator.resolve(id)).await
    }

    pub async fn flush_all_pending(&self) {
        self.writer.flush_all().await;
    }

    // --- Delete ---

    /// Remove a record without touching anything that refers to it.
    #[instrument(skip_all, fields(kind = %E::KIND, %id))]
    pub async fn remove(&self, id: &E::Id) -> Result<(), SyncError> {
        let id = self.mutator.resolve(id);
        self.discard_pending(&id);
        let (ticket, ()) = self.mutator.begin("delete", |draft| {
            draft.remove(&id).map(|_| ()).ok_or_else(|| Self::not_found(&id))
        })?;

        match self.call(self.remote.delete(&id)).await {
            Ok(()) => {
                self.mutator.commit(ticket);
                info!("deleted");
                Ok(())
            }
            Err(err) => {
                self.mutator.rollback(ticket);
                Err(self.fail(Operation::Delete, &id, err))
            }
        }
    }
}

impl<E: Ranked> EntityStore<E> {
    /// Children of `parent`, sorted by rank.
    pub fn siblings(&self, parent: &E::Parent) -> Vec<E> {
        let mut siblings: Vec<E> =
            self.mutator.read(|c| c.iter().filter(|r| r.parent() == parent).cloned().collect());
        ordering::sort_by_rank(&mut siblings);
        siblings
    }

    pub fn count_in(&self, parent: &E::Parent) -> usize {
        self.mutator
            .read(|c| c.iter().filter(|r| r.parent() == parent).count())
    }

    pub fn next_order_in(&self, parent: &E::Parent) -> u32 {
        self.mutator
            .read(|c| ordering::next_order(c.iter().filter(|r| r.parent() == parent)))
    }

    /// Move one child of `parent` from `from` to `to` and persist the
    /// renumbered group.
    #[instrument(skip_all, fields(kind = %E::KIND, %parent, %moved, from, to))]
    pub async fn reorder(
        &self,
        parent: &E::Parent,
        moved: &E::Id,
        from: usize,
        to: usize,
    ) -> Result<(), SyncError> {
        let moved = self.mutator.resolve(moved);
        self.rearrange(parent, |siblings| {
            ordering::reconcile(siblings, &moved, from, to)
        })
        .await
    }

    /// Persist a complete new order for the children of `parent`.
    #[instrument(skip_all, fields(kind = %E::KIND, %parent))]
    pub async fn reorder_to(&self, parent: &E::Parent, ordered_ids: &[E::Id]) -> Result<(), SyncError> {
        let ordered_ids: Vec<E::Id> = ordered_ids.iter().map(|id| self.mutator.resolve(id)).collect();
        self.rearrange(parent, |siblings| {
            ordering::apply_permutation(siblings, &ordered_ids)
        })
        .await
    }

    /// Close gaps in the ranks of `parent`'s children.
    pub async fn renumber(&self, parent: &E::Parent) -> Result<(), SyncError> {
        self.rearrange(parent, |siblings| Ok(ordering::renumber_after_removal(siblings)))
            .await
    }

    async fn rearrange(
        &self,
        parent: &E::Parent,
        arrange: impl FnOnce(Vec<E>) -> Result<Vec<E>, OrderingError>,
    ) -> Result<(), SyncError> {
        let (ticket, batch) = self.mutator.begin("reorder", |draft| {
            let arranged = arrange(draft.siblings(parent))?;
            Ok(draft.apply_ranks(&arranged))
        })?;
        self.write_ranks(ticket, parent, batch).await
    }

    /// Renumber `parent`'s children if an earlier renumber left gaps. A
    /// failure here is logged and left for the next mutation.
    pub(crate) async fn heal_ranks(&self, parent: &E::Parent) {
        let siblings = self.siblings(parent);
        if ordering::is_dense(siblings.iter().map(Ordered::display_order)) {
            return;
        }
        warn!(kind = %E::KIND, %parent, "closing rank gaps");
        if let Err(err) = self.renumber(parent).await {
            warn!(kind = %E::KIND, %parent, %err, "rank gaps remain");
        }
    }

    /// Send the rank patches of a renumbered group in one batch, rolling the
    /// whole group back on failure.
    pub(crate) async fn write_ranks(
        &self,
        ticket: Ticket<E>,
        parent: &E::Parent,
        batch: Vec<(E::Id, E::Patch)>,
    ) -> Result<(), SyncError> {
        if ticket.is_empty() {
            self.mutator.commit(ticket);
            return Ok(());
        }
        match self.call(self.remote.update_batch(&batch)).await {
            Ok(()) => {
                self.mutator.commit(ticket);
                info!(kind = %E::KIND, %parent, count = batch.len(), "ranks saved");
                Ok(())
            }
            Err(err) => {
                self.mutator.rollback(ticket);
                Err(self.fail(Operation::Reorder, parent, err))
            }
        }
    }
}
