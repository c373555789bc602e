//! Optimistic mutation ledger.
//!
//! Every change is applied to the in-memory collection at once and recorded
//! in a [`Ticket`]. The caller settles the ticket when the remote call
//! resolves: `commit` forgets the undo information, `rollback` restores it.
//!
//! Rollback is scoped per entity and per field. Each applied patch stamps the
//! fields it wrote with the ticket's sequence number; a rollback only restores
//! fields that still carry its own stamp, so an older failure never clobbers a
//! newer edit. Removed records are parked as tombstones until the removal
//! settles.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::model::{Entity, FetchMerge, FieldPatch, FieldSet, Ranked};
use crate::ordering;
use crate::snapshot::{Collection, EntitySnapshot};

type Stamps = [u64; FieldSet::MAX_FIELDS as usize];

#[derive(Debug)]
enum Change<E: Entity> {
    Inserted(E::Id),
    Patched {
        id: E::Id,
        inverse: E::Patch,
        prior: Vec<(u8, u64)>,
    },
    Removed(E::Id),
}

/// Undo record of one applied mutation. Must be passed to exactly one of
/// [`OptimisticMutator::commit`] or [`OptimisticMutator::rollback`].
#[must_use = "an unsettled ticket keeps its undo state alive"]
#[derive(Debug)]
pub struct Ticket<E: Entity> {
    seq: u64,
    label: &'static str,
    changes: Vec<Change<E>>,
}

impl<E: Entity> Ticket<E> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Tombstone<E> {
    record: E,
    index: usize,
}

#[derive(Debug)]
struct Ledger<E: Entity> {
    records: Collection<E>,
    seq: u64,
    stamps: HashMap<E::Id, Stamps>,
    tombstones: HashMap<E::Id, Tombstone<E>>,
    /// Open tickets per entity; stamps are dropped when it reaches zero.
    open: HashMap<E::Id, usize>,
    /// Local id -> canonical id, for tickets opened before a rekey.
    aliases: HashMap<E::Id, E::Id>,
    /// Inserts the server has not confirmed yet.
    inserting: HashSet<E::Id>,
    /// Undo values inherited from rolled-back tickets, keyed by
    /// (entity, field, seq of the rolled-back ticket). The ticket that wrote
    /// the field next restores this value instead of its own inverse.
    rebased: HashMap<(E::Id, u8, u64), (E::Patch, u64)>,
}

impl<E: Entity> Ledger<E> {
    fn new(records: Collection<E>) -> Self {
        Self {
            records,
            seq: 0,
            stamps: HashMap::new(),
            tombstones: HashMap::new(),
            open: HashMap::new(),
            aliases: HashMap::new(),
            inserting: HashSet::new(),
            rebased: HashMap::new(),
        }
    }

    fn resolve(&self, id: &E::Id) -> E::Id {
        let mut current = id;
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.clone()
    }

    fn hold(&mut self, id: &E::Id) {
        *self.open.entry(id.clone()).or_default() += 1;
    }

    fn release(&mut self, id: &E::Id) {
        if let Some(count) = self.open.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.open.remove(id);
                self.stamps.remove(id);
                self.rebased.retain(|(entity, _, _), _| entity != id);
            }
        }
    }

    fn is_pending(&self, id: &E::Id) -> bool {
        self.open.contains_key(id)
    }

    fn settle(&mut self, change: Change<E>) {
        match change {
            Change::Inserted(id) => {
                let id = self.resolve(&id);
                self.inserting.remove(&id);
                self.release(&id);
            }
            Change::Patched { id, prior, .. } => {
                let id = self.resolve(&id);
                // The older value is superseded by what the server now holds.
                for (field, prior_seq) in prior {
                    self.rebased.remove(&(id.clone(), field, prior_seq));
                }
                self.release(&id);
            }
            Change::Removed(id) => {
                let id = self.resolve(&id);
                self.tombstones.remove(&id);
                self.release(&id);
            }
        }
    }

    fn revert(&mut self, seq: u64, change: Change<E>) {
        match change {
            Change::Inserted(id) => {
                let id = self.resolve(&id);
                self.inserting.remove(&id);
                self.records.remove(&id);
                self.tombstones.remove(&id);
                self.release(&id);
            }
            Change::Patched { id, inverse, prior } => {
                let id = self.resolve(&id);
                let mut restore = E::Patch::default();
                let mut kept = false;
                if let Some(stamps) = self.stamps.get_mut(&id) {
                    for (field, prior_seq) in prior {
                        let (value, base) = self
                            .rebased
                            .remove(&(id.clone(), field, prior_seq))
                            .unwrap_or_else(|| {
                                (inverse.restrict(FieldSet::EMPTY.with(field)), prior_seq)
                            });
                        let slot = &mut stamps[field as usize];
                        if *slot == seq {
                            *slot = base;
                            restore = restore.merge(value);
                        } else {
                            kept = true;
                            self.rebased.insert((id.clone(), field, seq), (value, base));
                        }
                    }
                }

                if kept {
                    debug!(kind = %E::KIND, %id, seq, "newer edit kept during rollback");
                }
                if !restore.is_empty() {
                    if let Some(record) = self.records.get_mut(&id) {
                        restore.apply_to(record);
                    } else if let Some(tombstone) = self.tombstones.get_mut(&id) {
                        restore.apply_to(&mut tombstone.record);
                    }
                }
                self.release(&id);
            }
            Change::Removed(id) => {
                let id = self.resolve(&id);
                if let Some(tombstone) = self.tombstones.remove(&id) {
                    if !self.records.contains(&id) {
                        self.records.insert_at(tombstone.index, tombstone.record);
                    }
                }
                self.release(&id);
            }
        }
    }

    fn rekey(&mut self, old: &E::Id, new: &E::Id) {
        if let Some(stamps) = self.stamps.remove(old) {
            self.stamps.insert(new.clone(), stamps);
        }
        if let Some(count) = self.open.remove(old) {
            self.open.insert(new.clone(), count);
        }
        if self.inserting.remove(old) {
            self.inserting.insert(new.clone());
        }
        if let Some(mut tombstone) = self.tombstones.remove(old) {
            tombstone.record.set_id(new.clone());
            self.tombstones.insert(new.clone(), tombstone);
        }
        let moved: Vec<_> = self
            .rebased
            .keys()
            .filter(|(entity, _, _)| entity == old)
            .cloned()
            .collect();
        for key in moved {
            if let Some(entry) = self.rebased.remove(&key) {
                self.rebased.insert((new.clone(), key.1, key.2), entry);
            }
        }
        self.aliases.insert(old.clone(), new.clone());
    }
}

/// Mutable view handed to the planning closure of [`OptimisticMutator::begin`].
pub struct Draft<'a, E: Entity> {
    ledger: &'a mut Ledger<E>,
    seq: u64,
    changes: Vec<Change<E>>,
}

impl<'a, E: Entity> Draft<'a, E> {
    pub fn records(&self) -> &Collection<E> {
        &self.ledger.records
    }

    pub fn get(&self, id: &E::Id) -> Option<&E> {
        self.ledger.records.get(id)
    }

    pub fn insert(&mut self, record: E) {
        self.insert_at(usize::MAX, record);
    }

    /// Insert at `index`, clamped to the collection length.
    pub fn insert_at(&mut self, index: usize, record: E) {
        let id = record.id().clone();
        self.ledger.records.insert_at(index, record);
        self.ledger.hold(&id);
        self.ledger.inserting.insert(id.clone());
        self.changes.push(Change::Inserted(id));
    }

    /// Apply `patch` to the record. Returns false if the record is absent.
    pub fn patch(&mut self, id: &E::Id, patch: E::Patch) -> bool {
        let Some(record) = self.ledger.records.get_mut(id) else {
            return false;
        };
        let fields = patch.fields();
        if fields.is_empty() {
            return true;
        }

        let inverse = patch.capture(record);
        patch.apply_to(record);

        let seq = self.seq;
        let stamps = self
            .ledger
            .stamps
            .entry(id.clone())
            .or_insert([0; FieldSet::MAX_FIELDS as usize]);
        let prior = fields
            .iter()
            .map(|field| {
                let slot = &mut stamps[field as usize];
                let before = *slot;
                *slot = seq;
                (field, before)
            })
            .collect();

        self.ledger.hold(id);
        self.changes.push(Change::Patched {
            id: id.clone(),
            inverse,
            prior,
        });
        true
    }

    pub fn remove(&mut self, id: &E::Id) -> Option<E> {
        let (index, record) = self.ledger.records.remove(id)?;
        self.ledger.tombstones.insert(
            id.clone(),
            Tombstone {
                record: record.clone(),
                index,
            },
        );
        self.ledger.hold(id);
        self.changes.push(Change::Removed(id.clone()));
        Some(record)
    }

    /// Remove every record matching `predicate`, returning them in collection order.
    pub fn remove_where(&mut self, predicate: impl Fn(&E) -> bool) -> Vec<E> {
        let ids: Vec<E::Id> = self
            .ledger
            .records
            .iter()
            .filter(|r| predicate(r))
            .map(|r| r.id().clone())
            .collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }
}

impl<'a, E: Ranked> Draft<'a, E> {
    /// Siblings under `parent`, sorted by rank.
    pub fn siblings(&self, parent: &E::Parent) -> Vec<E> {
        let mut siblings: Vec<E> = self
            .ledger
            .records
            .iter()
            .filter(|r| r.parent() == parent)
            .cloned()
            .collect();
        ordering::sort_by_rank(&mut siblings);
        siblings
    }

    /// Write the ranks of `arranged` back as patches. Returns a rank-only
    /// patch for every arranged record still present, so a batch write never
    /// carries other unconfirmed fields.
    pub fn apply_ranks(&mut self, arranged: &[E]) -> Vec<(E::Id, E::Patch)> {
        let mut ranks = Vec::with_capacity(arranged.len());
        for item in arranged {
            let id = item.id();
            let Some(current) = self.ledger.records.get(id).map(ordering::Ordered::display_order)
            else {
                continue;
            };
            let order = item.display_order();
            if current != order {
                self.patch(id, E::order_patch(order));
            }
            ranks.push((id.clone(), E::order_patch(order)));
        }
        ranks
    }
}

/// Shared handle to one entity collection and its undo ledger.
pub struct OptimisticMutator<E: Entity> {
    ledger: Arc<RwLock<Ledger<E>>>,
}

impl<E: Entity> Clone for OptimisticMutator<E> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<E: Entity> Default for OptimisticMutator<E> {
    fn default() -> Self {
        Self::new(Collection::default())
    }
}

impl<E: Entity> OptimisticMutator<E> {
    pub fn new(records: Collection<E>) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(Ledger::new(records))),
        }
    }

    fn read_ledger(&self) -> RwLockReadGuard<'_, Ledger<E>> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_ledger(&self) -> RwLockWriteGuard<'_, Ledger<E>> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<R>(&self, f: impl FnOnce(&Collection<E>) -> R) -> R {
        f(&self.read_ledger().records)
    }

    pub fn snapshot(&self) -> EntitySnapshot<E> {
        self.read_ledger().records.snapshot()
    }

    pub fn get(&self, id: &E::Id) -> Option<E> {
        let ledger = self.read_ledger();
        let id = ledger.resolve(id);
        ledger.records.get(&id).cloned()
    }

    /// Follow canonical id replacements made by confirmed inserts.
    pub fn resolve(&self, id: &E::Id) -> E::Id {
        self.read_ledger().resolve(id)
    }

    pub fn is_pending(&self, id: &E::Id) -> bool {
        let ledger = self.read_ledger();
        ledger.is_pending(&ledger.resolve(id))
    }

    /// True while the insert of `id` waits for the server.
    pub fn is_inserting(&self, id: &E::Id) -> bool {
        let ledger = self.read_ledger();
        ledger.inserting.contains(&ledger.resolve(id))
    }

    /// Apply a mutation planned by `plan`. If `plan` fails, whatever it
    /// already applied is reverted before the error is returned.
    pub fn begin<R>(
        &self,
        label: &'static str,
        plan: impl FnOnce(&mut Draft<'_, E>) -> Result<R, SyncError>,
    ) -> Result<(Ticket<E>, R), SyncError> {
        let mut guard = self.write_ledger();
        let ledger = &mut *guard;
        ledger.seq += 1;
        let seq = ledger.seq;

        let mut draft = Draft {
            ledger,
            seq,
            changes: Vec::new(),
        };
        let outcome = plan(&mut draft);
        let Draft {
            ledger, changes, ..
        } = draft;

        match outcome {
            Ok(value) => {
                debug!(kind = %E::KIND, seq, label, changes = changes.len(), "applied locally");
                Ok((
                    Ticket {
                        seq,
                        label,
                        changes,
                    },
                    value,
                ))
            }
            Err(err) => {
                for change in changes.into_iter().rev() {
                    ledger.revert(seq, change);
                }
                Err(err)
            }
        }
    }

    pub fn commit(&self, ticket: Ticket<E>) {
        let mut ledger = self.write_ledger();
        for change in ticket.changes {
            ledger.settle(change);
        }
        debug!(kind = %E::KIND, seq = ticket.seq, label = ticket.label, "committed");
    }

    pub fn rollback(&self, ticket: Ticket<E>) {
        let mut ledger = self.write_ledger();
        for change in ticket.changes.into_iter().rev() {
            ledger.revert(ticket.seq, change);
        }
        debug!(kind = %E::KIND, seq = ticket.seq, label = ticket.label, "rolled back");
    }

    /// Commit an insert and adopt the server-authoritative fields of the
    /// canonical row. Returns the id pair when the server replaced the id.
    pub fn confirm_insert(
        &self,
        ticket: Ticket<E>,
        local_id: &E::Id,
        canonical: &E,
    ) -> Option<(E::Id, E::Id)> {
        let rekey = {
            let mut ledger = self.write_ledger();
            let current = ledger.resolve(local_id);
            let new_id = canonical.id().clone();

            if let Some(record) = ledger.records.get_mut(&current) {
                record.adopt_canonical(canonical);
            } else if let Some(tombstone) = ledger.tombstones.get_mut(&current) {
                tombstone.record.adopt_canonical(canonical);
            } else {
                warn!(kind = %E::KIND, id = %current, "confirmed record no longer present locally");
            }

            if new_id != current {
                ledger.rekey(&current, &new_id);
                Some((current, new_id))
            } else {
                None
            }
        };

        self.commit(ticket);
        if let Some((old, new)) = &rekey {
            info!(kind = %E::KIND, %old, %new, "adopted canonical id");
        }
        rekey
    }

    /// Fold a fetched result set into the collection. Records with open
    /// tickets keep their local copy; pending removals stay removed.
    pub fn merge_fetched(&self, scope: &E::Scope, fetched: Vec<E>) {
        let mut ledger = self.write_ledger();
        let fetched_ids: HashSet<E::Id> = fetched.iter().map(|r| r.id().clone()).collect();

        let mut merged = Vec::with_capacity(fetched.len());
        for record in fetched {
            let id = record.id();
            if ledger.tombstones.contains_key(id) {
                continue;
            }
            if ledger.is_pending(id) {
                if let Some(local) = ledger.records.get(id) {
                    merged.push(local.clone());
                    continue;
                }
            }
            merged.push(record);
        }

        let in_merge_scope = |r: &E| match E::FETCH_MERGE {
            FetchMerge::Replace => true,
            FetchMerge::ByScope => r.scope() == scope,
        };
        let in_flight: Vec<E> = ledger
            .records
            .iter()
            .filter(|r| in_merge_scope(r))
            .filter(|r| ledger.is_pending(r.id()) && !fetched_ids.contains(r.id()))
            .cloned()
            .collect();

        ledger.records.retain(|r| !in_merge_scope(r));
        for record in merged.into_iter().chain(in_flight) {
            ledger.records.push(record);
        }
    }

    /// Reorder the whole collection in place. Used for presentation order,
    /// not sibling rank.
    pub fn sort_by(&self, compare: impl Fn(&E, &E) -> std::cmp::Ordering) {
        let mut ledger = self.write_ledger();
        let mut records: Vec<E> = ledger.records.iter().cloned().collect();
        records.sort_by(|a, b| compare(a, b));
        ledger.records = records.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;
    use crate::model::{List, ListId, ListPatch, Location, LocationId, LocationPatch, TripId};

    fn mutator(records: Vec<List>) -> OptimisticMutator<List> {
        OptimisticMutator::new(records.into_iter().collect())
    }

    fn names(m: &OptimisticMutator<List>) -> Vec<String> {
        m.read(|c| c.iter().map(|l| l.name.clone()).collect())
    }

    #[test]
    fn rollback_restores_deep_equal_collection() {
        let m = mutator(vec![
            fixtures::list("a", "t", 0),
            fixtures::list("b", "t", 1),
            fixtures::list("c", "t", 2),
        ]);
        let before = m.snapshot();

        let (ticket, _) = m
            .begin("mixed", |draft| {
                draft.remove(&ListId::new("b"));
                draft.patch(&ListId::new("c"), ListPatch::default().display_order(1));
                draft.insert(fixtures::list("d", "t", 2));
                Ok(())
            })
            .unwrap();
        assert_ne!(m.snapshot(), before);

        m.rollback(ticket);
        assert_eq!(m.snapshot(), before);
        assert!(!m.is_pending(&ListId::new("b")));
    }

    #[test]
    fn commit_keeps_the_applied_state() {
        let m = mutator(vec![fixtures::list("a", "t", 0)]);
        let (ticket, _) = m
            .begin("rename", |draft| {
                draft.patch(&ListId::new("a"), ListPatch::default().name("Food".into()));
                Ok(())
            })
            .unwrap();
        assert!(m.is_pending(&ListId::new("a")));
        m.commit(ticket);
        assert_eq!(names(&m), ["Food"]);
        assert!(!m.is_pending(&ListId::new("a")));
    }

    #[test]
    fn failed_plan_reverts_partial_changes() {
        let m = mutator(vec![fixtures::list("a", "t", 0)]);
        let before = m.snapshot();
        let result = m.begin("bad", |draft| -> Result<(), SyncError> {
            draft.patch(&ListId::new("a"), ListPatch::default().name("x".into()));
            Err(SyncError::not_found(List::KIND, "zzz"))
        });
        assert!(result.is_err());
        assert_eq!(m.snapshot(), before);
    }

    #[test]
    fn older_rollback_does_not_clobber_newer_field() {
        let m = mutator(vec![fixtures::list("a", "t", 0)]);
        let id = ListId::new("a");

        let (first, _) = m
            .begin("first", |d| {
                d.patch(&id, ListPatch::default().name("one".into()).routing(true));
                Ok(())
            })
            .unwrap();
        let (second, _) = m
            .begin("second", |d| {
                d.patch(&id, ListPatch::default().name("two".into()));
                Ok(())
            })
            .unwrap();

        m.rollback(first);
        let list = m.get(&id).unwrap();
        assert_eq!(list.name, "two", "newer name survives");
        assert!(!list.routing, "field only the first ticket wrote is restored");

        m.rollback(second);
        assert_eq!(m.get(&id).unwrap().name, "List a");
    }

    #[test]
    fn rollback_of_newer_then_older_restores_original() {
        let m = mutator(vec![fixtures::list("a", "t", 0)]);
        let id = ListId::new("a");
        let (first, _) = m
            .begin("first", |d| {
                d.patch(&id, ListPatch::default().name("one".into()));
                Ok(())
            })
            .unwrap();
        let (second, _) = m
            .begin("second", |d| {
                d.patch(&id, ListPatch::default().name("two".into()));
                Ok(())
            })
            .unwrap();

        m.rollback(second);
        assert_eq!(m.get(&id).unwrap().name, "one");
        m.rollback(first);
        assert_eq!(m.get(&id).unwrap().name, "List a");
    }

    #[test]
    fn patch_rollback_reaches_a_pending_tombstone() {
        let m = mutator(vec![fixtures::list("a", "t", 0), fixtures::list("b", "t", 1)]);
        let id = ListId::new("a");

        let (edit, _) = m
            .begin("edit", |d| {
                d.patch(&id, ListPatch::default().name("edited".into()));
                Ok(())
            })
            .unwrap();
        let (delete, _) = m
            .begin("delete", |d| {
                d.remove(&id);
                Ok(())
            })
            .unwrap();

        m.rollback(edit);
        m.rollback(delete);

        let restored = m.get(&id).unwrap();
        assert_eq!(restored.name, "List a");
        assert_eq!(m.read(|c| c.position(&id)), Some(0));
    }

    #[test]
    fn confirm_insert_adopts_canonical_id_and_follows_aliases() {
        let m: OptimisticMutator<Location> = OptimisticMutator::default();
        let local = fixtures::location("local", "t", "l", 0);
        let local_id = local.id.clone();

        let (insert, _) = m
            .begin("insert", |d| {
                d.insert(local.clone());
                Ok(())
            })
            .unwrap();
        let (edit, _) = m
            .begin("notes", |d| {
                d.patch(&local_id, LocationPatch::default().notes("hi".into()));
                Ok(())
            })
            .unwrap();

        assert!(m.is_inserting(&local_id));

        let mut canonical = local.clone();
        canonical.id = LocationId::new("server");
        canonical.notes = String::new();
        let rekey = m.confirm_insert(insert, &local_id, &canonical);
        assert_eq!(rekey, Some((local_id.clone(), LocationId::new("server"))));
        assert!(!m.is_inserting(&local_id));
        assert!(!m.is_inserting(&LocationId::new("server")));

        let stored = m.get(&LocationId::new("server")).unwrap();
        assert_eq!(stored.notes, "hi", "confirmation never erases a newer edit");
        assert_eq!(m.resolve(&local_id), LocationId::new("server"));

        m.rollback(edit);
        assert_eq!(m.get(&local_id).unwrap().notes, "");
    }

    #[test]
    fn merge_keeps_pending_local_copies_and_skips_pending_removals() {
        let m = mutator(vec![fixtures::list("a", "t1", 0), fixtures::list("b", "t1", 1)]);
        let (edit, _) = m
            .begin("rename", |d| {
                d.patch(&ListId::new("a"), ListPatch::default().name("local".into()));
                d.remove(&ListId::new("b"));
                d.insert(fixtures::list("new", "t1", 2));
                Ok(())
            })
            .unwrap();

        m.merge_fetched(
            &TripId::new("t1"),
            vec![fixtures::list("a", "t1", 0), fixtures::list("b", "t1", 1)],
        );

        assert_eq!(names(&m), ["local", "List new"]);
        m.commit(edit);
    }

    #[test]
    fn merge_by_scope_leaves_other_trips_alone() {
        let m = mutator(vec![fixtures::list("a", "t1", 0), fixtures::list("x", "t2", 0)]);
        m.merge_fetched(&TripId::new("t1"), vec![fixtures::list("b", "t1", 0)]);
        let mut ids: Vec<String> = m.read(|c| c.iter().map(|l| l.id.to_string()).collect());
        ids.sort();
        assert_eq!(ids, ["b", "x"]);
    }

    #[test]
    fn apply_ranks_patches_changed_records_and_returns_rank_patches() {
        let m = mutator(vec![
            fixtures::list("a", "t", 0),
            fixtures::list("b", "t", 1),
            fixtures::list("c", "t", 2),
        ]);
        let (ticket, ranks) = m
            .begin("reorder", |d| {
                let siblings = d.siblings(&TripId::new("t"));
                let arranged = ordering::reconcile(siblings, &ListId::new("b"), 1, 0)?;
                Ok(d.apply_ranks(&arranged))
            })
            .unwrap();

        assert_eq!(
            ranks,
            vec![
                (ListId::new("b"), ListPatch::default().display_order(0)),
                (ListId::new("a"), ListPatch::default().display_order(1)),
                (ListId::new("c"), ListPatch::default().display_order(2)),
            ]
        );
        // c kept its rank, so only a and b were patched locally.
        assert_eq!(ticket.changes.len(), 2);
        m.commit(ticket);
    }
}
