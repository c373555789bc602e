use super::EntityStore;
use crate::error::SyncError;
use crate::model::{ListId, Location, LocationId, LocationPatch, TripId};

impl EntityStore<Location> {
    /// Locations of a list in display order.
    pub fn locations_in(&self, list: &ListId) -> Vec<Location> {
        self.siblings(list)
    }

    pub fn locations_for_trip(&self, trip: &TripId) -> Vec<Location> {
        self.mutator()
            .read(|c| c.in_scope(trip).cloned().collect())
    }

    pub fn update_notes(&self, id: &LocationId, notes: String) -> Result<(), SyncError> {
        self.update_debounced(id, LocationPatch::default().notes(notes))
    }
}
