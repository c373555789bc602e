use tracing::instrument;

use super::{Confirmed, EntityStore};
use crate::error::SyncError;
use crate::model::{HexColor, List, ListIcon, ListId, ListPatch, NewList, TripId, ValidationError};

impl EntityStore<List> {
    /// Lists of a trip in display order.
    pub fn lists_for(&self, trip: &TripId) -> Vec<List> {
        self.siblings(trip)
    }

    /// Append a list to its trip.
    #[instrument(skip_all, fields(trip = %new.trip_id))]
    pub async fn add_list(&self, new: NewList) -> Result<Confirmed<List>, SyncError> {
        if new.name.trim().is_empty() {
            return Err(ValidationError::Empty("list name").into());
        }
        self.heal_ranks(&new.trip_id).await;
        let order = self.next_order_in(&new.trip_id);
        self.insert(new.into_list(order)).await
    }

    pub fn rename(&self, id: &ListId, name: String) -> Result<(), SyncError> {
        self.update_debounced(id, ListPatch::default().name(name))
    }

    pub async fn set_color(&self, id: &ListId, color: HexColor) -> Result<(), SyncError> {
        self.update_now(id, ListPatch::default().color(color)).await
    }

    pub async fn set_icon(&self, id: &ListId, icon: ListIcon) -> Result<(), SyncError> {
        self.update_now(id, ListPatch::default().icon(icon)).await
    }

    pub(crate) async fn write_routing(&self, id: &ListId, routing: bool) -> Result<(), SyncError> {
        self.update_now(id, ListPatch::default().routing(routing)).await
    }
}
