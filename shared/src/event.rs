//! Commands a UI shell sends to the planner.

use bytes::Bytes;

use crate::model::{
    HexColor, LatLon, List, ListIcon, ListId, Location, LocationId, NewList, NewLocation, NewTrip,
    Slug, TripId, UserId,
};
use crate::store::Confirmed;

#[derive(Debug, Clone)]
pub enum Event {
    LoadTrips {
        user_id: UserId,
    },
    OpenTrip {
        slug: String,
    },

    CreateTrip(NewTrip),
    TripTitleEdited {
        trip_id: TripId,
        title: String,
    },
    TripNotesEdited {
        trip_id: TripId,
        notes: String,
    },
    TripCenterMoved {
        trip_id: TripId,
        center: LatLon,
    },
    TripImageChosen {
        trip_id: TripId,
        file_name: String,
        bytes: Bytes,
        content_type: String,
    },
    DeleteTrip {
        trip_id: TripId,
    },

    CreateList(NewList),
    ListRenamed {
        list_id: ListId,
        name: String,
    },
    ListColorPicked {
        list_id: ListId,
        color: HexColor,
    },
    ListIconPicked {
        list_id: ListId,
        icon: ListIcon,
    },
    ListRoutingToggled {
        list_id: ListId,
        enabled: bool,
    },
    DeleteList {
        list_id: ListId,
    },
    ListDragEnded {
        trip_id: TripId,
        list_id: ListId,
        from: usize,
        to: usize,
    },

    CreateLocation(NewLocation),
    LocationNotesEdited {
        location_id: LocationId,
        notes: String,
    },
    LocationMoved {
        location_id: LocationId,
        list_id: ListId,
    },
    DeleteLocation {
        location_id: LocationId,
    },
    LocationDragEnded {
        list_id: ListId,
        location_id: LocationId,
        from: usize,
        to: usize,
    },
}

impl Event {
    /// Short name used as a tracing field.
    pub fn name(&self) -> &'static str {
        match self {
            Event::LoadTrips { .. } => "load_trips",
            Event::OpenTrip { .. } => "open_trip",
            Event::CreateTrip(_) => "create_trip",
            Event::TripTitleEdited { .. } => "trip_title_edited",
            Event::TripNotesEdited { .. } => "trip_notes_edited",
            Event::TripCenterMoved { .. } => "trip_center_moved",
            Event::TripImageChosen { .. } => "trip_image_chosen",
            Event::DeleteTrip { .. } => "delete_trip",
            Event::CreateList(_) => "create_list",
            Event::ListRenamed { .. } => "list_renamed",
            Event::ListColorPicked { .. } => "list_color_picked",
            Event::ListIconPicked { .. } => "list_icon_picked",
            Event::ListRoutingToggled { .. } => "list_routing_toggled",
            Event::DeleteList { .. } => "delete_list",
            Event::ListDragEnded { .. } => "list_drag_ended",
            Event::CreateLocation(_) => "create_location",
            Event::LocationNotesEdited { .. } => "location_notes_edited",
            Event::LocationMoved { .. } => "location_moved",
            Event::DeleteLocation { .. } => "delete_location",
            Event::LocationDragEnded { .. } => "location_drag_ended",
        }
    }

    /// Edits that only reach the server after the debounce window.
    pub fn is_debounced(&self) -> bool {
        matches!(
            self,
            Event::TripTitleEdited { .. }
                | Event::TripNotesEdited { .. }
                | Event::ListRenamed { .. }
                | Event::LocationNotesEdited { .. }
        )
    }
}

/// What a dispatched event produced, beyond the state change itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    TripCreated(Slug),
    ListCreated(Confirmed<List>),
    LocationCreated(Confirmed<Location>),
    ImageUpdated(String),
}
