#![allow(dead_code)]

use std::sync::Arc;
use trip_planner_core::{
    EngineConfig, HexColor, LatLon, List, ListIcon, ListId, Location, LocationId,
    MemoryBlobStorage, MemoryTable, RemoteBackend, Slug, Trip, TripId, TripPlanner, UnixTimeMs,
    UserId,
};
use url::Url;

pub const IMAGE_BASE: &str = "https://cdn.test/storage/v1/object/public/TripImage/";

pub struct Harness {
    pub planner: TripPlanner,
    pub trips: Arc<MemoryTable<Trip>>,
    pub lists: Arc<MemoryTable<List>>,
    pub locations: Arc<MemoryTable<Location>>,
    pub storage: Arc<MemoryBlobStorage>,
}

impl Harness {
    pub fn new(trips: Vec<Trip>, lists: Vec<List>, locations: Vec<Location>) -> Self {
        let trips = Arc::new(MemoryTable::with_rows(trips));
        let lists = Arc::new(MemoryTable::with_rows(lists));
        let locations = Arc::new(MemoryTable::with_rows(locations));
        let storage = Arc::new(MemoryBlobStorage::new(Url::parse(IMAGE_BASE).unwrap()));
        let backend = RemoteBackend {
            trips: trips.clone(),
            lists: lists.clone(),
            locations: locations.clone(),
            storage: storage.clone(),
        };
        let planner = TripPlanner::new(backend, EngineConfig::default()).unwrap();
        Self {
            planner,
            trips,
            lists,
            locations,
            storage,
        }
    }

    /// Load the user's trips and open `trip`.
    pub async fn open(&self, trip: &str) {
        self.planner.load_trips(&UserId::new("u")).await.unwrap();
        self.planner
            .open_trip(&format!("slug{trip}"))
            .await
            .unwrap();
        self.trips.clear_calls();
        self.lists.clear_calls();
        self.locations.clear_calls();
    }

    pub fn list_order(&self, trip: &str) -> Vec<(String, u32)> {
        self.planner
            .lists()
            .lists_for(&TripId::new(trip))
            .into_iter()
            .map(|l| (l.id.to_string(), l.display_order))
            .collect()
    }

    pub fn location_order(&self, list: &str) -> Vec<(String, u32)> {
        self.planner
            .locations()
            .locations_in(&ListId::new(list))
            .into_iter()
            .map(|l| (l.id.to_string(), l.display_order))
            .collect()
    }
}

pub fn trip(id: &str) -> Trip {
    Trip {
        id: TripId::new(id),
        user_id: UserId::new("u"),
        title: format!("Trip {id}"),
        notes: String::new(),
        slug: Slug::new(format!("slug{id}")).unwrap(),
        image_url: None,
        center: LatLon::new(41.39, 2.17).unwrap(),
        created_at: UnixTimeMs(1_700_000_000_000),
    }
}

pub fn list(id: &str, trip: &str, order: u32) -> List {
    List {
        id: ListId::new(id),
        trip_id: TripId::new(trip),
        name: format!("List {id}"),
        color: HexColor::default(),
        icon: ListIcon::default(),
        routing: false,
        display_order: order,
        created_at: UnixTimeMs(1_700_000_000_000),
    }
}

pub fn location(id: &str, trip: &str, list: &str, order: u32) -> Location {
    Location {
        id: LocationId::new(id),
        trip_id: TripId::new(trip),
        list_id: ListId::new(list),
        name: format!("Place {id}"),
        address: String::new(),
        notes: String::new(),
        position: LatLon::new(41.39, 2.17).unwrap(),
        display_order: order,
        created_at: UnixTimeMs(1_700_000_000_000),
    }
}
