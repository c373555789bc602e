//! The planner object a shell constructs once and hands to its views.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use url::Url;

use crate::cascade::CascadeCoordinator;
use crate::config::{ConfigError, EngineConfig};
use crate::error::SyncError;
use crate::event::{Event, Outcome};
use crate::model::{EntityKind, List, Location, Trip, UserId};
use crate::remote::{BlobStorage, MemoryBlobStorage, MemoryTable, RemoteTable};
use crate::report::{FailureReporter, SyncFailure};
use crate::store::{ListStore, LocationStore, TripStore};

/// Remote tables and object storage the planner writes through to.
#[derive(Clone)]
pub struct RemoteBackend {
    pub trips: Arc<dyn RemoteTable<Trip>>,
    pub lists: Arc<dyn RemoteTable<List>>,
    pub locations: Arc<dyn RemoteTable<Location>>,
    pub storage: Arc<dyn BlobStorage>,
}

impl RemoteBackend {
    /// Backend held entirely in memory, for shells running without a server.
    pub fn in_memory(public_base: Url) -> Self {
        Self {
            trips: Arc::new(MemoryTable::<Trip>::new()),
            lists: Arc::new(MemoryTable::<List>::new()),
            locations: Arc::new(MemoryTable::<Location>::new()),
            storage: Arc::new(MemoryBlobStorage::new(public_base)),
        }
    }
}

#[derive(Clone)]
pub struct TripPlanner {
    trips: TripStore,
    lists: ListStore,
    locations: LocationStore,
    cascade: CascadeCoordinator,
    reporter: FailureReporter,
    config: Arc<EngineConfig>,
}

impl TripPlanner {
    pub fn new(backend: RemoteBackend, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let reporter = FailureReporter::new(config.failure_channel_capacity);

        let trips = TripStore::new(backend.trips, Arc::clone(&config), reporter.clone());
        let lists = ListStore::new(backend.lists, Arc::clone(&config), reporter.clone());
        let locations = LocationStore::new(backend.locations, Arc::clone(&config), reporter.clone());
        let cascade = CascadeCoordinator::new(
            trips.clone(),
            lists.clone(),
            locations.clone(),
            backend.storage,
        );

        info!(debounce_ms = config.debounce_ms, "trip planner ready");
        Ok(Self {
            trips,
            lists,
            locations,
            cascade,
            reporter,
            config,
        })
    }

    pub fn trips(&self) -> &TripStore {
        &self.trips
    }

    pub fn lists(&self) -> &ListStore {
        &self.lists
    }

    pub fn locations(&self) -> &LocationStore {
        &self.locations
    }

    pub fn cascade(&self) -> &CascadeCoordinator {
        &self.cascade
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Every remote failure, after its local rollback has been applied.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<SyncFailure> {
        self.reporter.subscribe()
    }

    pub async fn load_trips(&self, user: &UserId) -> Result<(), SyncError> {
        self.trips.fetch_trips(user).await
    }

    /// Load the lists and locations of an already loaded trip.
    #[instrument(skip_all, fields(%slug))]
    pub async fn open_trip(&self, slug: &str) -> Result<Trip, SyncError> {
        let trip = self
            .trips
            .by_slug(slug)
            .ok_or_else(|| SyncError::not_found(EntityKind::Trip, slug))?;
        let (lists, locations) = tokio::join!(
            self.lists.fetch_for(&trip.id),
            self.locations.fetch_for(&trip.id)
        );
        lists?;
        locations?;
        Ok(trip)
    }

    #[instrument(skip_all, fields(event = event.name()))]
    pub async fn dispatch(&self, event: Event) -> Result<Outcome, SyncError> {
        match event {
            Event::LoadTrips { user_id } => self.load_trips(&user_id).await?,
            Event::OpenTrip { slug } => {
                self.open_trip(&slug).await?;
            }

            Event::CreateTrip(new) => {
                return Ok(Outcome::TripCreated(self.trips.add_trip(new).await?));
            }
            Event::TripTitleEdited { trip_id, title } => self.trips.update_title(&trip_id, title)?,
            Event::TripNotesEdited { trip_id, notes } => self.trips.update_notes(&trip_id, notes)?,
            Event::TripCenterMoved { trip_id, center } => {
                self.trips.update_center(&trip_id, center).await?
            }
            Event::TripImageChosen {
                trip_id,
                file_name,
                bytes,
                content_type,
            } => {
                let url = self
                    .cascade
                    .update_trip_image(&trip_id, &file_name, bytes, &content_type)
                    .await?;
                return Ok(Outcome::ImageUpdated(url));
            }
            Event::DeleteTrip { trip_id } => self.cascade.delete_trip(&trip_id).await?,

            Event::CreateList(new) => {
                return Ok(Outcome::ListCreated(self.lists.add_list(new).await?));
            }
            Event::ListRenamed { list_id, name } => self.lists.rename(&list_id, name)?,
            Event::ListColorPicked { list_id, color } => {
                self.lists.set_color(&list_id, color).await?
            }
            Event::ListIconPicked { list_id, icon } => self.lists.set_icon(&list_id, icon).await?,
            Event::ListRoutingToggled { list_id, enabled } => {
                self.cascade.set_routing(&list_id, enabled).await?
            }
            Event::DeleteList { list_id } => self.cascade.delete_list(&list_id).await?,
            Event::ListDragEnded {
                trip_id,
                list_id,
                from,
                to,
            } => self.lists.reorder(&trip_id, &list_id, from, to).await?,

            Event::CreateLocation(new) => {
                return Ok(Outcome::LocationCreated(self.cascade.add_location(new).await?));
            }
            Event::LocationNotesEdited { location_id, notes } => {
                self.locations.update_notes(&location_id, notes)?
            }
            Event::LocationMoved {
                location_id,
                list_id,
            } => self.cascade.move_location(&location_id, &list_id).await?,
            Event::DeleteLocation { location_id } => {
                self.cascade.delete_location(&location_id).await?
            }
            Event::LocationDragEnded {
                list_id,
                location_id,
                from,
                to,
            } => self.locations.reorder(&list_id, &location_id, from, to).await?,
        }
        Ok(Outcome::Done)
    }

    /// Send every debounced edit now.
    pub async fn flush_pending(&self) {
        tokio::join!(
            self.trips.flush_all_pending(),
            self.lists.flush_all_pending(),
            self.locations.flush_all_pending()
        );
    }

    /// Drop unsent edits and revert them locally. Returns how many were dropped.
    pub fn shutdown(&self) -> usize {
        let discarded = self.trips.discard_all_pending()
            + self.lists.discard_all_pending()
            + self.locations.discard_all_pending();
        if discarded > 0 {
            warn!(discarded, "shutting down with unsaved edits");
        } else {
            info!("trip planner shut down");
        }
        discarded
    }
}
