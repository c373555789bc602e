//! Client-side state and sync core for a collaborative trip planner.
//!
//! Trips own ordered lists, lists own ordered locations. Every edit is applied
//! to in-memory state first and written to the remote tables afterwards,
//! either immediately or after a debounce window. A failed write restores the
//! fields it touched and is published on the failure channel.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod cascade;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod mutator;
pub mod ordering;
pub mod remote;
pub mod report;
pub mod snapshot;
pub mod store;

pub use cascade::CascadeCoordinator;
pub use config::{ConfigError, EngineConfig};
pub use engine::{RemoteBackend, TripPlanner};
pub use error::{Operation, SyncError};
pub use event::{Event, Outcome};
pub use model::{
    EntityKind, HexColor, LatLon, List, ListIcon, ListId, Location, LocationId, NewList,
    NewLocation, NewTrip, Slug, Trip, TripId, UnixTimeMs, UserId, ValidationError,
};
pub use remote::{BlobStorage, MemoryBlobStorage, MemoryTable, RemoteError, RemoteTable};
pub use report::{FailureReporter, SyncFailure};
pub use snapshot::EntitySnapshot;
pub use store::{Confirmed, EntityStore, ListStore, LoadState, LocationStore, TripStore};
