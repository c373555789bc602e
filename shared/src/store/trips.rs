use bytes::Bytes;
use std::path::Path;
use tracing::{info, instrument};
use url::Url;

use super::EntityStore;
use crate::error::{Operation, SyncError};
use crate::model::{
    Entity, LatLon, NewTrip, Slug, Trip, TripId, TripPatch, UnixTimeMs, UserId, ValidationError,
};
use crate::remote::{BlobStorage, RemoteError};

/// Add or replace the `t` query parameter so clients refetch a re-uploaded image.
pub fn cache_busted(public_url: &str, at: UnixTimeMs) -> Result<String, url::ParseError> {
    let mut url = Url::parse(public_url)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "t")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("t", &at.0.to_string());
    Ok(url.into())
}

/// Object path of a trip image inside `bucket`, recovered from its public URL.
pub fn image_path(public_url: &str, bucket: &str) -> Option<String> {
    let url = Url::parse(public_url).ok()?;
    let marker = format!("/{bucket}/");
    let (_, path) = url.path().split_once(&marker)?;
    (!path.is_empty()).then(|| path.to_string())
}

fn image_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map_or_else(|| "jpg".to_string(), str::to_ascii_lowercase)
}

impl EntityStore<Trip> {
    /// Load the user's trips, newest first.
    pub async fn fetch_trips(&self, user: &UserId) -> Result<(), SyncError> {
        self.fetch_for(user).await?;
        self.mutator()
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(())
    }

    pub fn by_slug(&self, slug: &str) -> Option<Trip> {
        self.mutator()
            .read(|c| c.iter().find(|t| t.slug.as_str() == slug).cloned())
    }

    /// Create a trip and return its shareable slug.
    #[instrument(skip_all, fields(user = %new.user_id))]
    pub async fn add_trip(&self, new: NewTrip) -> Result<Slug, SyncError> {
        if new.title.trim().is_empty() {
            return Err(ValidationError::Empty("trip title").into());
        }
        let trip = new.into_trip(Slug::generate(self.config().slug_length));
        let slug = trip.slug.clone();
        self.insert_at(trip, 0).await?;
        info!(%slug, "trip created");
        Ok(slug)
    }

    pub fn update_title(&self, id: &TripId, title: String) -> Result<(), SyncError> {
        self.update_debounced(id, TripPatch::default().title(title))
    }

    pub fn update_notes(&self, id: &TripId, notes: String) -> Result<(), SyncError> {
        self.update_debounced(id, TripPatch::default().notes(notes))
    }

    pub async fn update_center(&self, id: &TripId, center: LatLon) -> Result<(), SyncError> {
        self.update_now(id, TripPatch::default().center(center)).await
    }

    /// Upload a new cover image and point the trip at it. The trip only
    /// changes locally once the URL is stored remotely.
    #[instrument(skip_all, fields(%id, %file_name))]
    pub async fn update_image(
        &self,
        storage: &dyn BlobStorage,
        id: &TripId,
        file_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, SyncError> {
        let id = self.mutator().resolve(id);
        if self.get(&id).is_none() {
            return Err(SyncError::not_found(Trip::KIND, &id));
        }

        let path = format!("{id}/trip-image.{}", image_extension(file_name));
        let public_url = self
            .call(storage.upload(&path, bytes, content_type))
            .await
            .map_err(|err| self.fail(Operation::UploadImage, &id, err))?;
        let url = cache_busted(&public_url, UnixTimeMs::now()).map_err(|err| {
            self.fail(
                Operation::UploadImage,
                &id,
                RemoteError::Failed(format!("storage returned invalid url {public_url:?}: {err}")),
            )
        })?;

        self.update_confirmed(&id, TripPatch::default().image_url(Some(url.clone())))
            .await?;
        info!(%url, "trip image updated");
        Ok(url)
    }
}
