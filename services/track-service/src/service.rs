//!
//! src/service.rs  Oct 18th, 2025
//!
//! Outer operations over the acquirer: raw ISRC input is validated here and
//! stored records are shaped into the public track representation.
//!

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use url::Url;

use crate::acquisition::Acquirer;
use crate::errors::ServiceError;
use crate::sink::StoredFile;
use crate::types::{Isrc, TrackRecord};

pub const STATUS_CREATED: u16 = 201;
pub const STATUS_OK: u16 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub isrc: String,
    pub name: String,
    pub artist_name: String,
    pub album_name: String,
    pub is_explicit: bool,
    pub playback_seconds: i64,
    pub cover_image_url: String
}

impl TrackResponse {
    pub fn from_record(record: &TrackRecord, public_base_url: &Url) -> Self {
        let base = public_base_url.as_str().trim_end_matches('/');
        Self {
            isrc: record.isrc.clone(),
            name: record.title.clone(),
            artist_name: record.primary_artist.clone(),
            album_name: record.album_title.clone(),
            is_explicit: record.explicit,
            playback_seconds: record.duration_seconds,
            cover_image_url: format!("{base}/api/v1/tracks/{}/cover", record.isrc)
        }
    }
}

pub struct TrackService {
    acquirer: Arc<Acquirer>,
    public_base_url: Url
}

impl TrackService {
    pub fn new(acquirer: Arc<Acquirer>, public_base_url: Url) -> Self {
        Self { acquirer, public_base_url }
    }

    /// Returns the status to report alongside the body
    pub async fn create_track(&self, raw_isrc: &str) -> Result<(u16, TrackResponse), ServiceError> {
        let isrc = Isrc::parse(raw_isrc)?;
        let record = self.acquirer.get_or_create(&isrc).await?;
        info!(isrc = %isrc, "service.track.created");
        Ok((STATUS_CREATED, TrackResponse::from_record(&record, &self.public_base_url)))
    }

    pub async fn get_track(&self, raw_isrc: &str) -> Result<(u16, TrackResponse), ServiceError> {
        let record = self.stored(raw_isrc).await?;
        Ok((STATUS_OK, TrackResponse::from_record(&record, &self.public_base_url)))
    }

    pub async fn get_cover(&self, raw_isrc: &str) -> Result<StoredFile, ServiceError> {
        let record = self.stored(raw_isrc).await?;
        self.acquirer.blobs().load(&record.cover_image_ref).await
    }

    /// Reads answer a malformed key the same way as an absent one
    async fn stored(&self, raw_isrc: &str) -> Result<TrackRecord, ServiceError> {
        let isrc = Isrc::parse(raw_isrc).map_err(|_| {
            ServiceError::NotFound(format!("Track not found with ISRC: {raw_isrc}"))
        })?;
        self.acquirer.find(&isrc).await
    }
}
