//!
//! src/types.rs  Oct 18th, 2025
//!
//! Identifier, stored record, and the validated projections of the
//! catalog's track search and album responses
//!

use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

// International standard recording code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Isrc(String);

impl Isrc {
    /// Accepts `^[A-Z]{2}[A-Z0-9]{3}\d{7}$`
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let b = raw.as_bytes();
        let valid = b.len() == 12
            && b[..2].iter().all(u8::is_ascii_uppercase)
            && b[2..5].iter().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            && b[5..].iter().all(u8::is_ascii_digit);
        if !valid {
            return Err(ServiceError::Validation(format!("Invalid ISRC format: {raw}")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blob name the cover for this key is stored under
    pub fn cover_file_name(&self) -> String {
        format!("{}.jpg", self.0)
    }
}

impl std::fmt::Display for Isrc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub isrc: String,
    pub title: String,
    pub primary_artist: String,
    pub album_title: String,
    pub album_id: String,
    pub explicit: bool,
    pub duration_seconds: i64,
    pub cover_image_ref: String,
    pub created_at: chrono::DateTime<chrono::Utc>
}

impl TrackRecord {
    pub fn compose(
        isrc: &Isrc,
        track: &UpstreamTrack,
        album: &UpstreamAlbum,
        cover_image_ref: String
    ) -> Self {
        Self {
            isrc: isrc.as_str().to_string(),
            title: track.name.clone(),
            primary_artist: track.primary_artist().to_string(),
            album_title: album.name.clone(),
            album_id: album.id.clone(),
            explicit: track.explicit,
            duration_seconds: track.duration_seconds(),
            cover_image_ref,
            created_at: chrono::Utc::now()
        }
    }
}

///
/// Catalog projections. Required fields are enforced while deserializing
/// through the `Raw*` shapes, so a missing title or album never turns into
/// a default-filled value.
///

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub tracks: SearchPage
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<UpstreamTrack>
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamArtist {
    pub name: String
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamImage {
    pub url: String
}

#[derive(Deserialize)]
struct RawTrack {
    name: String,
    #[serde(default)]
    explicit: bool,
    #[serde(default)]
    duration_ms: i64,
    album: UpstreamAlbum,
    artists: Option<Vec<UpstreamArtist>>
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTrack")]
pub struct UpstreamTrack {
    pub name: String,
    pub explicit: bool,
    pub duration_ms: i64,
    pub album: UpstreamAlbum,
    pub artists: Vec<UpstreamArtist>
}

impl TryFrom<RawTrack> for UpstreamTrack {
    type Error = String;

    fn try_from(raw: RawTrack) -> Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err("track 'name' cannot be empty".into());
        }
        Ok(Self {
            name: raw.name,
            explicit: raw.explicit,
            duration_ms: raw.duration_ms.max(0),
            album: raw.album,
            artists: raw.artists.unwrap_or_default()
        })
    }
}

impl UpstreamTrack {
    pub fn primary_artist(&self) -> &str {
        self.artists
            .first()
            .map(|a| a.name.as_str())
            .unwrap_or(UNKNOWN_ARTIST)
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration_ms / 1000
    }
}

#[derive(Deserialize)]
struct RawAlbum {
    id: String,
    name: String,
    #[serde(default)]
    images: Option<Vec<UpstreamImage>>
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawAlbum")]
pub struct UpstreamAlbum {
    pub id: String,
    pub name: String,
    pub images: Vec<UpstreamImage>
}

impl TryFrom<RawAlbum> for UpstreamAlbum {
    type Error = String;

    fn try_from(raw: RawAlbum) -> Result<Self, Self::Error> {
        if raw.id.trim().is_empty() {
            return Err("album 'id' cannot be empty".into());
        }
        if raw.name.trim().is_empty() {
            return Err("album 'name' cannot be empty".into());
        }
        Ok(Self { id: raw.id, name: raw.name, images: raw.images.unwrap_or_default() })
    }
}

impl UpstreamAlbum {
    /// First candidate, if it carries a usable url
    pub fn primary_image_url(&self) -> Option<&str> {
        self.images
            .first()
            .map(|i| i.url.as_str())
            .filter(|u| !u.trim().is_empty())
    }
}
