//!
//! src/persistent.rs  Oct 18th, 2025
//!
//! Defines the persistent track store. Tracks live in an sqlite database
//! keyed by ISRC; the primary key is what rejects a second creation of
//! the same track.
//!

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteConnectOptions, Pool, Row, Sqlite};
use sqlx::sqlite::SqliteRow;

use crate::errors::ServiceError;
use crate::types::{Isrc, TrackRecord};

#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn find_by_isrc(&self, isrc: &Isrc) -> Result<Option<TrackRecord>, ServiceError>;

    /// Inserts a new record. A duplicate key fails with `Conflict`.
    async fn save(&self, track: &TrackRecord) -> Result<TrackRecord, ServiceError>;
}

pub struct Persistent {
    pool: Pool<Sqlite>
}

impl Persistent {

    async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<(), ServiceError> {
        // ensure that schema exists
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tracks (
              isrc              TEXT PRIMARY KEY,
              title             TEXT NOT NULL,
              artist_name       TEXT NOT NULL,
              album_title       TEXT NOT NULL,
              album_id          TEXT NOT NULL,
              explicit          INTEGER NOT NULL,
              duration_seconds  INTEGER NOT NULL CHECK (duration_seconds >= 0),
              cover_image_ref   TEXT NOT NULL,
              created_at        INTEGER NOT NULL
            );
            "
        ).execute(pool).await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album_id);"
        ).execute(pool).await?;

        Ok(())
    }

    pub async fn init(database_url: &str) -> Result<Self, ServiceError> {
        let is_memory = database_url == "sqlite::memory:";

        let mut opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true);

        // WAL is file-only; don't set it for in-memory
        if !is_memory {
            let filename = opts.clone().get_filename();
            if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            opts = opts.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                       .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(if is_memory {1} else {8})
            .connect_with(opts)
            .await?;

        // Always create schema right away
        Self::ensure_schema(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn count_tracks(&self) -> Result<i64, ServiceError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM tracks;")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    fn row_to_track(r: &SqliteRow) -> Result<TrackRecord, ServiceError> {
        let created_at: i64 = r.try_get("created_at")?;
        let created_at: DateTime<Utc> = Utc.timestamp_opt(created_at, 0)
            .single()
            .ok_or_else(|| ServiceError::Storage(format!("bad created_at {created_at}")))?;

        Ok(TrackRecord {
            isrc: r.try_get("isrc")?,
            title: r.try_get("title")?,
            primary_artist: r.try_get("artist_name")?,
            album_title: r.try_get("album_title")?,
            album_id: r.try_get("album_id")?,
            explicit: r.try_get::<i64, _>("explicit")? == 1,
            duration_seconds: r.try_get("duration_seconds")?,
            cover_image_ref: r.try_get("cover_image_ref")?,
            created_at
        })
    }
}

#[async_trait]
impl TrackStore for Persistent {
    async fn find_by_isrc(&self, isrc: &Isrc) -> Result<Option<TrackRecord>, ServiceError> {
        let row = sqlx::query(
            r"
            SELECT isrc, title, artist_name, album_title, album_id, explicit,
                   duration_seconds, cover_image_ref, created_at
              FROM tracks WHERE isrc = ?1;
            "
        )
        .bind(isrc.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_track).transpose()
    }

    async fn save(&self, track: &TrackRecord) -> Result<TrackRecord, ServiceError> {
        // second-precision, so the returned record matches a later read
        let mut stored = track.clone();
        stored.created_at = Utc.timestamp_opt(track.created_at.timestamp(), 0)
            .single()
            .unwrap_or(track.created_at);

        sqlx::query(
            r"
            INSERT INTO tracks (
                isrc, title, artist_name, album_title, album_id, explicit,
                duration_seconds, cover_image_ref, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);
            "
        )
        .bind(&stored.isrc)
        .bind(&stored.title)
        .bind(&stored.primary_artist)
        .bind(&stored.album_title)
        .bind(&stored.album_id)
        .bind(i32::from(stored.explicit))
        .bind(stored.duration_seconds)
        .bind(&stored.cover_image_ref)
        .bind(stored.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }
}
