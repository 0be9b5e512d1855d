//!
//! src/acquisition.rs  Oct 18th, 2025
//!
//! Get-or-create for tracks: serve from the store when present, otherwise
//! resolve track and album metadata from the catalog, download and store
//! the cover, then persist the composed record.
//!

use std::sync::Arc;

use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::download::{ByteFetcher, RetryingDownloader};
use crate::errors::ServiceError;
use crate::fetch::CatalogApi;
use crate::persistent::TrackStore;
use crate::sink::BlobStore;
use crate::types::{Isrc, TrackRecord, UpstreamAlbum, UpstreamTrack};

pub struct Acquirer {
    store: Arc<dyn TrackStore>,
    blobs: Arc<dyn BlobStore>,
    catalog: Arc<dyn CatalogApi>,
    downloader: RetryingDownloader<Arc<dyn ByteFetcher>>,
    tracks: ResponseCache<Isrc, UpstreamTrack>,
    albums: ResponseCache<String, UpstreamAlbum>
}

impl Acquirer {
    pub fn new(
        store: Arc<dyn TrackStore>,
        blobs: Arc<dyn BlobStore>,
        catalog: Arc<dyn CatalogApi>,
        downloader: RetryingDownloader<Arc<dyn ByteFetcher>>
    ) -> Self {
        Self {
            store,
            blobs,
            catalog,
            downloader,
            tracks: ResponseCache::new("tracks"),
            albums: ResponseCache::new("albums")
        }
    }

    /// Store-only read
    pub async fn find(&self, isrc: &Isrc) -> Result<TrackRecord, ServiceError> {
        self.store.find_by_isrc(isrc).await?.ok_or_else(|| {
            warn!(isrc = %isrc, "track.missing");
            ServiceError::NotFound(format!("Track not found with ISRC: {isrc}"))
        })
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    pub async fn get_or_create(&self, isrc: &Isrc) -> Result<TrackRecord, ServiceError> {
        let span = info_span!("acquire", isrc = %isrc, request_id = %Uuid::new_v4());
        self.get_or_create_inner(isrc).instrument(span).await
    }

    async fn get_or_create_inner(&self, isrc: &Isrc) -> Result<TrackRecord, ServiceError> {
        if let Some(existing) = self.store.find_by_isrc(isrc).await? {
            debug!("acquire.existing");
            return Ok(existing);
        }
        info!("acquire.start");

        let track = self.tracks
            .get_or_compute(isrc, || self.catalog.track_by_isrc(isrc))
            .await?;

        let album_id = track.album.id.clone();
        let album = self.albums
            .get_or_compute(&album_id, || self.catalog.album_by_id(&album_id))
            .await?;

        let image_url = album.primary_image_url().ok_or_else(|| {
            warn!(album_id = %album.id, "acquire.no_image");
            ServiceError::NotFound(format!("Could not find cover image URL for album: {}", album.id))
        })?;

        let bytes = self.downloader.download(image_url).await?;
        let cover_ref = self.blobs.store(&bytes, &isrc.cover_file_name()).await?;
        info!(cover = %cover_ref, size = bytes.len(), "acquire.cover_stored");

        let record = TrackRecord::compose(isrc, &track, &album, cover_ref);
        match self.store.save(&record).await {
            Ok(saved) => {
                info!("acquire.saved");
                Ok(saved)
            }
            Err(ServiceError::Conflict(msg)) => {
                // a concurrent request created it first
                info!(detail = %msg, "acquire.conflict");
                self.store.find_by_isrc(isrc).await?.ok_or_else(|| ServiceError::Storage(
                    format!("conflict on {isrc} but no stored record")
                ))
            }
            Err(e) => Err(e)
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::RetryConfig;
    use crate::persistent::Persistent;
    use crate::sink::LocalCoverStore;

    pub const TEST_ISRC: &str = "USRC17607839";

    pub fn test_track(artists: serde_json::Value) -> UpstreamTrack {
        serde_json::from_value(serde_json::json!({
            "name": "Test Song",
            "explicit": false,
            "duration_ms": 200000,
            "album": {
                "id": "A1",
                "name": "Test Album",
                "images": [{ "url": "http://x/img.jpg" }]
            },
            "artists": artists
        })).expect("valid track")
    }

    pub struct FakeCatalog {
        pub track: Option<UpstreamTrack>,
        pub album: UpstreamAlbum,
        pub track_calls: AtomicUsize,
        pub album_calls: AtomicUsize
    }

    impl FakeCatalog {
        pub fn with_track(track: UpstreamTrack) -> Self {
            Self {
                album: track.album.clone(),
                track: Some(track),
                track_calls: AtomicUsize::new(0),
                album_calls: AtomicUsize::new(0)
            }
        }

        pub fn calls(&self) -> usize {
            self.track_calls.load(Ordering::SeqCst) + self.album_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogApi for FakeCatalog {
        async fn track_by_isrc(&self, isrc: &Isrc) -> Result<UpstreamTrack, ServiceError> {
            self.track_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.track.clone().ok_or_else(|| ServiceError::NotFound(
                format!("No track found for ISRC: {isrc}")
            ))
        }

        async fn album_by_id(&self, _album_id: &str) -> Result<UpstreamAlbum, ServiceError> {
            self.album_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(self.album.clone())
        }
    }

    pub struct FakeImage {
        pub body: Vec<u8>,
        pub calls: AtomicUsize
    }

    impl FakeImage {
        pub fn jpeg(len: usize) -> Self {
            let mut body = vec![0xFF, 0xD8, 0xFF, 0xE0];
            body.resize(len, 0);
            Self { body, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ByteFetcher for FakeImage {
        async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    pub struct Harness {
        pub acquirer: Arc<Acquirer>,
        pub db: Arc<Persistent>,
        pub catalog: Arc<FakeCatalog>,
        pub image: Arc<FakeImage>,
        pub _dir: tempfile::TempDir
    }

    pub async fn harness(catalog: FakeCatalog) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Persistent::init("sqlite::memory:").await.expect("db"));
        let blobs = Arc::new(LocalCoverStore::new(dir.path()).expect("store"));
        let catalog = Arc::new(catalog);
        let image = Arc::new(FakeImage::jpeg(200));
        let fetcher: Arc<dyn ByteFetcher> = image.clone();
        let policy = RetryConfig { max_attempts: 3, delay: Duration::ZERO };

        let acquirer = Arc::new(Acquirer::new(
            db.clone(),
            blobs,
            catalog.clone(),
            RetryingDownloader::new(fetcher, policy)
        ));
        Harness { acquirer, db, catalog, image, _dir: dir }
    }

    #[tokio::test]
    async fn creates_record_from_catalog() -> Result<(), ServiceError> {
        let h = harness(FakeCatalog::with_track(
            test_track(serde_json::json!([{ "name": "Test Artist" }]))
        )).await;
        let isrc = Isrc::parse(TEST_ISRC)?;

        let record = h.acquirer.get_or_create(&isrc).await?;

        assert_eq!(record.isrc, TEST_ISRC);
        assert_eq!(record.title, "Test Song");
        assert_eq!(record.primary_artist, "Test Artist");
        assert_eq!(record.album_title, "Test Album");
        assert_eq!(record.album_id, "A1");
        assert!(!record.explicit);
        assert_eq!(record.duration_seconds, 200);
        assert_eq!(record.cover_image_ref, "USRC17607839.jpg");

        let cover = h.acquirer.blobs().load(&record.cover_image_ref).await?;
        assert_eq!(cover.bytes.len(), 200);
        assert_eq!(cover.content_type, "image/jpeg");
        assert_eq!(h.acquirer.find(&isrc).await?, record);
        Ok(())
    }

    #[tokio::test]
    async fn existing_record_makes_no_network_calls() -> Result<(), ServiceError> {
        let h = harness(FakeCatalog::with_track(test_track(serde_json::json!([])))).await;
        let isrc = Isrc::parse(TEST_ISRC)?;
        let first = h.acquirer.get_or_create(&isrc).await?;
        let before = (h.catalog.calls(), h.image.calls.load(Ordering::SeqCst));

        for _ in 0..3 {
            assert_eq!(h.acquirer.get_or_create(&isrc).await?, first);
        }
        assert_eq!((h.catalog.calls(), h.image.calls.load(Ordering::SeqCst)), before);
        Ok(())
    }

    #[tokio::test]
    async fn empty_artists_use_fallback() -> Result<(), ServiceError> {
        let h = harness(FakeCatalog::with_track(test_track(serde_json::json!([])))).await;
        let record = h.acquirer.get_or_create(&Isrc::parse(TEST_ISRC)?).await?;
        assert_eq!(record.primary_artist, "Unknown Artist");
        Ok(())
    }

    #[tokio::test]
    async fn no_catalog_match_is_not_found_and_retryable() -> Result<(), ServiceError> {
        let mut catalog = FakeCatalog::with_track(test_track(serde_json::json!([])));
        catalog.track = None;
        let h = harness(catalog).await;
        let isrc = Isrc::parse(TEST_ISRC)?;

        for _ in 0..2 {
            let r = h.acquirer.get_or_create(&isrc).await;
            assert!(matches!(r, Err(ServiceError::NotFound(_))), "{r:?}");
        }
        // failures are not cached, so both calls reached the catalog
        assert_eq!(h.catalog.track_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.db.count_tracks().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn album_without_usable_image_is_not_found() -> Result<(), ServiceError> {
        let mut catalog = FakeCatalog::with_track(test_track(serde_json::json!([])));
        catalog.album.images.clear();
        let h = harness(catalog).await;

        let r = h.acquirer.get_or_create(&Isrc::parse(TEST_ISRC)?).await;

        assert!(matches!(r, Err(ServiceError::NotFound(_))), "{r:?}");
        assert_eq!(h.image.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.db.count_tracks().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn album_lookups_are_shared_across_tracks() -> Result<(), ServiceError> {
        let h = harness(FakeCatalog::with_track(test_track(serde_json::json!([])))).await;

        h.acquirer.get_or_create(&Isrc::parse("USRC17607839")?).await?;
        h.acquirer.get_or_create(&Isrc::parse("GBAYE0601498")?).await?;

        assert_eq!(h.catalog.track_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.catalog.album_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.db.count_tracks().await?, 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_persist_once() -> Result<(), ServiceError> {
        let h = harness(FakeCatalog::with_track(
            test_track(serde_json::json!([{ "name": "Test Artist" }]))
        )).await;
        let isrc = Isrc::parse(TEST_ISRC)?;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let acquirer = h.acquirer.clone();
            let isrc = isrc.clone();
            tasks.spawn(async move { acquirer.get_or_create(&isrc).await });
        }

        let mut records = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            records.push(joined.expect("task panicked")?);
        }
        assert_eq!(records.len(), 8);
        assert!(records.iter().all(|r| *r == records[0]));
        assert_eq!(h.db.count_tracks().await?, 1);
        Ok(())
    }

    /// Reports a miss on the first lookup, as a racing request would see
    struct RacingStore {
        inner: Persistent,
        lookups: AtomicUsize
    }

    #[async_trait]
    impl TrackStore for RacingStore {
        async fn find_by_isrc(&self, isrc: &Isrc) -> Result<Option<TrackRecord>, ServiceError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            self.inner.find_by_isrc(isrc).await
        }

        async fn save(&self, track: &TrackRecord) -> Result<TrackRecord, ServiceError> {
            self.inner.save(track).await
        }
    }

    #[tokio::test]
    async fn conflict_on_save_rereads_winner() -> Result<(), ServiceError> {
        let inner = Persistent::init("sqlite::memory:").await?;
        let winner = TrackRecord::compose(
            &Isrc::parse(TEST_ISRC)?,
            &test_track(serde_json::json!([{ "name": "First Writer" }])),
            &test_track(serde_json::json!([])).album,
            "USRC17607839.jpg".into()
        );
        let winner = inner.save(&winner).await?;

        let dir = tempfile::tempdir()?;
        let acquirer = Acquirer::new(
            Arc::new(RacingStore { inner, lookups: AtomicUsize::new(0) }),
            Arc::new(LocalCoverStore::new(dir.path())?),
            Arc::new(FakeCatalog::with_track(test_track(serde_json::json!([{ "name": "Late" }])))),
            RetryingDownloader::new(
                Arc::new(FakeImage::jpeg(16)) as Arc<dyn ByteFetcher>,
                RetryConfig { max_attempts: 1, delay: Duration::ZERO }
            )
        );

        let record = acquirer.get_or_create(&Isrc::parse(TEST_ISRC)?).await?;
        assert_eq!(record, winner);
        assert_eq!(record.primary_artist, "First Writer");
        Ok(())
    }
}
