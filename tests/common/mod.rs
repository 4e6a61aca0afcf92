//! Common test infrastructure
//!
//! Builds a full import stack against in-memory databases and a scripted
//! archive source. Tests only import from this module.

// Not every test binary uses every helper.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

use tapedeck_importer::archive::{ArchiveSource, Show, ShowTrack};
use tapedeck_importer::catalog_store::{CatalogStore, SqliteCatalogStore};
use tapedeck_importer::importer::{
    ArtistNodeMapping, BulkTrackImporter, ImportOptions, ImportResult, RowTrackImporter,
    ShowImporter, TrackWriter,
};
use tapedeck_importer::jobs::{JobService, SqliteJobStore};
use tapedeck_importer::locking::FileLockService;
use tapedeck_importer::matcher::MatcherConfig;
use tapedeck_importer::server::{make_router, ServerState};

pub const TEST_COLLECTION: &str = "TestCollection";
pub const TEST_ARTIST: &str = "Test Artist";
pub const TEST_ARTIST_KEY: &str = "test";

/// Canonical titles seeded into every harness.
pub const CANONICAL_TITLES: [&str; 5] = ["Dark Star", "Ripple", "Bertha", "Althea", "Sugar Magnolia"];

/// Scripted stand-in for the archive metadata API.
pub struct MockArchive {
    /// Identifiers the collection listing returns, in order.
    pub listed: Vec<String>,
    pub shows: Vec<Show>,
    /// Artificial latency per metadata fetch, for cancellation tests.
    pub fetch_delay_ms: u64,
}

impl MockArchive {
    pub fn new(shows: Vec<Show>) -> Self {
        Self {
            listed: shows.iter().map(|s| s.identifier.clone()).collect(),
            shows,
            fetch_delay_ms: 0,
        }
    }
}

#[async_trait]
impl ArchiveSource for MockArchive {
    async fn list_collection_identifiers(
        &self,
        _collection_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<String>> {
        let offset = offset.unwrap_or(0).min(self.listed.len());
        let end = limit
            .map(|l| (offset + l).min(self.listed.len()))
            .unwrap_or(self.listed.len());
        Ok(self.listed[offset..end].to_vec())
    }

    async fn fetch_item_metadata(&self, identifier: &str) -> Result<Show> {
        if self.fetch_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.fetch_delay_ms)).await;
        }
        self.shows
            .iter()
            .find(|s| s.identifier == identifier)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("item not found: {}", identifier))
    }

    async fn test_connectivity(&self) -> Result<bool> {
        Ok(true)
    }

    async fn collection_count(&self, _collection_id: &str) -> Result<usize> {
        Ok(self.listed.len())
    }
}

/// One scripted show with `track_count` tracks drawn from the canonical set.
pub fn make_show(number: usize, track_count: usize) -> Show {
    Show {
        identifier: format!("test1972-03-{:02}", number),
        title: format!("Test Show {}", number),
        date: Some(format!("1972-03-{:02}", number.clamp(1, 28))),
        venue: Some("Test Hall".to_string()),
        taper: Some("Taper McTape".to_string()),
        lineage: None,
        stream_host: None,
        stream_path: None,
        tracks: (0..track_count)
            .map(|t| ShowTrack {
                title: CANONICAL_TITLES[t % CANONICAL_TITLES.len()].to_string(),
                position: t as u32 + 1,
                file_ref: format!("s{:02}t{:02}.flac", number, t + 1),
                duration_secs: Some(300.0 + t as f64),
                md5: None,
                size_bytes: Some(1_000_000),
            })
            .collect(),
    }
}

pub fn make_collection(show_count: usize, tracks_per_show: usize) -> Vec<Show> {
    (1..=show_count)
        .map(|i| make_show(i, tracks_per_show))
        .collect()
}

/// A full import stack over in-memory databases.
pub struct TestHarness {
    pub store: Arc<SqliteCatalogStore>,
    pub jobs: Arc<SqliteJobStore>,
    pub archive: Arc<MockArchive>,
    pub importer: Arc<ShowImporter>,
    pub job_service: Arc<JobService>,
    pub locks: Arc<FileLockService>,
    pub artist_node: i64,
    _lock_dir: TempDir,
}

impl TestHarness {
    pub fn new(shows: Vec<Show>) -> Self {
        Self::with_archive(MockArchive::new(shows))
    }

    pub fn with_archive(archive: MockArchive) -> Self {
        let store = Arc::new(SqliteCatalogStore::in_memory().unwrap());
        for title in CANONICAL_TITLES {
            store.add_canonical_track(TEST_ARTIST_KEY, title, &[]).unwrap();
        }
        let artist_node = store.create_node(None, TEST_ARTIST, None).unwrap();
        let mut mapping = ArtistNodeMapping::default();
        mapping
            .by_collection
            .insert(TEST_COLLECTION.to_string(), artist_node);

        let lock_dir = tempfile::tempdir().unwrap();
        let locks = Arc::new(FileLockService::new(lock_dir.path()).unwrap());
        let archive = Arc::new(archive);
        let importer = Arc::new(ShowImporter::new(
            archive.clone(),
            store.clone(),
            locks.clone(),
            mapping,
            MatcherConfig::default(),
        ));
        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let job_service = Arc::new(JobService::new(importer.clone(), jobs.clone()));

        Self {
            store,
            jobs,
            archive,
            importer,
            job_service,
            locks,
            artist_node,
            _lock_dir: lock_dir,
        }
    }

    pub fn options(&self) -> ImportOptions {
        ImportOptions::new(TEST_ARTIST, TEST_ARTIST_KEY, TEST_COLLECTION)
    }

    /// Run one import to completion with the chosen writer.
    pub async fn run_import(&self, options: &ImportOptions, bulk: bool) -> ImportResult {
        let mut writer: Box<dyn TrackWriter> = if bulk {
            Box::new(BulkTrackImporter::new())
        } else {
            Box::new(RowTrackImporter::new())
        };
        self.importer
            .import_collection(options, writer.as_mut(), &AtomicBool::new(false), None)
            .await
            .unwrap()
    }
}

/// An ops server bound to an ephemeral port over a [`TestHarness`].
pub struct TestServer {
    pub base_url: String,
    pub harness: TestHarness,
}

impl TestServer {
    pub async fn spawn(harness: TestHarness) -> Self {
        let state = ServerState {
            catalog_store: harness.store.clone(),
            archive: harness.archive.clone(),
            job_service: harness.job_service.clone(),
            default_batch_size: 100,
            default_bulk_writes: true,
            start_time: Instant::now(),
            hash: "test".to_string(),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, make_router(state)).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            harness,
        }
    }
}
