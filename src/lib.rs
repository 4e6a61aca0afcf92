//! Tapedeck Importer Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod archive;
pub mod catalog_store;
pub mod config;
pub mod importer;
pub mod jobs;
pub mod locking;
pub mod matcher;
pub mod server;

// Re-export commonly used types for convenience
pub use archive::{ArchiveSource, HttpArchiveClient, Show, ShowTrack};
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use importer::{
    BulkTrackImporter, ImportOptions, ImportResult, RowTrackImporter, ShowImporter, TrackWriter,
};
pub use jobs::{ImportJob, JobService, JobStatus, JobStore, SqliteJobStore};
pub use locking::{FileLockService, LockService};
pub use matcher::{MatcherConfig, TrackMatcher};
pub use server::{make_router, run_server, ServerState};
