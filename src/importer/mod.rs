//! Show/track import pipeline.
//!
//! The [`ShowImporter`] orchestrates one run: lock, fetch, match, write,
//! classify. Track writing goes through a [`TrackWriter`], either the
//! row-at-a-time reference path or the batched bulk path.

mod attribute_cache;
mod classification;
mod show_importer;
mod track_importer;

pub use attribute_cache::AttributeOptionCache;
pub use classification::{ArtistNodeMapping, ShowNodeCache};
pub use show_importer::{ImportOptions, ShowImporter, DEFAULT_BATCH_SIZE};
pub use track_importer::{
    BulkTrackImporter, ImportContext, RowTrackImporter, TrackImportOutcome, TrackWriter,
};

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::locking::LockError;

/// Errors raised by the import pipeline.
///
/// Show-level problems are accumulated in [`ImportResult::errors`] instead;
/// these variants abort the run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid identifier: {0}")]
    Validation(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("archive fetch failed: {0}")]
    SourceFetch(String),

    #[error("catalog write failed: {0}")]
    Write(String),

    #[error("collection import failed: {0}")]
    FatalCollection(String),

    /// The run's finalization step failed after shows were written. Carries
    /// the counts accumulated up to that point so they are not lost.
    #[error("import finalization failed: {message}")]
    Finalize {
        message: String,
        partial: Box<ImportResult>,
    },
}

/// One show that failed during a run.
#[derive(Debug, Clone, Serialize)]
pub struct ShowError {
    pub identifier: String,
    pub message: String,
}

/// Aggregate outcome of one import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub shows_processed: usize,
    pub tracks_created: usize,
    pub tracks_updated: usize,
    pub tracks_skipped: usize,
    pub tracks_unmatched: usize,
    /// Batch boundaries crossed (each one clears the per-run caches).
    pub batches_flushed: usize,
    pub errors: Vec<ShowError>,
}

impl ImportResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Progress snapshot delivered after every processed identifier.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub total: usize,
    pub current: usize,
    pub message: String,
}

/// Callback receiving progress updates during a run.
pub type ProgressFn = dyn Fn(ProgressUpdate) + Send + Sync;

static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();

/// Validate an archive identifier (collection or item) before any I/O.
pub fn validate_identifier(identifier: &str) -> Result<(), ImportError> {
    let re = IDENTIFIER_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());
    if identifier.len() <= 128 && re.is_match(identifier) {
        Ok(())
    } else {
        Err(ImportError::Validation(identifier.to_string()))
    }
}
