//! Collection/show import orchestration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::classification::{ArtistNodeMapping, ShowNodeCache};
use super::track_importer::{ImportContext, TrackWriter};
use super::{
    validate_identifier, AttributeOptionCache, ImportError, ImportResult, ProgressFn,
    ProgressUpdate, ShowError,
};
use crate::archive::ArchiveSource;
use crate::catalog_store::CatalogStore;
use crate::locking::LockService;
use crate::matcher::{MatcherConfig, TrackMatcher};

pub const DEFAULT_BATCH_SIZE: usize = 100;

const LOCK_OPERATION: &str = "import";

/// Parameters for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub artist_name: String,
    /// Key the canonical catalog and unmatched records are filed under.
    pub artist_key: String,
    pub collection_id: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub batch_size: usize,
    pub dry_run: bool,
}

impl ImportOptions {
    pub fn new(artist_name: &str, artist_key: &str, collection_id: &str) -> Self {
        Self {
            artist_name: artist_name.to_string(),
            artist_key: artist_key.to_string(),
            collection_id: collection_id.to_string(),
            limit: None,
            offset: None,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }
}

/// Orchestrates import runs: lock, fetch, match, write, classify.
///
/// One importer instance serves many runs; all per-run state lives on the
/// stack of [`import_collection`](Self::import_collection).
pub struct ShowImporter {
    source: Arc<dyn ArchiveSource>,
    store: Arc<dyn CatalogStore>,
    locks: Arc<dyn LockService>,
    artist_nodes: ArtistNodeMapping,
    matcher_config: MatcherConfig,
}

impl ShowImporter {
    pub fn new(
        source: Arc<dyn ArchiveSource>,
        store: Arc<dyn CatalogStore>,
        locks: Arc<dyn LockService>,
        artist_nodes: ArtistNodeMapping,
        matcher_config: MatcherConfig,
    ) -> Self {
        Self {
            source,
            store,
            locks,
            artist_nodes,
            matcher_config,
        }
    }

    /// Import a whole collection. Holds the (import, collection) lock for
    /// the duration of the run; fails immediately on contention.
    pub async fn import_collection(
        &self,
        options: &ImportOptions,
        writer: &mut dyn TrackWriter,
        cancel: &AtomicBool,
        progress: Option<&ProgressFn>,
    ) -> Result<ImportResult, ImportError> {
        validate_identifier(&options.collection_id)?;
        let token =
            self.locks
                .acquire(LOCK_OPERATION, &options.collection_id, Duration::ZERO)?;

        let outcome = self
            .run_collection(options, writer, cancel, progress)
            .await;

        if let Err(e) = self.locks.release(&token) {
            warn!("Failed to release import lock: {}", e);
        }
        outcome
    }

    /// Import a single show by identifier, locked on the identifier itself.
    pub async fn import_show(
        &self,
        identifier: &str,
        options: &ImportOptions,
        writer: &mut dyn TrackWriter,
    ) -> Result<ImportResult, ImportError> {
        validate_identifier(identifier)?;
        let token = self
            .locks
            .acquire(LOCK_OPERATION, identifier, Duration::ZERO)?;

        let outcome = self
            .run_identifiers(options, writer, std::slice::from_ref(&identifier.to_string()))
            .await;

        if let Err(e) = self.locks.release(&token) {
            warn!("Failed to release import lock: {}", e);
        }
        outcome
    }

    async fn run_collection(
        &self,
        options: &ImportOptions,
        writer: &mut dyn TrackWriter,
        cancel: &AtomicBool,
        progress: Option<&ProgressFn>,
    ) -> Result<ImportResult, ImportError> {
        let identifiers = self
            .source
            .list_collection_identifiers(&options.collection_id, options.limit, options.offset)
            .await
            .map_err(|e| ImportError::FatalCollection(e.to_string()))?;
        info!(
            "Importing {} shows from collection {} (dry_run={})",
            identifiers.len(),
            options.collection_id,
            options.dry_run
        );
        self.run(options, writer, &identifiers, Some(cancel), progress)
            .await
    }

    async fn run_identifiers(
        &self,
        options: &ImportOptions,
        writer: &mut dyn TrackWriter,
        identifiers: &[String],
    ) -> Result<ImportResult, ImportError> {
        self.run(options, writer, identifiers, None, None).await
    }

    async fn run(
        &self,
        options: &ImportOptions,
        writer: &mut dyn TrackWriter,
        identifiers: &[String],
        cancel: Option<&AtomicBool>,
        progress: Option<&ProgressFn>,
    ) -> Result<ImportResult, ImportError> {
        let store = self.store.as_ref();

        // Artist nodes are configuration, never auto-created
        let artist_node = self
            .artist_nodes
            .resolve(store, &options.collection_id, &options.artist_name)
            .map_err(|e| ImportError::Write(e.to_string()))?
            .ok_or_else(|| {
                ImportError::FatalCollection(format!(
                    "no classification node configured for collection {} / artist {}",
                    options.collection_id, options.artist_name
                ))
            })?;

        // Matcher indexes are built once per run and held for its duration
        let canonical = store
            .list_canonical_tracks(&options.artist_key)
            .map_err(|e| ImportError::Write(e.to_string()))?;
        let mut matcher = TrackMatcher::new(self.matcher_config.clone());
        matcher.build_indexes(&options.artist_key, canonical);

        let mut option_cache = AttributeOptionCache::new();
        let mut show_cache = ShowNodeCache::new(artist_node);
        let mut result = ImportResult::default();

        if !options.dry_run {
            writer.begin_run(store)?;
        }

        let total = identifiers.len();
        let mut since_flush = 0usize;
        for (i, identifier) in identifiers.iter().enumerate() {
            if let Some(cancel) = cancel {
                if cancel.load(Ordering::Relaxed) {
                    info!("Import cancelled after {} shows", result.shows_processed);
                    break;
                }
            }

            match self
                .process_show(
                    identifier,
                    options,
                    writer,
                    &mut matcher,
                    &mut option_cache,
                    &mut show_cache,
                    &mut result,
                )
                .await
            {
                Ok(()) => result.shows_processed += 1,
                Err(message) => {
                    warn!("Show {} failed: {}", identifier, message);
                    result.errors.push(ShowError {
                        identifier: identifier.clone(),
                        message,
                    });
                }
            }
            since_flush += 1;

            if let Some(progress) = progress {
                progress(ProgressUpdate {
                    total,
                    current: i + 1,
                    message: format!("Processed {}", identifier),
                });
            }

            // Batch boundary: evict the per-run caches to bound memory
            if since_flush == options.batch_size {
                option_cache.clear();
                show_cache.clear();
                result.batches_flushed += 1;
                since_flush = 0;
            }
        }
        if since_flush > 0 {
            option_cache.clear();
            show_cache.clear();
            result.batches_flushed += 1;
        }

        if !options.dry_run {
            // A failed finalization must not erase the counts of work
            // already committed during the run
            if let Err(e) = writer.finish_run(store) {
                return Err(ImportError::Finalize {
                    message: e.to_string(),
                    partial: Box::new(result),
                });
            }
        }
        matcher.clear_indexes();

        info!(
            "Import finished: {} shows, {} created, {} updated, {} skipped, {} unmatched, {} errors",
            result.shows_processed,
            result.tracks_created,
            result.tracks_updated,
            result.tracks_skipped,
            result.tracks_unmatched,
            result.errors.len()
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_show(
        &self,
        identifier: &str,
        options: &ImportOptions,
        writer: &mut dyn TrackWriter,
        matcher: &mut TrackMatcher,
        option_cache: &mut AttributeOptionCache,
        show_cache: &mut ShowNodeCache,
        result: &mut ImportResult,
    ) -> Result<(), String> {
        validate_identifier(identifier).map_err(|e| e.to_string())?;

        let show = self
            .source
            .fetch_item_metadata(identifier)
            .await
            .map_err(|e| e.to_string())?;

        let store = self.store.as_ref();
        let mut ctx = ImportContext {
            store,
            matcher,
            options: option_cache,
            artist_key: &options.artist_key,
            collection_key: &options.collection_id,
            dry_run: options.dry_run,
        };
        let outcome = writer
            .import_show_tracks(&show, &mut ctx)
            .map_err(|e| e.to_string())?;

        result.tracks_created += outcome.created;
        result.tracks_updated += outcome.updated;
        result.tracks_skipped += outcome.skipped;
        result.tracks_unmatched += outcome.unmatched;

        if !options.dry_run && !outcome.new_entry_ids.is_empty() {
            let show_node = show_cache
                .get_or_create(store, &show)
                .map_err(|e| e.to_string())?;
            store
                .bulk_assign(&outcome.new_entry_ids, show_node)
                .map_err(|e| e.to_string())?;
            store
                .bulk_assign(&outcome.new_entry_ids, show_cache.artist_node_id())
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}
