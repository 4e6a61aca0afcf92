//! The two track writers: row-at-a-time reference path and the bulk path.

use chrono::Utc;
use tracing::{debug, warn};

use super::attribute_cache::AttributeOptionCache;
use super::ImportError;
use crate::archive::{Show, ShowTrack};
use crate::catalog_store::{
    generate_entry_key, AttributeKind, CatalogEntry, CatalogStore, IndexMode,
};
use crate::matcher::{MatchOutcome, TrackMatcher};

/// Everything a writer needs for one show, owned by the surrounding run.
pub struct ImportContext<'a> {
    pub store: &'a dyn CatalogStore,
    pub matcher: &'a mut TrackMatcher,
    pub options: &'a mut AttributeOptionCache,
    pub artist_key: &'a str,
    pub collection_key: &'a str,
    pub dry_run: bool,
}

/// Per-show write counts.
#[derive(Debug, Clone, Default)]
pub struct TrackImportOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub unmatched: usize,
    pub new_entry_ids: Vec<i64>,
}

/// A strategy for writing one show's tracks into the catalog.
///
/// Both implementations treat the generated entry key as the sole
/// create-vs-update determinant and produce identical logical outcomes.
pub trait TrackWriter: Send {
    /// Called once before the first show of a run.
    fn begin_run(&mut self, _store: &dyn CatalogStore) -> Result<(), ImportError> {
        Ok(())
    }

    /// Match and write one show's tracks.
    fn import_show_tracks(
        &mut self,
        show: &Show,
        ctx: &mut ImportContext,
    ) -> Result<TrackImportOutcome, ImportError>;

    /// Called once after the last show of a run, also on early termination.
    fn finish_run(&mut self, _store: &dyn CatalogStore) -> Result<(), ImportError> {
        Ok(())
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Match one track and build its catalog entry. Returns `None` when the
/// track is skipped (unusable key) or unmatched, after updating the counts.
fn prepare_entry(
    show: &Show,
    track: &ShowTrack,
    ctx: &mut ImportContext,
    outcome: &mut TrackImportOutcome,
) -> Result<Option<CatalogEntry>, ImportError> {
    let Some(entry_key) = generate_entry_key(&show.identifier, &track.file_ref) else {
        debug!(
            "Skipping track with unusable file reference {:?} in {}",
            track.file_ref, show.identifier
        );
        outcome.skipped += 1;
        return Ok(None);
    };

    let title = match ctx.matcher.match_track(&track.title) {
        MatchOutcome::Matched(result) => result.canonical_title,
        MatchOutcome::Unmatched(suggestion) => {
            outcome.unmatched += 1;
            if !ctx.dry_run {
                ctx.store
                    .record_unmatched(ctx.artist_key, &track.title, suggestion.as_ref())
                    .map_err(|e| ImportError::Write(e.to_string()))?;
            }
            return Ok(None);
        }
    };

    let resolve = |ctx: &mut ImportContext,
                   attribute: AttributeKind,
                   label: Option<&str>|
     -> Result<Option<i64>, ImportError> {
        match label {
            Some(label) if !ctx.dry_run => ctx
                .options
                .get_or_create(ctx.store, attribute, label)
                .map(Some)
                .map_err(|e| ImportError::Write(e.to_string())),
            _ => Ok(None),
        }
    };

    let year_code = resolve(ctx, AttributeKind::Year, show.year().as_deref())?;
    let venue_code = resolve(ctx, AttributeKind::Venue, show.venue.as_deref())?;
    let taper_code = resolve(ctx, AttributeKind::Taper, show.taper.as_deref())?;

    Ok(Some(CatalogEntry {
        id: None,
        entry_key,
        title,
        duration_secs: track.duration_secs,
        year_code,
        venue_code,
        taper_code,
        collection_key: ctx.collection_key.to_string(),
        show_identifier: show.identifier.clone(),
        position: track.position,
        file_ref: track.file_ref.clone(),
        created_at: now(),
        updated_at: now(),
    }))
}

/// Count would-create vs would-update without touching the store.
fn dry_run_counts(
    entries: &[CatalogEntry],
    ctx: &ImportContext,
    outcome: &mut TrackImportOutcome,
) -> Result<(), ImportError> {
    for entry in entries {
        let exists = ctx
            .store
            .entry_exists(&entry.entry_key)
            .map_err(|e| ImportError::Write(e.to_string()))?;
        if exists {
            outcome.updated += 1;
        } else {
            outcome.created += 1;
        }
    }
    Ok(())
}

/// Row-at-a-time writer using the store's standard per-entry API.
///
/// The correctness reference: one store round-trip per track.
#[derive(Default)]
pub struct RowTrackImporter;

impl RowTrackImporter {
    pub fn new() -> Self {
        Self
    }
}

impl TrackWriter for RowTrackImporter {
    fn import_show_tracks(
        &mut self,
        show: &Show,
        ctx: &mut ImportContext,
    ) -> Result<TrackImportOutcome, ImportError> {
        let mut outcome = TrackImportOutcome::default();
        let mut entries = Vec::with_capacity(show.tracks.len());
        for track in &show.tracks {
            if let Some(entry) = prepare_entry(show, track, ctx, &mut outcome)? {
                entries.push(entry);
            }
        }

        if ctx.dry_run {
            dry_run_counts(&entries, ctx, &mut outcome)?;
            return Ok(outcome);
        }

        for mut entry in entries {
            let existing = ctx
                .store
                .get_entry_by_key(&entry.entry_key)
                .map_err(|e| ImportError::Write(e.to_string()))?;
            match existing {
                Some(previous) => {
                    entry.created_at = previous.created_at;
                    ctx.store
                        .update_entry(&entry)
                        .map_err(|e| ImportError::Write(e.to_string()))?;
                    outcome.updated += 1;
                }
                None => {
                    let id = ctx
                        .store
                        .insert_entry(&entry)
                        .map_err(|e| ImportError::Write(e.to_string()))?;
                    outcome.created += 1;
                    outcome.new_entry_ids.push(id);
                }
            }
        }
        Ok(outcome)
    }
}

/// Bulk writer: grouped attribute prefetch, one batched upsert per show,
/// index maintenance deferred for the whole run.
#[derive(Default)]
pub struct BulkTrackImporter {
    previous_index_mode: Option<IndexMode>,
}

impl BulkTrackImporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackWriter for BulkTrackImporter {
    fn begin_run(&mut self, store: &dyn CatalogStore) -> Result<(), ImportError> {
        let previous = store
            .set_index_mode(IndexMode::Deferred)
            .map_err(|e| ImportError::Write(e.to_string()))?;
        self.previous_index_mode = Some(previous);
        Ok(())
    }

    fn import_show_tracks(
        &mut self,
        show: &Show,
        ctx: &mut ImportContext,
    ) -> Result<TrackImportOutcome, ImportError> {
        let mut outcome = TrackImportOutcome::default();

        if !ctx.dry_run {
            // One grouped store call per attribute instead of one per track
            for (attribute, label) in [
                (AttributeKind::Year, show.year()),
                (AttributeKind::Venue, show.venue.clone()),
                (AttributeKind::Taper, show.taper.clone()),
            ] {
                if let Some(label) = label {
                    ctx.options
                        .prefetch(ctx.store, attribute, &[label])
                        .map_err(|e| ImportError::Write(e.to_string()))?;
                }
            }
        }

        let mut entries = Vec::with_capacity(show.tracks.len());
        for track in &show.tracks {
            if let Some(entry) = prepare_entry(show, track, ctx, &mut outcome)? {
                entries.push(entry);
            }
        }

        if ctx.dry_run {
            dry_run_counts(&entries, ctx, &mut outcome)?;
            return Ok(outcome);
        }

        if !entries.is_empty() {
            let written = ctx
                .store
                .bulk_upsert_entries(&entries)
                .map_err(|e| ImportError::Write(e.to_string()))?;
            outcome.created += written.created;
            outcome.updated += written.updated;
            outcome.new_entry_ids.extend(written.new_entry_ids);
        }
        Ok(outcome)
    }

    fn finish_run(&mut self, store: &dyn CatalogStore) -> Result<(), ImportError> {
        store
            .reindex()
            .map_err(|e| ImportError::Write(e.to_string()))?;
        // Restore exactly what we found, even if that was already deferred
        if let Some(previous) = self.previous_index_mode.take() {
            let restored_from = store
                .set_index_mode(previous)
                .map_err(|e| ImportError::Write(e.to_string()))?;
            if restored_from != IndexMode::Deferred {
                warn!("Index mode changed outside the run");
            }
        }
        Ok(())
    }
}
