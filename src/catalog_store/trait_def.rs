//! CatalogStore trait definition.
//!
//! Abstracts the catalog backend so the importer, the ops surface and the
//! tests all work against the same narrow contract.

use anyhow::Result;
use std::collections::HashMap;

use super::models::{
    AttributeKind, BulkWriteOutcome, CatalogEntry, ClassificationNode, CleanupFilter,
    CleanupReport, CollectionSummary, IndexMode, UnmatchedStatus, UnmatchedTrackRecord,
};
use crate::matcher::{CanonicalTrack, Suggestion};

/// Storage backend for the imported catalog.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Row-level entry operations (the correctness-reference write path)
    // =========================================================================

    /// Check whether an entry with this generated key exists.
    fn entry_exists(&self, entry_key: &str) -> Result<bool>;

    /// Get an entry by its generated key.
    fn get_entry_by_key(&self, entry_key: &str) -> Result<Option<CatalogEntry>>;

    /// Insert a new entry. Returns the new row id.
    fn insert_entry(&self, entry: &CatalogEntry) -> Result<i64>;

    /// Update the entry with `entry.entry_key` in place.
    fn update_entry(&self, entry: &CatalogEntry) -> Result<()>;

    /// Delete an entry by key. Returns false if no such entry existed.
    fn delete_entry(&self, entry_key: &str) -> Result<bool>;

    /// Total number of entries.
    fn entries_count(&self) -> Result<usize>;

    // =========================================================================
    // Bulk write path (batched statements against the underlying tables)
    // =========================================================================

    /// Upsert a batch of entries in one transaction, keyed on entry_key.
    fn bulk_upsert_entries(&self, entries: &[CatalogEntry]) -> Result<BulkWriteOutcome>;

    // =========================================================================
    // Attribute options
    // =========================================================================

    /// Resolve a (attribute, label) pair to its code, creating it if absent.
    fn get_or_create_option(&self, attribute: AttributeKind, label: &str) -> Result<i64>;

    /// Bulk variant: resolve many labels of one attribute in a single
    /// grouped call. Returns label -> code.
    fn get_or_create_options_bulk(
        &self,
        attribute: AttributeKind,
        labels: &[String],
    ) -> Result<HashMap<String, i64>>;

    // =========================================================================
    // Classification nodes
    // =========================================================================

    /// Get a node by id.
    fn get_node(&self, id: i64) -> Result<Option<ClassificationNode>>;

    /// Find a child node of `parent_id` by its external key.
    fn find_child_node(
        &self,
        parent_id: i64,
        external_key: &str,
    ) -> Result<Option<ClassificationNode>>;

    /// Create a node. Returns the new node id.
    fn create_node(
        &self,
        parent_id: Option<i64>,
        name: &str,
        external_key: Option<&str>,
    ) -> Result<i64>;

    /// Link many entries to one node in a single batched operation,
    /// appending after the node's current maximum position. Idempotent.
    /// Returns the number of links written.
    fn bulk_assign(&self, entry_ids: &[i64], node_id: i64) -> Result<usize>;

    // =========================================================================
    // Canonical catalog (matcher input)
    // =========================================================================

    /// List an artist's canonical tracks with their aliases.
    fn list_canonical_tracks(&self, artist_key: &str) -> Result<Vec<CanonicalTrack>>;

    /// Add a canonical track with aliases. Returns the new track id.
    fn add_canonical_track(
        &self,
        artist_key: &str,
        title: &str,
        aliases: &[String],
    ) -> Result<i64>;

    // =========================================================================
    // Unmatched tracks
    // =========================================================================

    /// Record a match failure: first occurrence inserts a pending record,
    /// repeats bump the occurrence count and refresh the suggestion.
    fn record_unmatched(
        &self,
        artist_key: &str,
        title: &str,
        suggestion: Option<&Suggestion>,
    ) -> Result<()>;

    /// List unmatched tracks, optionally filtered by status.
    fn list_unmatched(
        &self,
        artist_key: &str,
        status: Option<UnmatchedStatus>,
    ) -> Result<Vec<UnmatchedTrackRecord>>;

    /// Set the resolution status of an unmatched track.
    fn resolve_unmatched(&self, id: i64, status: UnmatchedStatus) -> Result<()>;

    // =========================================================================
    // Index maintenance
    // =========================================================================

    /// Current index-maintenance mode.
    fn index_mode(&self) -> Result<IndexMode>;

    /// Switch the index-maintenance mode. Returns the previous mode so the
    /// caller can restore it exactly as found.
    fn set_index_mode(&self, mode: IndexMode) -> Result<IndexMode>;

    /// Rebuild the secondary indexes and refresh planner statistics.
    fn reindex(&self) -> Result<()>;

    // =========================================================================
    // Ops surface
    // =========================================================================

    /// List known collections, optionally with entry counts and last-import
    /// times.
    fn list_collections(&self, include_stats: bool) -> Result<Vec<CollectionSummary>>;

    /// Delete old entries matching the filter. Dry run only counts.
    fn cleanup_entries(
        &self,
        filter: &CleanupFilter,
        older_than_days: Option<u32>,
        dry_run: bool,
        batch_size: usize,
    ) -> Result<CleanupReport>;
}
