//! SQLite-backed catalog store implementation.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use super::models::*;
use super::schema::{CATALOG_SCHEMA_SQL, CATALOG_SCHEMA_VERSION, SECONDARY_INDEXES};
use super::trait_def::CatalogStore;
use crate::matcher::{normalize, CanonicalTrack, Suggestion};

const INDEX_MODE_SETTING: &str = "index_mode";

/// SQLite-backed catalog store.
///
/// A single write connection behind a mutex; the import pipeline is one
/// logical thread per run, so contention only comes from the ops surface.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open or create the catalog database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open catalog database {:?}", db_path.as_ref()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::init(conn)?;
        info!("Opened catalog database at {:?}", db_path.as_ref());
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let version: i32 = conn.query_row("PRAGMA user_version;", [], |r| r.get(0))?;
        if version == 0 {
            conn.execute_batch(CATALOG_SCHEMA_SQL)
                .context("Failed to create catalog schema")?;
            conn.pragma_update(None, "user_version", CATALOG_SCHEMA_VERSION)?;
        } else if version > CATALOG_SCHEMA_VERSION {
            anyhow::bail!(
                "Catalog database version {} is too new (max supported: {})",
                version,
                CATALOG_SCHEMA_VERSION
            );
        }

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        // Secondary indexes exist unless a previous run left the store in
        // deferred mode (crash recovery is operational: reindexing happens
        // on the next bulk run's finish).
        if store.index_mode()? == IndexMode::Incremental {
            let conn = store.conn.lock().unwrap();
            for (_, create_sql) in SECONDARY_INDEXES {
                conn.execute(create_sql, [])?;
            }
        }
        Ok(store)
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: Some(row.get("id")?),
        entry_key: row.get("entry_key")?,
        title: row.get("title")?,
        duration_secs: row.get("duration_secs")?,
        year_code: row.get("year_code")?,
        venue_code: row.get("venue_code")?,
        taper_code: row.get("taper_code")?,
        collection_key: row.get("collection_key")?,
        show_identifier: row.get("show_identifier")?,
        position: row.get::<_, i64>("position")? as u32,
        file_ref: row.get("file_ref")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<ClassificationNode> {
    Ok(ClassificationNode {
        id: row.get("id")?,
        parent_id: row.get("parent_id")?,
        name: row.get("name")?,
        external_key: row.get("external_key")?,
        position: row.get("position")?,
    })
}

impl CatalogStore for SqliteCatalogStore {
    // =========================================================================
    // Row-level entry operations
    // =========================================================================

    fn entry_exists(&self, entry_key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM catalog_entries WHERE entry_key = ?1",
                params![entry_key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    fn get_entry_by_key(&self, entry_key: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT * FROM catalog_entries WHERE entry_key = ?1",
                params![entry_key],
                row_to_entry,
            )
            .optional()?)
    }

    fn insert_entry(&self, entry: &CatalogEntry) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO catalog_entries
                (entry_key, title, duration_secs, year_code, venue_code, taper_code,
                 collection_key, show_identifier, position, file_ref, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.entry_key,
                entry.title,
                entry.duration_secs,
                entry.year_code,
                entry.venue_code,
                entry.taper_code,
                entry.collection_key,
                entry.show_identifier,
                entry.position as i64,
                entry.file_ref,
                entry.created_at,
                entry.updated_at,
            ],
        )
        .with_context(|| format!("Failed to insert entry {}", entry.entry_key))?;
        Ok(conn.last_insert_rowid())
    }

    fn update_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE catalog_entries SET
                title = ?2, duration_secs = ?3, year_code = ?4, venue_code = ?5,
                taper_code = ?6, collection_key = ?7, show_identifier = ?8,
                position = ?9, file_ref = ?10, updated_at = ?11
             WHERE entry_key = ?1",
            params![
                entry.entry_key,
                entry.title,
                entry.duration_secs,
                entry.year_code,
                entry.venue_code,
                entry.taper_code,
                entry.collection_key,
                entry.show_identifier,
                entry.position as i64,
                entry.file_ref,
                Self::now(),
            ],
        )?;
        if changed == 0 {
            anyhow::bail!("No entry with key {}", entry.entry_key);
        }
        Ok(())
    }

    fn delete_entry(&self, entry_key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM catalog_entries WHERE entry_key = ?1",
            params![entry_key],
        )?;
        Ok(changed > 0)
    }

    fn entries_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM catalog_entries", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    // =========================================================================
    // Bulk write path
    // =========================================================================

    fn bulk_upsert_entries(&self, entries: &[CatalogEntry]) -> Result<BulkWriteOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut outcome = BulkWriteOutcome::default();

        {
            let mut exists_stmt =
                tx.prepare("SELECT id FROM catalog_entries WHERE entry_key = ?1")?;
            let mut upsert_stmt = tx.prepare(
                "INSERT INTO catalog_entries
                    (entry_key, title, duration_secs, year_code, venue_code, taper_code,
                     collection_key, show_identifier, position, file_ref, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(entry_key) DO UPDATE SET
                    title = excluded.title,
                    duration_secs = excluded.duration_secs,
                    year_code = excluded.year_code,
                    venue_code = excluded.venue_code,
                    taper_code = excluded.taper_code,
                    collection_key = excluded.collection_key,
                    show_identifier = excluded.show_identifier,
                    position = excluded.position,
                    file_ref = excluded.file_ref,
                    updated_at = excluded.updated_at",
            )?;

            for entry in entries {
                let existing: Option<i64> = exists_stmt
                    .query_row(params![entry.entry_key], |r| r.get(0))
                    .optional()?;

                upsert_stmt.execute(params![
                    entry.entry_key,
                    entry.title,
                    entry.duration_secs,
                    entry.year_code,
                    entry.venue_code,
                    entry.taper_code,
                    entry.collection_key,
                    entry.show_identifier,
                    entry.position as i64,
                    entry.file_ref,
                    entry.created_at,
                    Self::now(),
                ])?;

                match existing {
                    Some(_) => outcome.updated += 1,
                    None => {
                        outcome.created += 1;
                        outcome.new_entry_ids.push(tx.last_insert_rowid());
                    }
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    // =========================================================================
    // Attribute options
    // =========================================================================

    fn get_or_create_option(&self, attribute: AttributeKind, label: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        if let Some(id) = conn
            .query_row(
                "SELECT id FROM attribute_options WHERE attribute = ?1 AND label = ?2",
                params![attribute.as_str(), label],
                |r| r.get(0),
            )
            .optional()?
        {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO attribute_options (attribute, label) VALUES (?1, ?2)",
            params![attribute.as_str(), label],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_or_create_options_bulk(
        &self,
        attribute: AttributeKind,
        labels: &[String],
    ) -> Result<HashMap<String, i64>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut resolved = HashMap::with_capacity(labels.len());

        {
            let mut select_stmt =
                tx.prepare("SELECT id FROM attribute_options WHERE attribute = ?1 AND label = ?2")?;
            let mut insert_stmt =
                tx.prepare("INSERT INTO attribute_options (attribute, label) VALUES (?1, ?2)")?;

            for label in labels {
                if resolved.contains_key(label) {
                    continue;
                }
                let id: Option<i64> = select_stmt
                    .query_row(params![attribute.as_str(), label], |r| r.get(0))
                    .optional()?;
                let id = match id {
                    Some(id) => id,
                    None => {
                        insert_stmt.execute(params![attribute.as_str(), label])?;
                        tx.last_insert_rowid()
                    }
                };
                resolved.insert(label.clone(), id);
            }
        }

        tx.commit()?;
        Ok(resolved)
    }

    // =========================================================================
    // Classification nodes
    // =========================================================================

    fn get_node(&self, id: i64) -> Result<Option<ClassificationNode>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT * FROM classification_nodes WHERE id = ?1",
                params![id],
                row_to_node,
            )
            .optional()?)
    }

    fn find_child_node(
        &self,
        parent_id: i64,
        external_key: &str,
    ) -> Result<Option<ClassificationNode>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT * FROM classification_nodes WHERE parent_id = ?1 AND external_key = ?2",
                params![parent_id, external_key],
                row_to_node,
            )
            .optional()?)
    }

    fn create_node(
        &self,
        parent_id: Option<i64>,
        name: &str,
        external_key: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM classification_nodes
             WHERE parent_id IS ?1",
            params![parent_id],
            |r| r.get(0),
        )?;
        conn.execute(
            "INSERT INTO classification_nodes (parent_id, name, external_key, position)
             VALUES (?1, ?2, ?3, ?4)",
            params![parent_id, name, external_key, position],
        )
        .with_context(|| format!("Failed to create classification node {}", name))?;
        Ok(conn.last_insert_rowid())
    }

    fn bulk_assign(&self, entry_ids: &[i64], node_id: i64) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut assigned = 0usize;

        {
            // Append after the node's current maximum position
            let mut next_position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position), 0) + 1 FROM entry_classification WHERE node_id = ?1",
                params![node_id],
                |r| r.get(0),
            )?;

            let mut insert_stmt = tx.prepare(
                "INSERT INTO entry_classification (entry_id, node_id, position)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(entry_id, node_id) DO NOTHING",
            )?;

            for entry_id in entry_ids {
                let changed = insert_stmt.execute(params![entry_id, node_id, next_position])?;
                if changed > 0 {
                    assigned += 1;
                    next_position += 1;
                }
            }
        }

        tx.commit()?;
        Ok(assigned)
    }

    // =========================================================================
    // Canonical catalog
    // =========================================================================

    fn list_canonical_tracks(&self, artist_key: &str) -> Result<Vec<CanonicalTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title FROM canonical_tracks WHERE artist_key = ?1 ORDER BY id",
        )?;
        let mut tracks: Vec<CanonicalTrack> = stmt
            .query_map(params![artist_key], |row| {
                Ok(CanonicalTrack {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    aliases: Vec::new(),
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut alias_stmt = conn.prepare(
            "SELECT alias FROM track_aliases WHERE canonical_id = ?1 ORDER BY id",
        )?;
        for track in &mut tracks {
            track.aliases = alias_stmt
                .query_map(params![track.id], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
        }
        Ok(tracks)
    }

    fn add_canonical_track(
        &self,
        artist_key: &str,
        title: &str,
        aliases: &[String],
    ) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO canonical_tracks (artist_key, title, normalized) VALUES (?1, ?2, ?3)",
            params![artist_key, title, normalize(title)],
        )
        .with_context(|| format!("Failed to add canonical track {}", title))?;
        let track_id = tx.last_insert_rowid();
        for alias in aliases {
            tx.execute(
                "INSERT INTO track_aliases (canonical_id, alias, normalized) VALUES (?1, ?2, ?3)",
                params![track_id, alias, normalize(alias)],
            )?;
        }
        tx.commit()?;
        Ok(track_id)
    }

    // =========================================================================
    // Unmatched tracks
    // =========================================================================

    fn record_unmatched(
        &self,
        artist_key: &str,
        title: &str,
        suggestion: Option<&Suggestion>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO unmatched_tracks
                (artist_key, title, normalized, occurrences, last_seen_at,
                 suggestion_title, suggestion_algorithm, suggestion_confidence, status)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, 'pending')
             ON CONFLICT(artist_key, normalized) DO UPDATE SET
                occurrences = occurrences + 1,
                last_seen_at = excluded.last_seen_at,
                suggestion_title = excluded.suggestion_title,
                suggestion_algorithm = excluded.suggestion_algorithm,
                suggestion_confidence = excluded.suggestion_confidence",
            params![
                artist_key,
                title,
                normalize(title),
                Self::now(),
                suggestion.map(|s| s.title.as_str()),
                suggestion.map(|s| s.algorithm.as_str()),
                suggestion.map(|s| s.confidence as f64),
            ],
        )?;
        Ok(())
    }

    fn list_unmatched(
        &self,
        artist_key: &str,
        status: Option<UnmatchedStatus>,
    ) -> Result<Vec<UnmatchedTrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, artist_key, title, normalized, occurrences, last_seen_at,
                    suggestion_title, suggestion_algorithm, suggestion_confidence, status
             FROM unmatched_tracks
             WHERE artist_key = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY occurrences DESC, last_seen_at DESC",
        )?;
        let records = stmt
            .query_map(
                params![artist_key, status.map(|s| s.as_str())],
                |row| {
                    Ok(UnmatchedTrackRecord {
                        id: row.get(0)?,
                        artist_key: row.get(1)?,
                        title: row.get(2)?,
                        normalized: row.get(3)?,
                        occurrences: row.get(4)?,
                        last_seen_at: row.get(5)?,
                        suggestion_title: row.get(6)?,
                        suggestion_algorithm: row.get(7)?,
                        suggestion_confidence: row
                            .get::<_, Option<f64>>(8)?
                            .map(|c| c as f32),
                        status: UnmatchedStatus::from_str(&row.get::<_, String>(9)?)
                            .unwrap_or(UnmatchedStatus::Pending),
                    })
                },
            )?
            .collect::<rusqlite::Result<_>>()?;
        Ok(records)
    }

    fn resolve_unmatched(&self, id: i64, status: UnmatchedStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE unmatched_tracks SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        if changed == 0 {
            anyhow::bail!("No unmatched track with id {}", id);
        }
        Ok(())
    }

    // =========================================================================
    // Index maintenance
    // =========================================================================

    fn index_mode(&self) -> Result<IndexMode> {
        let conn = self.conn.lock().unwrap();
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM store_settings WHERE key = ?1",
                params![INDEX_MODE_SETTING],
                |r| r.get(0),
            )
            .optional()?;
        Ok(stored
            .and_then(|s| IndexMode::from_str(&s))
            .unwrap_or(IndexMode::Incremental))
    }

    fn set_index_mode(&self, mode: IndexMode) -> Result<IndexMode> {
        let previous = self.index_mode()?;
        if previous == mode {
            return Ok(previous);
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO store_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![INDEX_MODE_SETTING, mode.as_str()],
        )?;

        match mode {
            IndexMode::Deferred => {
                for (name, _) in SECONDARY_INDEXES {
                    conn.execute(&format!("DROP INDEX IF EXISTS {}", name), [])?;
                }
                info!("Index maintenance deferred: dropped secondary indexes");
            }
            IndexMode::Incremental => {
                for (_, create_sql) in SECONDARY_INDEXES {
                    conn.execute(create_sql, [])?;
                }
                info!("Index maintenance restored to incremental");
            }
        }
        Ok(previous)
    }

    fn reindex(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        for (_, create_sql) in SECONDARY_INDEXES {
            conn.execute(create_sql, [])?;
        }
        conn.execute_batch("ANALYZE;")?;
        info!("Rebuilt catalog secondary indexes");
        Ok(())
    }

    // =========================================================================
    // Ops surface
    // =========================================================================

    fn list_collections(&self, include_stats: bool) -> Result<Vec<CollectionSummary>> {
        let conn = self.conn.lock().unwrap();
        if !include_stats {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT collection_key FROM catalog_entries ORDER BY collection_key",
            )?;
            let summaries = stmt
                .query_map([], |row| {
                    Ok(CollectionSummary {
                        collection_key: row.get(0)?,
                        entry_count: None,
                        last_updated_at: None,
                    })
                })?
                .collect::<rusqlite::Result<_>>()?;
            return Ok(summaries);
        }

        let mut stmt = conn.prepare(
            "SELECT collection_key, COUNT(*), MAX(updated_at)
             FROM catalog_entries GROUP BY collection_key ORDER BY collection_key",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(CollectionSummary {
                    collection_key: row.get(0)?,
                    entry_count: Some(row.get::<_, i64>(1)? as usize),
                    last_updated_at: Some(row.get(2)?),
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(summaries)
    }

    fn cleanup_entries(
        &self,
        filter: &CleanupFilter,
        older_than_days: Option<u32>,
        dry_run: bool,
        batch_size: usize,
    ) -> Result<CleanupReport> {
        let cutoff = older_than_days
            .map(|days| Self::now() - days as i64 * 86_400)
            .unwrap_or(i64::MAX);
        let collection = filter.collection_key.as_deref();
        let prefix = filter.key_prefix.as_ref().map(|p| format!("{}%", p));

        let mut report = CleanupReport::default();
        {
            let conn = self.conn.lock().unwrap();
            report.found = conn.query_row(
                "SELECT COUNT(*) FROM catalog_entries
                 WHERE updated_at < ?1
                   AND (?2 IS NULL OR collection_key = ?2)
                   AND (?3 IS NULL OR entry_key LIKE ?3)",
                params![cutoff, collection, prefix],
                |r| r.get::<_, i64>(0),
            )? as usize;
        }

        if dry_run || report.found == 0 {
            return Ok(report);
        }

        // Delete in bounded batches so one huge cleanup never holds the
        // write lock for the whole pass.
        loop {
            let conn = self.conn.lock().unwrap();
            let deleted = match conn.execute(
                "DELETE FROM catalog_entries WHERE id IN (
                     SELECT id FROM catalog_entries
                     WHERE updated_at < ?1
                       AND (?2 IS NULL OR collection_key = ?2)
                       AND (?3 IS NULL OR entry_key LIKE ?3)
                     LIMIT ?4)",
                params![cutoff, collection, prefix, batch_size as i64],
            ) {
                Ok(n) => n,
                Err(e) => {
                    report.errors.push(e.to_string());
                    break;
                }
            };
            report.deleted += deleted;
            if deleted < batch_size {
                break;
            }
        }
        Ok(report)
    }
}
