//! SQLite persistence for import jobs and the append-only audit trail.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use super::models::{ImportJob, ImportRun, JobStatus, MAX_RECORDED_ERRORS};
use crate::importer::ImportResult;

const JOBS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS import_jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    artist_name TEXT NOT NULL,
    collection_id TEXT NOT NULL,
    dry_run INTEGER NOT NULL DEFAULT 0,
    total INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    unmatched INTEGER NOT NULL DEFAULT 0,
    errors TEXT NOT NULL DEFAULT '[]',
    error_message TEXT,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER
);

CREATE TABLE IF NOT EXISTS import_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    correlation_id TEXT NOT NULL,
    job_id TEXT NOT NULL,
    command TEXT NOT NULL,
    args TEXT NOT NULL,
    artist_name TEXT NOT NULL,
    collection_id TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    completed_at INTEGER NOT NULL,
    items_total INTEGER NOT NULL,
    items_successful INTEGER NOT NULL,
    items_failed INTEGER NOT NULL,
    tracks_skipped INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    throughput REAL NOT NULL,
    peak_memory_kb INTEGER,
    errors TEXT NOT NULL DEFAULT '[]',
    log_ref TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_job ON import_runs(job_id);
"#;

const JOBS_SCHEMA_VERSION: i32 = 2;

// v1 -> v2: the skipped column counts tracks, not shows; rename it to say so.
const JOBS_MIGRATION_V2_SQL: &str =
    "ALTER TABLE import_runs RENAME COLUMN items_skipped TO tracks_skipped;";

/// Storage for import jobs and their audit records.
pub trait JobStore: Send + Sync {
    fn create_job(&self, job: &ImportJob) -> Result<()>;

    /// Get a job by id; an unknown id is an error, never a default record.
    fn get_job(&self, id: &str) -> Result<ImportJob>;

    fn mark_running(&self, id: &str) -> Result<()>;

    /// Mid-run progress, safe to call after every processed identifier.
    fn update_progress(&self, id: &str, processed: usize, total: usize) -> Result<()>;

    /// Move a job to a terminal state with its final counts.
    fn finish_job(
        &self,
        id: &str,
        status: JobStatus,
        result: &ImportResult,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Request cancellation. Fails with an explicit error when the job is
    /// already terminal.
    fn cancel_job(&self, id: &str) -> Result<ImportJob>;

    /// Append one audit row. Returns the row id.
    fn record_run(&self, run: &ImportRun) -> Result<i64>;

    /// Audit rows for one job, newest first.
    fn list_runs(&self, job_id: &str) -> Result<Vec<ImportRun>>;
}

/// SQLite-backed [`JobStore`].
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open jobs database {:?}", db_path.as_ref()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::init(conn)?;
        info!("Opened jobs database at {:?}", db_path.as_ref());
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let version: i32 = conn.query_row("PRAGMA user_version;", [], |r| r.get(0))?;
        if version == 0 {
            conn.execute_batch(JOBS_SCHEMA_SQL)
                .context("Failed to create jobs schema")?;
            conn.pragma_update(None, "user_version", JOBS_SCHEMA_VERSION)?;
        } else if version == 1 {
            conn.execute_batch(JOBS_MIGRATION_V2_SQL)
                .context("Failed to migrate jobs schema to v2")?;
            conn.pragma_update(None, "user_version", JOBS_SCHEMA_VERSION)?;
            info!("Migrated jobs database to schema v{}", JOBS_SCHEMA_VERSION);
        } else if version > JOBS_SCHEMA_VERSION {
            bail!(
                "Jobs database version {} is too new (max supported: {})",
                version,
                JOBS_SCHEMA_VERSION
            );
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ImportJob> {
    let status: String = row.get("status")?;
    let errors: String = row.get("errors")?;
    Ok(ImportJob {
        id: row.get("id")?,
        status: JobStatus::from_str(&status).unwrap_or(JobStatus::Failed),
        artist_name: row.get("artist_name")?,
        collection_id: row.get("collection_id")?,
        dry_run: row.get::<_, i64>("dry_run")? != 0,
        total: row.get::<_, i64>("total")? as usize,
        processed: row.get::<_, i64>("processed")? as usize,
        created: row.get::<_, i64>("created")? as usize,
        updated: row.get::<_, i64>("updated")? as usize,
        skipped: row.get::<_, i64>("skipped")? as usize,
        unmatched: row.get::<_, i64>("unmatched")? as usize,
        errors: serde_json::from_str(&errors).unwrap_or_default(),
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
    })
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<ImportRun> {
    let status: String = row.get("status")?;
    let errors: String = row.get("errors")?;
    Ok(ImportRun {
        id: Some(row.get("id")?),
        correlation_id: row.get("correlation_id")?,
        job_id: row.get("job_id")?,
        command: row.get("command")?,
        args: row.get("args")?,
        artist_name: row.get("artist_name")?,
        collection_id: row.get("collection_id")?,
        status: JobStatus::from_str(&status).unwrap_or(JobStatus::Failed),
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        items_total: row.get::<_, i64>("items_total")? as usize,
        items_successful: row.get::<_, i64>("items_successful")? as usize,
        items_failed: row.get::<_, i64>("items_failed")? as usize,
        tracks_skipped: row.get::<_, i64>("tracks_skipped")? as usize,
        duration_ms: row.get("duration_ms")?,
        throughput: row.get("throughput")?,
        peak_memory_kb: row.get("peak_memory_kb")?,
        errors: serde_json::from_str(&errors).unwrap_or_default(),
        log_ref: row.get("log_ref")?,
    })
}

impl JobStore for SqliteJobStore {
    fn create_job(&self, job: &ImportJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO import_jobs
                (id, status, artist_name, collection_id, dry_run, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job.id,
                job.status.as_str(),
                job.artist_name,
                job.collection_id,
                job.dry_run as i64,
                job.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<ImportJob> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM import_jobs WHERE id = ?1",
            params![id],
            row_to_job,
        )
        .optional()?
        .ok_or_else(|| anyhow::anyhow!("job not found: {}", id))
    }

    fn mark_running(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE import_jobs SET status = ?2, started_at = ?3
             WHERE id = ?1 AND status = ?4",
            params![
                id,
                JobStatus::Running.as_str(),
                chrono::Utc::now().timestamp(),
                JobStatus::Queued.as_str(),
            ],
        )?;
        Ok(())
    }

    fn update_progress(&self, id: &str, processed: usize, total: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE import_jobs SET processed = ?2, total = ?3 WHERE id = ?1",
            params![id, processed as i64, total as i64],
        )?;
        Ok(())
    }

    fn finish_job(
        &self,
        id: &str,
        status: JobStatus,
        result: &ImportResult,
        error_message: Option<&str>,
    ) -> Result<()> {
        let errors: Vec<String> = result
            .errors
            .iter()
            .take(MAX_RECORDED_ERRORS)
            .map(|e| format!("{}: {}", e.identifier, e.message))
            .collect();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE import_jobs SET
                status = ?2, processed = ?3, created = ?4, updated = ?5,
                skipped = ?6, unmatched = ?7, errors = ?8, error_message = ?9,
                completed_at = ?10
             WHERE id = ?1",
            params![
                id,
                status.as_str(),
                result.shows_processed as i64,
                result.tracks_created as i64,
                result.tracks_updated as i64,
                result.tracks_skipped as i64,
                result.tracks_unmatched as i64,
                serde_json::to_string(&errors)?,
                error_message,
                chrono::Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    fn cancel_job(&self, id: &str) -> Result<ImportJob> {
        let job = self.get_job(id)?;
        if job.status.is_terminal() {
            bail!("cannot cancel - status is {}", job.status.as_str());
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE import_jobs SET status = ?2, completed_at = ?3 WHERE id = ?1",
            params![
                id,
                JobStatus::Cancelled.as_str(),
                chrono::Utc::now().timestamp(),
            ],
        )?;
        drop(conn);
        self.get_job(id)
    }

    fn record_run(&self, run: &ImportRun) -> Result<i64> {
        let errors: Vec<&String> = run.errors.iter().take(MAX_RECORDED_ERRORS).collect();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO import_runs
                (correlation_id, job_id, command, args, artist_name, collection_id,
                 status, started_at, completed_at, items_total, items_successful,
                 items_failed, tracks_skipped, duration_ms, throughput,
                 peak_memory_kb, errors, log_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18)",
            params![
                run.correlation_id,
                run.job_id,
                run.command,
                run.args,
                run.artist_name,
                run.collection_id,
                run.status.as_str(),
                run.started_at,
                run.completed_at,
                run.items_total as i64,
                run.items_successful as i64,
                run.items_failed as i64,
                run.tracks_skipped as i64,
                run.duration_ms,
                run.throughput,
                run.peak_memory_kb,
                serde_json::to_string(&errors)?,
                run.log_ref,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_runs(&self, job_id: &str) -> Result<Vec<ImportRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM import_runs WHERE job_id = ?1 ORDER BY id DESC")?;
        let runs = stmt
            .query_map(params![job_id], row_to_run)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::ShowError;
    use crate::jobs::models::generate_correlation_id;

    fn store() -> SqliteJobStore {
        SqliteJobStore::in_memory().unwrap()
    }

    fn sample_result() -> ImportResult {
        ImportResult {
            shows_processed: 3,
            tracks_created: 15,
            tracks_updated: 0,
            tracks_skipped: 1,
            tracks_unmatched: 2,
            batches_flushed: 1,
            errors: vec![ShowError {
                identifier: "bad-show".to_string(),
                message: "item not found".to_string(),
            }],
        }
    }

    #[test]
    fn test_job_lifecycle() {
        let store = store();
        let job = ImportJob::new("Grateful Dead", "GratefulDead", false);
        store.create_job(&job).unwrap();

        store.mark_running(&job.id).unwrap();
        store.update_progress(&job.id, 2, 3).unwrap();

        let snapshot = store.get_job(&job.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Running);
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.total, 3);
        assert!(snapshot.started_at.is_some());

        store
            .finish_job(&job.id, JobStatus::Partial, &sample_result(), None)
            .unwrap();
        let finished = store.get_job(&job.id).unwrap();
        assert_eq!(finished.status, JobStatus::Partial);
        assert_eq!(finished.created, 15);
        assert_eq!(finished.errors, vec!["bad-show: item not found"]);
        assert!(finished.completed_at.is_some());
    }

    #[test]
    fn test_unknown_job_is_an_error() {
        let err = store().get_job("nope").unwrap_err();
        assert!(err.to_string().contains("job not found"));
    }

    #[test]
    fn test_cancel_transitions() {
        let store = store();
        let job = ImportJob::new("Grateful Dead", "GratefulDead", false);
        store.create_job(&job).unwrap();

        let cancelled = store.cancel_job(&job.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        // Cancelling a terminal job fails with an explicit message
        let err = store.cancel_job(&job.id).unwrap_err();
        assert!(err.to_string().contains("cannot cancel"));
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn test_audit_rows_append_only() {
        let store = store();
        let job = ImportJob::new("Grateful Dead", "GratefulDead", false);
        store.create_job(&job).unwrap();

        let run = ImportRun {
            id: None,
            correlation_id: generate_correlation_id(),
            job_id: job.id.clone(),
            command: "import".to_string(),
            args: "{\"collection\":\"GratefulDead\"}".to_string(),
            artist_name: job.artist_name.clone(),
            collection_id: job.collection_id.clone(),
            status: JobStatus::Completed,
            started_at: 1_700_000_000,
            completed_at: 1_700_000_060,
            items_total: 3,
            items_successful: 3,
            items_failed: 0,
            tracks_skipped: 0,
            duration_ms: 60_000,
            throughput: 0.05,
            peak_memory_kb: Some(4096),
            errors: vec![],
            log_ref: None,
        };
        store.record_run(&run).unwrap();
        let mut second = run.clone();
        second.correlation_id = generate_correlation_id();
        store.record_run(&second).unwrap();

        let runs = store.list_runs(&job.id).unwrap();
        assert_eq!(runs.len(), 2);
        // Newest first
        assert_eq!(runs[0].correlation_id, second.correlation_id);
        assert_ne!(runs[0].correlation_id, runs[1].correlation_id);
    }

    #[test]
    fn test_v1_database_column_is_migrated() {
        // Recreate a v1 database, where the skipped column carried the
        // generic items_ prefix
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(JOBS_SCHEMA_SQL).unwrap();
        conn.execute_batch(
            "ALTER TABLE import_runs RENAME COLUMN tracks_skipped TO items_skipped;",
        )
        .unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        let store = SqliteJobStore::init(conn).unwrap();
        let job = ImportJob::new("Grateful Dead", "GratefulDead", false);
        store.create_job(&job).unwrap();
        let run = ImportRun {
            id: None,
            correlation_id: generate_correlation_id(),
            job_id: job.id.clone(),
            command: "import".to_string(),
            args: "{}".to_string(),
            artist_name: job.artist_name.clone(),
            collection_id: job.collection_id.clone(),
            status: JobStatus::Completed,
            started_at: 1_700_000_000,
            completed_at: 1_700_000_060,
            items_total: 1,
            items_successful: 1,
            items_failed: 0,
            tracks_skipped: 4,
            duration_ms: 60_000,
            throughput: 0.02,
            peak_memory_kb: None,
            errors: vec![],
            log_ref: None,
        };
        store.record_run(&run).unwrap();
        assert_eq!(store.list_runs(&job.id).unwrap()[0].tracks_skipped, 4);
    }

    #[test]
    fn test_error_list_truncated_to_first_ten() {
        let store = store();
        let job = ImportJob::new("Grateful Dead", "GratefulDead", false);
        store.create_job(&job).unwrap();

        let mut result = sample_result();
        result.errors = (0..25)
            .map(|i| ShowError {
                identifier: format!("show-{}", i),
                message: "boom".to_string(),
            })
            .collect();
        store
            .finish_job(&job.id, JobStatus::Partial, &result, None)
            .unwrap();
        assert_eq!(store.get_job(&job.id).unwrap().errors.len(), 10);
    }
}
