//! Job execution: one spawned task per import run, with cooperative
//! cancellation and an audit row written at the end.

use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};

use super::models::{generate_correlation_id, peak_memory_kb, ImportJob, ImportRun, JobStatus};
use super::store::JobStore;
use crate::importer::{
    BulkTrackImporter, ImportError, ImportOptions, ImportResult, RowTrackImporter, ShowImporter,
    TrackWriter,
};

/// Starts, tracks and cancels import jobs.
///
/// Each run executes on its own tokio task; the service only keeps the
/// per-job cancellation flag, all other run state is task-local.
pub struct JobService {
    importer: Arc<ShowImporter>,
    jobs: Arc<dyn JobStore>,
    cancel_flags: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
}

impl JobService {
    pub fn new(importer: Arc<ShowImporter>, jobs: Arc<dyn JobStore>) -> Self {
        Self {
            importer,
            jobs,
            cancel_flags: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue an import and spawn its run. Returns the queued job snapshot.
    pub fn start_import(&self, options: ImportOptions, bulk: bool) -> Result<ImportJob> {
        let job = ImportJob::new(
            &options.artist_name,
            &options.collection_id,
            options.dry_run,
        );
        self.jobs.create_job(&job)?;

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .unwrap()
            .insert(job.id.clone(), cancel.clone());

        let importer = self.importer.clone();
        let jobs = self.jobs.clone();
        let flags = self.cancel_flags.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            run_job(importer, jobs, &job_id, options, bulk, cancel).await;
            flags.lock().unwrap().remove(&job_id);
        });

        Ok(job)
    }

    /// Request cancellation of a queued or running job. The in-flight show
    /// finishes before the run halts.
    pub fn cancel(&self, job_id: &str) -> Result<ImportJob> {
        let job = self.jobs.cancel_job(job_id)?;
        if let Some(flag) = self.cancel_flags.lock().unwrap().get(job_id) {
            flag.store(true, Ordering::Relaxed);
        }
        info!("Cancellation requested for job {}", job_id);
        Ok(job)
    }

    pub fn status(&self, job_id: &str) -> Result<ImportJob> {
        self.jobs.get_job(job_id)
    }

    pub fn runs(&self, job_id: &str) -> Result<Vec<ImportRun>> {
        self.jobs.list_runs(job_id)
    }
}

async fn run_job(
    importer: Arc<ShowImporter>,
    jobs: Arc<dyn JobStore>,
    job_id: &str,
    options: ImportOptions,
    bulk: bool,
    cancel: Arc<AtomicBool>,
) {
    let correlation_id = generate_correlation_id();
    info!(
        "Starting import job {} (correlation {}) for {} / {}",
        job_id, correlation_id, options.artist_name, options.collection_id
    );
    if let Err(e) = jobs.mark_running(job_id) {
        error!("Failed to mark job {} running: {}", job_id, e);
        return;
    }

    let started_at = Utc::now().timestamp();
    let clock = Instant::now();

    let progress_jobs = jobs.clone();
    let progress_id = job_id.to_string();
    let progress = move |update: crate::importer::ProgressUpdate| {
        if let Err(e) = progress_jobs.update_progress(&progress_id, update.current, update.total) {
            warn!("Failed to persist progress for {}: {}", progress_id, e);
        }
    };

    let mut writer: Box<dyn TrackWriter> = if bulk {
        Box::new(BulkTrackImporter::new())
    } else {
        Box::new(RowTrackImporter::new())
    };

    let outcome = importer
        .import_collection(&options, writer.as_mut(), &cancel, Some(&progress))
        .await;

    let (status, result, error_message) = match outcome {
        Ok(result) => {
            let status = if cancel.load(Ordering::Relaxed) {
                JobStatus::Cancelled
            } else if result.has_errors() {
                JobStatus::Partial
            } else {
                JobStatus::Completed
            };
            (status, result, None)
        }
        Err(e) => {
            match &e {
                ImportError::Lock(_) => warn!("Job {} hit lock contention: {}", job_id, e),
                _ => error!("Job {} failed: {}", job_id, e),
            }
            let (result, message) = failure_result(e);
            (JobStatus::Failed, result, Some(message))
        }
    };

    if let Err(e) = jobs.finish_job(job_id, status, &result, error_message.as_deref()) {
        error!("Failed to finish job {}: {}", job_id, e);
    }

    let completed_at = Utc::now().timestamp();
    let duration_ms = clock.elapsed().as_millis() as i64;
    let throughput = if duration_ms > 0 {
        result.shows_processed as f64 * 1000.0 / duration_ms as f64
    } else {
        0.0
    };
    let run = ImportRun {
        id: None,
        correlation_id,
        job_id: job_id.to_string(),
        command: "import-collection".to_string(),
        args: serde_json::json!({
            "collection": options.collection_id,
            "artist": options.artist_name,
            "limit": options.limit,
            "offset": options.offset,
            "batch_size": options.batch_size,
            "dry_run": options.dry_run,
            "bulk": bulk,
        })
        .to_string(),
        artist_name: options.artist_name.clone(),
        collection_id: options.collection_id.clone(),
        status,
        started_at,
        completed_at,
        items_total: result.shows_processed + result.errors.len(),
        items_successful: result.shows_processed,
        items_failed: result.errors.len(),
        tracks_skipped: result.tracks_skipped,
        duration_ms,
        throughput,
        peak_memory_kb: peak_memory_kb(),
        errors: error_message
            .iter()
            .cloned()
            .chain(
                result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.identifier, e.message)),
            )
            .collect(),
        log_ref: None,
    };
    if let Err(e) = jobs.record_run(&run) {
        error!("Failed to record audit row for job {}: {}", job_id, e);
    }
    info!(
        "Job {} finished with status {} in {}ms",
        job_id,
        status.as_str(),
        duration_ms
    );
}

/// Counts and message for a failed run. A finalization failure keeps the
/// counts accumulated before the fatal point; other fatal errors happen
/// before any work is done.
fn failure_result(error: ImportError) -> (ImportResult, String) {
    let message = error.to_string();
    let result = match error {
        ImportError::Finalize { partial, .. } => *partial,
        _ => ImportResult::default(),
    };
    (result, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_keeps_counts_from_finalization_errors() {
        let partial = ImportResult {
            shows_processed: 7,
            tracks_created: 40,
            tracks_updated: 2,
            ..ImportResult::default()
        };
        let error = ImportError::Finalize {
            message: "reindex failed".to_string(),
            partial: Box::new(partial),
        };

        let (result, message) = failure_result(error);
        assert_eq!(result.shows_processed, 7);
        assert_eq!(result.tracks_created, 40);
        assert_eq!(result.tracks_updated, 2);
        assert!(message.contains("reindex failed"));
    }

    #[test]
    fn test_failure_before_any_work_reports_zero_counts() {
        let error = ImportError::FatalCollection("listing failed".to_string());
        let (result, message) = failure_result(error);
        assert_eq!(result.shows_processed, 0);
        assert_eq!(result.tracks_created, 0);
        assert!(message.contains("listing failed"));
    }
}
