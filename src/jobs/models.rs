//! Import job and audit-trail models.

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How many error messages a job or audit row keeps.
pub const MAX_RECORDED_ERRORS: usize = 10;

/// Lifecycle of one import job.
///
/// queued -> running -> {completed | partial | failed | cancelled}.
/// `partial` means row-level errors occurred; `failed` means a
/// collection-level fatal error aborted the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "partial" => Some(JobStatus::Partial),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// One queued/running/finished import, queryable by id while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub status: JobStatus,
    pub artist_name: String,
    pub collection_id: String,
    pub dry_run: bool,
    pub total: usize,
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub unmatched: usize,
    /// First [`MAX_RECORDED_ERRORS`] error messages.
    pub errors: Vec<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl ImportJob {
    pub fn new(artist_name: &str, collection_id: &str, dry_run: bool) -> Self {
        Self {
            id: generate_job_id(),
            status: JobStatus::Queued,
            artist_name: artist_name.to_string(),
            collection_id: collection_id.to_string(),
            dry_run,
            total: 0,
            processed: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            unmatched: 0,
            errors: Vec::new(),
            error_message: None,
            created_at: Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Time plus a random suffix; sortable and collision-safe enough for a
/// single-host job table.
pub fn generate_job_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{}-{}", Utc::now().timestamp(), suffix.to_lowercase())
}

/// Append-only audit record, one per execution.
///
/// Never mutated after `completed_at` is set; the correlation id ties the
/// row to the run's log lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    /// Row id, None until persisted.
    pub id: Option<i64>,
    pub correlation_id: String,
    pub job_id: String,
    pub command: String,
    /// Command arguments, serialized verbatim.
    pub args: String,
    pub artist_name: String,
    pub collection_id: String,
    pub status: JobStatus,
    pub started_at: i64,
    pub completed_at: i64,
    /// Shows processed, successes plus failures.
    pub items_total: usize,
    pub items_successful: usize,
    pub items_failed: usize,
    /// Track-level count, unlike the show-level items_* fields.
    pub tracks_skipped: usize,
    pub duration_ms: i64,
    /// Shows per second over the whole run.
    pub throughput: f64,
    /// Peak resident set of the process, in kilobytes, if measurable.
    pub peak_memory_kb: Option<i64>,
    /// First [`MAX_RECORDED_ERRORS`] error messages.
    pub errors: Vec<String>,
    /// Reference to the run's full log (file path or external id).
    pub log_ref: Option<String>,
}

pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Peak resident memory of this process in kilobytes, from the kernel's
/// VmHWM accounting. Unavailable off Linux.
pub fn peak_memory_kb() -> Option<i64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
        line.split_whitespace().nth(1)?.parse().ok()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
