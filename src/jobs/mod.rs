//! Import jobs: state machine, execution and the append-only audit trail.

mod models;
mod service;
mod store;

pub use models::{
    generate_correlation_id, generate_job_id, peak_memory_kb, ImportJob, ImportRun, JobStatus,
    MAX_RECORDED_ERRORS,
};
pub use service::JobService;
pub use store::{JobStore, SqliteJobStore};
