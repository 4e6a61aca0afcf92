//! End-to-end tests for the job state machine and audit trail.

mod common;

use common::*;
use std::time::Duration;
use tapedeck_importer::importer::ImportOptions;
use tapedeck_importer::jobs::{ImportJob, JobStatus};
use tapedeck_importer::locking::LockService;

async fn wait_for_terminal(harness: &TestHarness, job_id: &str) -> ImportJob {
    for _ in 0..200 {
        let job = harness.job_service.status(job_id).unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} never reached a terminal state", job_id);
}

#[tokio::test]
async fn test_successful_job_completes_with_audit_row() {
    let harness = TestHarness::new(make_collection(3, 5));
    let job = harness
        .job_service
        .start_import(harness.options(), true)
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let finished = wait_for_terminal(&harness, &job.id).await;
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.processed, 3);
    assert_eq!(finished.created, 15);
    assert_eq!(finished.updated, 0);
    assert!(finished.errors.is_empty());
    assert!(finished.started_at.is_some());
    assert!(finished.completed_at.is_some());

    let runs = harness.job_service.runs(&job.id).unwrap();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, JobStatus::Completed);
    assert_eq!(run.items_successful, 3);
    assert_eq!(run.items_failed, 0);
    assert!(!run.correlation_id.is_empty());
    assert!(run.duration_ms >= 0);
    assert!(run.args.contains(TEST_COLLECTION));
}

#[tokio::test]
async fn test_show_level_errors_mark_job_partial() {
    let mut archive = MockArchive::new(make_collection(2, 2));
    archive.listed.push("vanished-item".to_string());
    let harness = TestHarness::with_archive(archive);

    let job = harness
        .job_service
        .start_import(harness.options(), false)
        .unwrap();
    let finished = wait_for_terminal(&harness, &job.id).await;

    assert_eq!(finished.status, JobStatus::Partial);
    assert_eq!(finished.processed, 2);
    assert_eq!(finished.errors.len(), 1);

    let runs = harness.job_service.runs(&job.id).unwrap();
    assert_eq!(runs[0].status, JobStatus::Partial);
    assert_eq!(runs[0].items_failed, 1);
}

#[tokio::test]
async fn test_unmapped_collection_fails_job() {
    let harness = TestHarness::new(make_collection(1, 1));
    let options = ImportOptions::new("Nobody", "nobody", "UnmappedCollection");

    let job = harness.job_service.start_import(options, false).unwrap();
    let finished = wait_for_terminal(&harness, &job.id).await;

    assert_eq!(finished.status, JobStatus::Failed);
    let message = finished.error_message.expect("fatal error recorded");
    assert!(message.contains("no classification node configured"));
}

#[tokio::test]
async fn test_lock_contention_fails_immediately() {
    let harness = TestHarness::new(make_collection(1, 1));
    let token = harness
        .locks
        .acquire("import", TEST_COLLECTION, Duration::ZERO)
        .unwrap();

    let job = harness
        .job_service
        .start_import(harness.options(), false)
        .unwrap();
    let finished = wait_for_terminal(&harness, &job.id).await;
    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished
        .error_message
        .unwrap()
        .contains("already running"));

    harness.locks.release(&token).unwrap();
}

#[tokio::test]
async fn test_cancellation_finishes_in_flight_show() {
    let mut archive = MockArchive::new(make_collection(20, 1));
    archive.fetch_delay_ms = 50;
    let harness = TestHarness::with_archive(archive);

    let job = harness
        .job_service
        .start_import(harness.options(), false)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    harness.job_service.cancel(&job.id).unwrap();

    let finished = wait_for_terminal(&harness, &job.id).await;
    assert_eq!(finished.status, JobStatus::Cancelled);
    assert!(finished.processed < 20);
}

#[tokio::test]
async fn test_cancelling_terminal_job_is_an_explicit_error() {
    let harness = TestHarness::new(make_collection(1, 1));
    let job = harness
        .job_service
        .start_import(harness.options(), false)
        .unwrap();
    wait_for_terminal(&harness, &job.id).await;

    let err = harness.job_service.cancel(&job.id).unwrap_err();
    assert!(err.to_string().contains("cannot cancel - status is completed"));
}

#[tokio::test]
async fn test_unknown_job_id_is_an_error() {
    let harness = TestHarness::new(vec![]);
    let err = harness.job_service.status("1700000000-zzzzzz").unwrap_err();
    assert!(err.to_string().contains("job not found"));
}
