//! Ops HTTP surface.
//!
//! Endpoints for starting/tracking/cancelling import jobs and for the
//! catalog maintenance operations the admin tooling consumes.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::archive::ArchiveSource;
use crate::catalog_store::{CatalogStore, CleanupFilter, CleanupReport, CollectionSummary};
use crate::importer::{validate_identifier, ImportOptions, DEFAULT_BATCH_SIZE};
use crate::jobs::{ImportJob, ImportRun, JobService};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StartImportBody {
    pub artist_name: String,
    /// Key the canonical catalog is filed under; defaults to the
    /// collection id lowercased.
    #[serde(default)]
    pub artist_key: Option<String>,
    pub collection_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub bulk: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StartImportResponse {
    pub job_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job: ImportJob,
}

#[derive(Debug, Serialize)]
pub struct JobRunsResponse {
    pub runs: Vec<ImportRun>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionsQuery {
    #[serde(default)]
    pub include_stats: bool,
}

#[derive(Debug, Serialize)]
pub struct CollectionsResponse {
    pub collections: Vec<CollectionSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupBody {
    #[serde(default)]
    pub collection_key: Option<String>,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub older_than_days: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DeleteEntryResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// =============================================================================
// State
// =============================================================================

#[derive(Clone)]
pub struct ServerState {
    pub catalog_store: Arc<dyn CatalogStore>,
    pub archive: Arc<dyn ArchiveSource>,
    pub job_service: Arc<JobService>,
    pub default_batch_size: usize,
    pub default_bulk_writes: bool,
    pub start_time: Instant,
    pub hash: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/imports - queue a collection import
async fn start_import(
    State(state): State<ServerState>,
    Json(body): Json<StartImportBody>,
) -> impl IntoResponse {
    if let Err(e) = validate_identifier(&body.collection_id) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    if body.artist_name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "artist name cannot be empty");
    }

    let artist_key = body
        .artist_key
        .unwrap_or_else(|| body.collection_id.to_lowercase());
    let mut options = ImportOptions::new(&body.artist_name, &artist_key, &body.collection_id);
    options.limit = body.limit;
    options.offset = body.offset;
    options.batch_size = body.batch_size.unwrap_or(state.default_batch_size).max(1);
    options.dry_run = body.dry_run;

    let bulk = body.bulk.unwrap_or(state.default_bulk_writes);
    match state.job_service.start_import(options, bulk) {
        Ok(job) => {
            info!("Queued import job {} for {}", job.id, body.collection_id);
            (
                StatusCode::ACCEPTED,
                Json(StartImportResponse {
                    job_id: job.id,
                    status: job.status.as_str().to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/jobs/{id} - job snapshot, mid-run progress included
async fn get_job_status(
    State(state): State<ServerState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.job_service.status(&job_id) {
        Ok(job) => Json(JobStatusResponse { job }).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

/// POST /api/jobs/{id}/cancel
async fn cancel_job(
    State(state): State<ServerState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.job_service.cancel(&job_id) {
        Ok(job) => Json(JobStatusResponse { job }).into_response(),
        Err(e) => {
            let message = e.to_string();
            let status = if message.contains("job not found") {
                StatusCode::NOT_FOUND
            } else {
                // Terminal-state cancellation is a conflict, not a crash
                StatusCode::CONFLICT
            };
            error_response(status, message)
        }
    }
}

/// GET /api/jobs/{id}/runs - audit history, newest first
async fn get_job_runs(
    State(state): State<ServerState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.job_service.runs(&job_id) {
        Ok(runs) => Json(JobRunsResponse { runs }).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/collections?include_stats=true
async fn list_collections(
    State(state): State<ServerState>,
    Query(query): Query<CollectionsQuery>,
) -> impl IntoResponse {
    match state.catalog_store.list_collections(query.include_stats) {
        Ok(collections) => Json(CollectionsResponse { collections }).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// DELETE /api/entries/{key}
async fn delete_entry(
    State(state): State<ServerState>,
    Path(entry_key): Path<String>,
) -> impl IntoResponse {
    if entry_key.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "entry key cannot be empty");
    }
    match state.catalog_store.delete_entry(&entry_key) {
        Ok(true) => Json(DeleteEntryResponse { deleted: true }).into_response(),
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            format!("no entry with key {}", entry_key),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/entries/cleanup
async fn cleanup_entries(
    State(state): State<ServerState>,
    Json(body): Json<CleanupBody>,
) -> impl IntoResponse {
    let filter = CleanupFilter {
        collection_key: body.collection_key,
        key_prefix: body.key_prefix,
    };
    let batch_size = body.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
    match state.catalog_store.cleanup_entries(
        &filter,
        body.older_than_days,
        body.dry_run,
        batch_size,
    ) {
        Ok(report) => {
            if !report.errors.is_empty() {
                warn!("Cleanup finished with {} errors", report.errors.len());
            }
            Json::<CleanupReport>(report).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    archive: &'static str,
    uptime: String,
    hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

/// GET /api/health
async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let reachable = state.archive.test_connectivity().await.unwrap_or(false);
    Json(HealthResponse {
        status: "ok",
        archive: if reachable { "reachable" } else { "unreachable" },
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    })
}

// =============================================================================
// Router / server loop
// =============================================================================

pub fn make_router(state: ServerState) -> Router {
    Router::new()
        .route("/api/imports", post(start_import))
        .route("/api/jobs/{id}", get(get_job_status))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        .route("/api/jobs/{id}/runs", get(get_job_runs))
        .route("/api/collections", get(list_collections))
        .route("/api/entries/{key}", delete(delete_entry))
        .route("/api/entries/cleanup", post(cleanup_entries))
        .route("/api/health", get(health))
        .with_state(state)
}

pub async fn run_server(state: ServerState, port: u16) -> Result<()> {
    let router = make_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Ops server listening on port {}", port);
    axum::serve(listener, router).await?;
    Ok(())
}
