//! End-to-end tests for the ops HTTP surface.

mod common;

use common::*;
use serde_json::{json, Value};
use std::time::Duration;
use tapedeck_importer::catalog_store::CatalogStore;

async fn wait_for_terminal(server: &TestServer, job_id: &str) -> Value {
    let client = reqwest::Client::new();
    for _ in 0..200 {
        let body: Value = client
            .get(format!("{}/api/jobs/{}", server.base_url, job_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let status = body["job"]["status"].as_str().unwrap().to_string();
        if ["completed", "partial", "failed", "cancelled"].contains(&status.as_str()) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} never reached a terminal state", job_id);
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::spawn(TestHarness::new(vec![])).await;
    let body: Value = reqwest::get(format!("{}/api/health", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["archive"], "reachable");
    assert_eq!(body["hash"], "test");
}

#[tokio::test]
async fn test_import_roundtrip_over_http() {
    let server = TestServer::spawn(TestHarness::new(make_collection(3, 5))).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/imports", server.base_url))
        .json(&json!({
            "artist_name": TEST_ARTIST,
            "artist_key": TEST_ARTIST_KEY,
            "collection_id": TEST_COLLECTION,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let finished = wait_for_terminal(&server, &job_id).await;
    assert_eq!(finished["job"]["status"], "completed");
    assert_eq!(finished["job"]["created"], 15);

    let runs: Value = client
        .get(format!("{}/api/jobs/{}/runs", server.base_url, job_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(runs["runs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_collection_rejected_before_io() {
    let server = TestServer::spawn(TestHarness::new(vec![])).await;
    let response = reqwest::Client::new()
        .post(format!("{}/api/imports", server.base_url))
        .json(&json!({
            "artist_name": TEST_ARTIST,
            "collection_id": "has spaces;and semicolons",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_cancel_terminal_job_conflicts() {
    let server = TestServer::spawn(TestHarness::new(make_collection(1, 1))).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/api/imports", server.base_url))
        .json(&json!({
            "artist_name": TEST_ARTIST,
            "artist_key": TEST_ARTIST_KEY,
            "collection_id": TEST_COLLECTION,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();
    wait_for_terminal(&server, &job_id).await;

    let response = client
        .post(format!("{}/api/jobs/{}/cancel", server.base_url, job_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("cannot cancel"));
}

#[tokio::test]
async fn test_unknown_job_returns_not_found() {
    let server = TestServer::spawn(TestHarness::new(vec![])).await;
    let response = reqwest::get(format!("{}/api/jobs/1700000000-zzzzzz", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_collections_listing_with_stats() {
    let harness = TestHarness::new(make_collection(2, 3));
    harness.run_import(&harness.options(), false).await;
    let server = TestServer::spawn(harness).await;

    let body: Value = reqwest::get(format!(
        "{}/api/collections?include_stats=true",
        server.base_url
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    let collections = body["collections"].as_array().unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0]["collection_key"], TEST_COLLECTION);
    assert_eq!(collections[0]["entry_count"], 6);
}

#[tokio::test]
async fn test_delete_entry_validation_and_result() {
    let harness = TestHarness::new(make_collection(1, 1));
    harness.run_import(&harness.options(), false).await;
    let server = TestServer::spawn(harness).await;
    let client = reqwest::Client::new();

    // Whitespace-only key is rejected with the explicit message
    let response = client
        .delete(format!("{}/api/entries/%20", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "entry key cannot be empty");

    let response = client
        .delete(format!(
            "{}/api/entries/test1972-03-01-s01t01",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(server.harness.store.entries_count().unwrap(), 0);

    // Second delete finds nothing
    let response = client
        .delete(format!(
            "{}/api/entries/test1972-03-01-s01t01",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_cleanup_endpoint_dry_run_then_delete() {
    let harness = TestHarness::new(make_collection(2, 2));
    harness.run_import(&harness.options(), false).await;
    let server = TestServer::spawn(harness).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/api/entries/cleanup", server.base_url))
        .json(&json!({"key_prefix": "test1972-03-01", "dry_run": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["found"], 2);
    assert_eq!(body["deleted"], 0);
    assert_eq!(server.harness.store.entries_count().unwrap(), 4);

    let body: Value = client
        .post(format!("{}/api/entries/cleanup", server.base_url))
        .json(&json!({"key_prefix": "test1972-03-01"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["deleted"], 2);
    assert_eq!(server.harness.store.entries_count().unwrap(), 2);
}
