//! Archive Metadata Source collaborator.
//!
//! The importer only depends on the narrow [`ArchiveSource`] trait; HTTP
//! specifics, retries and rate limiting live behind it in
//! [`HttpArchiveClient`].

mod client;
mod models;

pub use client::HttpArchiveClient;
pub use models::{Show, ShowTrack};

use anyhow::Result;
use async_trait::async_trait;

/// Read-only access to the external archive's metadata.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// List the item identifiers belonging to a collection, in the order the
    /// archive reports them.
    async fn list_collection_identifiers(
        &self,
        collection_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<String>>;

    /// Fetch one item's full metadata (tracks, venue, date, lineage, taper,
    /// streaming locations).
    async fn fetch_item_metadata(&self, identifier: &str) -> Result<Show>;

    /// Check whether the archive is reachable.
    async fn test_connectivity(&self) -> Result<bool>;

    /// Total number of items in a collection.
    async fn collection_count(&self, collection_id: &str) -> Result<usize>;
}
