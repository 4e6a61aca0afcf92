//! Artist/show classification-node resolution for an import run.

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::archive::Show;
use crate::catalog_store::CatalogStore;

/// Configured routing of collections to artist nodes.
///
/// Artist nodes are never auto-created: an import for an unmapped
/// collection fails up front instead of silently growing the tree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistNodeMapping {
    /// collection identifier -> artist node id
    #[serde(default)]
    pub by_collection: HashMap<String, i64>,
    /// artist name -> artist node id
    #[serde(default)]
    pub by_name: HashMap<String, i64>,
}

impl ArtistNodeMapping {
    /// Resolve the artist node for a run. Collection mapping wins over the
    /// name mapping. Verifies the node actually exists in the store.
    pub fn resolve(
        &self,
        store: &dyn CatalogStore,
        collection_id: &str,
        artist_name: &str,
    ) -> Result<Option<i64>> {
        let candidate = self
            .by_collection
            .get(collection_id)
            .or_else(|| self.by_name.get(artist_name));
        let Some(&node_id) = candidate else {
            return Ok(None);
        };
        if store.get_node(node_id)?.is_none() {
            debug!("Configured artist node {} does not exist", node_id);
            return Ok(None);
        }
        Ok(Some(node_id))
    }
}

/// Per-run cache of show nodes under one artist node.
///
/// Show nodes are keyed by the archive identifier and created lazily on
/// first encounter. Cleared at batch boundaries with the other run caches.
pub struct ShowNodeCache {
    artist_node_id: i64,
    nodes: HashMap<String, i64>,
}

impl ShowNodeCache {
    pub fn new(artist_node_id: i64) -> Self {
        Self {
            artist_node_id,
            nodes: HashMap::new(),
        }
    }

    pub fn artist_node_id(&self) -> i64 {
        self.artist_node_id
    }

    /// Find or create the show node for `show` under the artist node.
    pub fn get_or_create(&mut self, store: &dyn CatalogStore, show: &Show) -> Result<i64> {
        if let Some(&id) = self.nodes.get(&show.identifier) {
            return Ok(id);
        }
        let id = match store.find_child_node(self.artist_node_id, &show.identifier)? {
            Some(node) => node.id,
            None => store.create_node(
                Some(self.artist_node_id),
                &show.title,
                Some(&show.identifier),
            )?,
        };
        self.nodes.insert(show.identifier.clone(), id);
        Ok(id)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
