//! Per-run cache of (attribute, label) -> option code resolutions.

use anyhow::Result;
use std::collections::HashMap;

use crate::catalog_store::{AttributeKind, CatalogStore};

/// Memoizes attribute-option lookups for the lifetime of one import batch.
///
/// Owned by a single run, cleared at batch boundaries. A miss triggers
/// exactly one creation in the store; after that the cache is authoritative
/// until [`clear`](Self::clear).
#[derive(Default)]
pub struct AttributeOptionCache {
    cache: HashMap<(AttributeKind, String), i64>,
}

impl AttributeOptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one label, hitting the store only on a miss.
    pub fn get_or_create(
        &mut self,
        store: &dyn CatalogStore,
        attribute: AttributeKind,
        label: &str,
    ) -> Result<i64> {
        if let Some(&code) = self.cache.get(&(attribute, label.to_string())) {
            return Ok(code);
        }
        let code = store.get_or_create_option(attribute, label)?;
        self.cache.insert((attribute, label.to_string()), code);
        Ok(code)
    }

    /// Resolve many labels of one attribute in a single grouped store call,
    /// priming the cache with the results.
    pub fn prefetch(
        &mut self,
        store: &dyn CatalogStore,
        attribute: AttributeKind,
        labels: &[String],
    ) -> Result<()> {
        let missing: Vec<String> = labels
            .iter()
            .filter(|l| !self.cache.contains_key(&(attribute, (*l).clone())))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        for (label, code) in store.get_or_create_options_bulk(attribute, &missing)? {
            self.cache.insert((attribute, label), code);
        }
        Ok(())
    }

    /// Drop everything. Called at batch boundaries to bound memory.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
