use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::importer::ArtistNodeMapping;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub lock_dir: Option<String>,
    pub port: Option<u16>,
    pub archive_url: Option<String>,
    pub archive_timeout_sec: Option<u64>,

    // Feature configs
    pub matcher: Option<MatcherFileConfig>,
    pub importer: Option<ImporterFileConfig>,
    /// [artist_nodes.by_collection] and [artist_nodes.by_name] tables
    pub artist_nodes: Option<ArtistNodeMapping>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MatcherFileConfig {
    pub fuzzy_threshold: Option<f32>,
    pub fuzzy_candidate_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ImporterFileConfig {
    pub batch_size: Option<usize>,
    pub bulk_writes: Option<bool>,
    pub lock_stale_after_secs: Option<i64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
