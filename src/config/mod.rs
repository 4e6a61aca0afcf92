mod file_config;

pub use file_config::{FileConfig, ImporterFileConfig, MatcherFileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::importer::{ArtistNodeMapping, DEFAULT_BATCH_SIZE};
use crate::matcher::MatcherConfig;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub lock_dir: Option<PathBuf>,
    pub port: u16,
    pub archive_url: Option<String>,
    pub archive_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub port: u16,
    pub archive_url: String,
    pub archive_timeout_sec: u64,

    // Importer settings (with defaults)
    pub batch_size: usize,
    pub bulk_writes: bool,
    pub lock_stale_after_secs: i64,
    pub matcher: MatcherConfig,
    pub artist_nodes: ArtistNodeMapping,
}

pub const DEFAULT_ARCHIVE_URL: &str = "https://archive.org";
pub const DEFAULT_LOCK_STALE_AFTER_SECS: i64 = 6 * 60 * 60;

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let lock_dir = file
            .lock_dir
            .map(PathBuf::from)
            .or_else(|| cli.lock_dir.clone())
            .unwrap_or_else(|| db_dir.join("locks"));

        let port = file.port.unwrap_or(cli.port);
        let archive_url = file
            .archive_url
            .or_else(|| cli.archive_url.clone())
            .unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string());
        let archive_timeout_sec = file.archive_timeout_sec.unwrap_or(cli.archive_timeout_sec);

        let matcher_file = file.matcher.unwrap_or_default();
        let defaults = MatcherConfig::default();
        let matcher = MatcherConfig {
            fuzzy_threshold: matcher_file.fuzzy_threshold.unwrap_or(defaults.fuzzy_threshold),
            fuzzy_candidate_limit: matcher_file
                .fuzzy_candidate_limit
                .unwrap_or(defaults.fuzzy_candidate_limit),
        };

        let importer_file = file.importer.unwrap_or_default();
        let batch_size = importer_file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("importer.batch_size must be at least 1");
        }

        Ok(Self {
            db_dir,
            lock_dir,
            port,
            archive_url,
            archive_timeout_sec,
            batch_size,
            bulk_writes: importer_file.bulk_writes.unwrap_or(true),
            lock_stale_after_secs: importer_file
                .lock_stale_after_secs
                .unwrap_or(DEFAULT_LOCK_STALE_AFTER_SECS),
            matcher,
            artist_nodes: file.artist_nodes.unwrap_or_default(),
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }
}
