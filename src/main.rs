use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tapedeck_importer::archive::{ArchiveSource, HttpArchiveClient};
use tapedeck_importer::catalog_store::{CatalogStore, SqliteCatalogStore};
use tapedeck_importer::config::{AppConfig, CliConfig, FileConfig};
use tapedeck_importer::importer::{
    BulkTrackImporter, ImportOptions, RowTrackImporter, ShowImporter, TrackWriter,
};
use tapedeck_importer::jobs::{JobService, JobStatus, SqliteJobStore};
use tapedeck_importer::locking::FileLockService;
use tapedeck_importer::server::{run_server, ServerState};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version)]
struct CliArgs {
    /// Directory holding the catalog and jobs databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory for lock files. Defaults to <db_dir>/locks.
    #[clap(long, value_parser = parse_path)]
    pub lock_dir: Option<PathBuf>,

    /// Path to a TOML config file. File values override CLI values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port the ops server listens on.
    #[clap(short, long, default_value_t = 8090)]
    pub port: u16,

    /// Base URL of the archive metadata API.
    #[clap(long)]
    pub archive_url: Option<String>,

    /// Timeout in seconds for archive requests.
    #[clap(long, default_value_t = 30)]
    pub archive_timeout_sec: u64,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ops HTTP server.
    Serve,
    /// Import one collection and wait for completion.
    Import {
        /// Artist name, used to resolve the configured artist node.
        artist: String,
        /// Archive collection identifier.
        collection: String,
        /// Key the canonical catalog is filed under. Defaults to the
        /// collection identifier lowercased.
        #[clap(long)]
        artist_key: Option<String>,
        /// Import at most this many shows.
        #[clap(long)]
        limit: Option<usize>,
        /// Skip this many shows.
        #[clap(long)]
        offset: Option<usize>,
        /// Shows per batch before caches are evicted.
        #[clap(long)]
        batch_size: Option<usize>,
        /// Count would-create/would-update without writing anything.
        #[clap(long)]
        dry_run: bool,
        /// Use the row-at-a-time writer instead of the bulk path.
        #[clap(long)]
        row_writes: bool,
    },
    /// Import one show by its archive identifier.
    ImportShow {
        /// Artist name, used to resolve the configured artist node.
        artist: String,
        /// Collection the show belongs to.
        collection: String,
        /// Archive identifier of the show.
        identifier: String,
        /// Key the canonical catalog is filed under. Defaults to the
        /// collection identifier lowercased.
        #[clap(long)]
        artist_key: Option<String>,
        /// Count would-create/would-update without writing anything.
        #[clap(long)]
        dry_run: bool,
        /// Use the row-at-a-time writer instead of the bulk path.
        #[clap(long)]
        row_writes: bool,
    },
    /// Verify archive connectivity and database access.
    Check,
}

struct Services {
    config: AppConfig,
    catalog: Arc<SqliteCatalogStore>,
    source: Arc<HttpArchiveClient>,
    importer: Arc<ShowImporter>,
    job_service: Arc<JobService>,
}

fn build_services(config: AppConfig) -> Result<Services> {
    let catalog = Arc::new(SqliteCatalogStore::new(config.catalog_db_path())?);
    let jobs = Arc::new(SqliteJobStore::new(config.jobs_db_path())?);
    let locks = Arc::new(FileLockService::with_stale_after(
        &config.lock_dir,
        config.lock_stale_after_secs,
    )?);
    let source = Arc::new(HttpArchiveClient::new(
        &config.archive_url,
        config.archive_timeout_sec,
    )?);
    let importer = Arc::new(ShowImporter::new(
        source.clone(),
        catalog.clone(),
        locks,
        config.artist_nodes.clone(),
        config.matcher.clone(),
    ));
    let job_service = Arc::new(JobService::new(importer.clone(), jobs));
    Ok(Services {
        config,
        catalog,
        source,
        importer,
        job_service,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let hash = env!("GIT_HASH").to_string();
    info!("tapedeck-importer starting (build {})", hash);

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        lock_dir: cli_args.lock_dir.clone(),
        port: cli_args.port,
        archive_url: cli_args.archive_url.clone(),
        archive_timeout_sec: cli_args.archive_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;
    let services = build_services(config)?;

    match cli_args.command {
        Command::Serve => {
            let state = ServerState {
                catalog_store: services.catalog.clone(),
                archive: services.source.clone(),
                job_service: services.job_service.clone(),
                default_batch_size: services.config.batch_size,
                default_bulk_writes: services.config.bulk_writes,
                start_time: Instant::now(),
                hash,
            };
            run_server(state, services.config.port).await
        }
        Command::Import {
            artist,
            collection,
            artist_key,
            limit,
            offset,
            batch_size,
            dry_run,
            row_writes,
        } => {
            let artist_key = artist_key.unwrap_or_else(|| collection.to_lowercase());
            let mut options = ImportOptions::new(&artist, &artist_key, &collection);
            options.limit = limit;
            options.offset = offset;
            options.batch_size = batch_size.unwrap_or(services.config.batch_size);
            options.dry_run = dry_run;

            // Goes through the job service so the run gets a job record
            // and an audit row like server-triggered imports.
            let job = services.job_service.start_import(options, !row_writes)?;
            info!("Started job {}", job.id);

            let mut last_reported = 0;
            let job = loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let snapshot = services.job_service.status(&job.id)?;
                if snapshot.processed != last_reported && snapshot.total > 0 {
                    info!("[{}/{}] shows processed", snapshot.processed, snapshot.total);
                    last_reported = snapshot.processed;
                }
                if snapshot.status.is_terminal() {
                    break snapshot;
                }
            };

            info!(
                "{}: {} shows, {} created, {} updated, {} skipped, {} unmatched",
                job.status.as_str(),
                job.processed,
                job.created,
                job.updated,
                job.skipped,
                job.unmatched
            );
            for error in &job.errors {
                info!("  failed {}", error);
            }
            match job.status {
                JobStatus::Completed => Ok(()),
                JobStatus::Partial => std::process::exit(2),
                _ => {
                    if let Some(message) = job.error_message {
                        anyhow::bail!("import failed: {}", message);
                    }
                    std::process::exit(1);
                }
            }
        }
        Command::ImportShow {
            artist,
            collection,
            identifier,
            artist_key,
            dry_run,
            row_writes,
        } => {
            let artist_key = artist_key.unwrap_or_else(|| collection.to_lowercase());
            let mut options = ImportOptions::new(&artist, &artist_key, &collection);
            options.dry_run = dry_run;

            let mut writer: Box<dyn TrackWriter> = if row_writes {
                Box::new(RowTrackImporter::new())
            } else {
                Box::new(BulkTrackImporter::new())
            };
            let result = services
                .importer
                .import_show(&identifier, &options, writer.as_mut())
                .await?;
            info!(
                "{}: {} created, {} updated, {} skipped, {} unmatched",
                identifier,
                result.tracks_created,
                result.tracks_updated,
                result.tracks_skipped,
                result.tracks_unmatched
            );
            Ok(())
        }
        Command::Check => {
            let reachable = services.source.test_connectivity().await.unwrap_or(false);
            let entries = services.catalog.entries_count()?;
            info!(
                "archive: {}, catalog: {} entries",
                if reachable { "reachable" } else { "UNREACHABLE" },
                entries
            );
            if !reachable {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
