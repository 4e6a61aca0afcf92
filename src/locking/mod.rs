//! Exclusive per-(operation, entity) locks shared across processes.
//!
//! Locks serialize the same operation on the same entity; different
//! operations or different entities never contend. Acquisition is
//! non-blocking by default so a second import of the same artist fails
//! immediately with [`LockError::Contended`] instead of queueing.

use chrono::Utc;
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Default age after which a held lock is considered abandoned.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 6 * 60 * 60;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{operation} already running for {entity}")]
    Contended { operation: String, entity: String },

    #[error("Lock for {operation}/{entity} is not held by this token")]
    NotOwner { operation: String, entity: String },

    #[error("Lock error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Proof of ownership of a held lock.
///
/// The random token is checked on release so a process can never clear a
/// lock that was reclaimed and re-acquired by someone else.
#[derive(Debug, Clone)]
pub struct LockToken {
    pub operation: String,
    pub entity: String,
    pub token: String,
}

/// Metadata persisted inside the lock resource.
#[derive(Debug, Serialize, Deserialize)]
struct LockMetadata {
    operation: String,
    entity: String,
    pid: u32,
    host: String,
    acquired_at: i64,
    token: String,
}

/// Exclusive, non-blocking mutual exclusion for (operation, entity) pairs.
pub trait LockService: Send + Sync {
    /// Acquire the lock for (operation, entity).
    ///
    /// With a zero timeout the call fails immediately on contention;
    /// otherwise it polls until the timeout elapses.
    fn acquire(
        &self,
        operation: &str,
        entity: &str,
        timeout: Duration,
    ) -> Result<LockToken, LockError>;

    /// Release a previously acquired lock. Fails if the stored token does
    /// not match (the lock was reclaimed or already released).
    fn release(&self, token: &LockToken) -> Result<(), LockError>;
}

/// File-backed lock service: one JSON metadata file per (operation, entity).
pub struct FileLockService {
    lock_dir: PathBuf,
    stale_after: chrono::Duration,
}

impl FileLockService {
    pub fn new<P: AsRef<Path>>(lock_dir: P) -> Result<Self, LockError> {
        Self::with_stale_after(lock_dir, DEFAULT_STALE_AFTER_SECS)
    }

    pub fn with_stale_after<P: AsRef<Path>>(
        lock_dir: P,
        stale_after_secs: i64,
    ) -> Result<Self, LockError> {
        std::fs::create_dir_all(&lock_dir)?;
        Ok(Self {
            lock_dir: lock_dir.as_ref().to_path_buf(),
            stale_after: chrono::Duration::seconds(stale_after_secs),
        })
    }

    fn lock_path(&self, operation: &str, entity: &str) -> PathBuf {
        let sanitize = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>()
        };
        self.lock_dir
            .join(format!("{}.{}.lock", sanitize(operation), sanitize(entity)))
    }

    /// Best-effort staleness check on an existing lock file.
    ///
    /// A lock is stale when its holder process is gone (Linux only) or when
    /// its age exceeds the configured threshold. Unreadable metadata is
    /// treated as stale.
    fn is_stale(&self, path: &Path) -> bool {
        let metadata: LockMetadata = match std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
        {
            Some(m) => m,
            None => return true,
        };

        let age = Utc::now().timestamp() - metadata.acquired_at;
        if age > self.stale_after.num_seconds() {
            return true;
        }

        #[cfg(target_os = "linux")]
        {
            // Two hosts that both failed to resolve a name must never look
            // like the same host, or a live remote lock could be reclaimed
            let host = hostname();
            let same_host = host != UNKNOWN_HOST && host == metadata.host;
            if same_host && !Path::new(&format!("/proc/{}", metadata.pid)).exists() {
                return true;
            }
        }

        false
    }

    fn try_acquire(&self, operation: &str, entity: &str) -> Result<Option<LockToken>, LockError> {
        let path = self.lock_path(operation, entity);

        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let metadata = LockMetadata {
            operation: operation.to_string(),
            entity: entity.to_string(),
            pid: std::process::id(),
            host: hostname(),
            acquired_at: Utc::now().timestamp(),
            token: token.clone(),
        };

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(serde_json::to_string_pretty(&metadata)?.as_bytes())?;
                file.sync_all()?;
                Ok(Some(LockToken {
                    operation: operation.to_string(),
                    entity: entity.to_string(),
                    token,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if self.is_stale(&path) {
                    warn!(
                        "Reclaiming stale lock for {}/{} at {:?}",
                        operation, entity, path
                    );
                    // Another process may reclaim concurrently; losing the
                    // race just means the next attempt sees contention.
                    let _ = std::fs::remove_file(&path);
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl LockService for FileLockService {
    fn acquire(
        &self,
        operation: &str,
        entity: &str,
        timeout: Duration,
    ) -> Result<LockToken, LockError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(token) = self.try_acquire(operation, entity)? {
                info!("Acquired lock {}/{}", operation, entity);
                return Ok(token);
            }
            if Instant::now() >= deadline {
                return Err(LockError::Contended {
                    operation: operation.to_string(),
                    entity: entity.to_string(),
                });
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn release(&self, token: &LockToken) -> Result<(), LockError> {
        let path = self.lock_path(&token.operation, &token.entity);

        let stored: Option<LockMetadata> = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());

        match stored {
            Some(metadata) if metadata.token == token.token => {
                std::fs::remove_file(&path)?;
                info!("Released lock {}/{}", token.operation, token.entity);
                Ok(())
            }
            _ => Err(LockError::NotOwner {
                operation: token.operation.clone(),
                entity: token.entity.clone(),
            }),
        }
    }
}

const UNKNOWN_HOST: &str = "unknown";

fn hostname() -> String {
    #[cfg(target_os = "linux")]
    if let Ok(raw) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let name = raw.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| UNKNOWN_HOST.to_string())
}
