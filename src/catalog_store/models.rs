//! Data models for the catalog store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Longest entry key stored verbatim; longer keys get a digest suffix.
const MAX_KEY_LEN: usize = 64;
/// Hex chars of the sha256 digest appended to truncated keys.
const KEY_DIGEST_LEN: usize = 8;

/// The durable record created for a matched/imported track.
///
/// `entry_key` is the idempotency anchor: re-importing the same file of the
/// same show always resolves to the same entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Row id, None until the entry has been written.
    pub id: Option<i64>,
    pub entry_key: String,
    pub title: String,
    pub duration_secs: Option<f64>,
    /// Attribute option codes (legacy lookup-table compatibility).
    pub year_code: Option<i64>,
    pub venue_code: Option<i64>,
    pub taper_code: Option<i64>,
    pub collection_key: String,
    pub show_identifier: String,
    /// 1-based position within the show.
    pub position: u32,
    pub file_ref: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The fixed attribute set entries carry as option codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Year,
    Venue,
    Taper,
    Collection,
    Rating,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Year => "year",
            AttributeKind::Venue => "venue",
            AttributeKind::Taper => "taper",
            AttributeKind::Collection => "collection",
            AttributeKind::Rating => "rating",
        }
    }
}

/// A grouping node (artist or show) entries are linked to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    /// External identifier for show nodes (the archive item id).
    pub external_key: Option<String>,
    pub position: i64,
}

/// Index-maintenance mode of the store.
///
/// `Deferred` drops the secondary indexes so bulk writes skip per-row index
/// maintenance; an explicit [`reindex`](super::CatalogStore::reindex)
/// rebuilds them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    Incremental,
    Deferred,
}

impl IndexMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMode::Incremental => "incremental",
            IndexMode::Deferred => "deferred",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "incremental" => Some(IndexMode::Incremental),
            "deferred" => Some(IndexMode::Deferred),
            _ => None,
        }
    }
}

/// Resolution state of an unmatched track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedStatus {
    Pending,
    Mapped,
    Ignored,
}

impl UnmatchedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedStatus::Pending => "pending",
            UnmatchedStatus::Mapped => "mapped",
            UnmatchedStatus::Ignored => "ignored",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UnmatchedStatus::Pending),
            "mapped" => Some(UnmatchedStatus::Mapped),
            "ignored" => Some(UnmatchedStatus::Ignored),
            _ => None,
        }
    }
}

/// A track that failed every matching tier, kept for manual resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedTrackRecord {
    pub id: i64,
    pub artist_key: String,
    pub title: String,
    pub normalized: String,
    pub occurrences: i64,
    pub last_seen_at: i64,
    pub suggestion_title: Option<String>,
    pub suggestion_algorithm: Option<String>,
    pub suggestion_confidence: Option<f32>,
    pub status: UnmatchedStatus,
}

/// Result of one bulk write against the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct BulkWriteOutcome {
    pub created: usize,
    pub updated: usize,
    pub new_entry_ids: Vec<i64>,
}

/// Per-collection summary for the ops surface.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub collection_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<i64>,
}

/// Which entries a cleanup pass considers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanupFilter {
    pub collection_key: Option<String>,
    pub key_prefix: Option<String>,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub found: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

/// Compute the generated key for a (show identifier, file reference) pair.
///
/// Pure and deterministic: lowercased, extension stripped, runs of
/// non-alphanumerics collapsed to `-`. Keys over 64 chars keep a prefix
/// plus a sha256 suffix so they stay unique and bounded. Returns `None`
/// when either part yields nothing usable.
pub fn generate_entry_key(show_identifier: &str, file_ref: &str) -> Option<String> {
    let stem = file_ref
        .rsplit('/')
        .next()
        .map(|name| name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name))
        .unwrap_or(file_ref);

    let slug = |s: &str| -> String {
        let mut out = String::with_capacity(s.len());
        let mut dash_pending = false;
        for c in s.chars() {
            if c.is_ascii_alphanumeric() {
                if dash_pending && !out.is_empty() {
                    out.push('-');
                }
                dash_pending = false;
                out.push(c.to_ascii_lowercase());
            } else {
                dash_pending = true;
            }
        }
        out
    };

    let show_part = slug(show_identifier);
    let file_part = slug(stem);
    if show_part.is_empty() || file_part.is_empty() {
        return None;
    }

    let key = format!("{}-{}", show_part, file_part);
    if key.len() <= MAX_KEY_LEN {
        return Some(key);
    }

    let digest = Sha256::digest(key.as_bytes());
    let suffix: String = digest
        .iter()
        .take(KEY_DIGEST_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect();
    let keep = MAX_KEY_LEN - KEY_DIGEST_LEN - 1;
    Some(format!("{}-{}", &key[..keep], suffix))
}
