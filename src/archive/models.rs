//! Data models for shows and tracks fetched from the archive.

use serde::{Deserialize, Serialize};

/// One recorded live performance, as reported by the archive.
///
/// Immutable once fetched; re-fetching the same identifier replaces the
/// whole value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    /// External archive identifier, unique across the archive.
    pub identifier: String,
    pub title: String,
    /// Performance date as reported by the archive (e.g. "1977-05-08").
    pub date: Option<String>,
    pub venue: Option<String>,
    pub taper: Option<String>,
    /// Recording lineage notes (source chain, transfer equipment).
    pub lineage: Option<String>,
    /// Streaming host serving this show's files.
    pub stream_host: Option<String>,
    /// Path prefix on the streaming host.
    pub stream_path: Option<String>,
    /// Tracks in archive-reported order.
    pub tracks: Vec<ShowTrack>,
}

impl Show {
    /// Four-digit year parsed from the show date, if present.
    pub fn year(&self) -> Option<String> {
        self.date
            .as_deref()
            .and_then(|d| d.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .map(|y| y.to_string())
    }
}

/// One recording within a show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowTrack {
    pub title: String,
    /// 1-based ordinal position within the show.
    pub position: u32,
    /// File name within the archive item (e.g. "gd77-05-08d1t01.flac").
    pub file_ref: String,
    /// Duration in seconds, if the archive reported one.
    pub duration_secs: Option<f64>,
    pub md5: Option<String>,
    pub size_bytes: Option<u64>,
}
