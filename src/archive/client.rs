//! HTTP client for the external archive's metadata API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::models::{Show, ShowTrack};
use super::ArchiveSource;

/// File formats the archive serves that we treat as playable tracks.
const AUDIO_FORMATS: &[&str] = &["Flac", "VBR MP3", "Ogg Vorbis", "Shorten", "64Kbps MP3"];

/// HTTP client for communicating with the archive.
pub struct HttpArchiveClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArchiveClient {
    /// Create a new archive client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the archive (e.g. "https://archive.org")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: &str, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        // Ensure base_url doesn't have a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    async fn search(
        &self,
        collection_id: &str,
        rows: usize,
        start: usize,
    ) -> Result<SearchResponse> {
        let url = format!("{}/advancedsearch.php", self.base_url);
        let query = format!("collection:{}", collection_id);
        let rows = rows.to_string();
        let start = start.to_string();
        let params = [
            ("q", query.as_str()),
            ("fl[]", "identifier"),
            ("sort[]", "date asc"),
            ("rows", rows.as_str()),
            ("start", start.as_str()),
            ("output", "json"),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to query archive search")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Archive search for collection {} failed: status {}",
                collection_id,
                response.status()
            );
        }

        response
            .json()
            .await
            .context("Failed to parse archive search response")
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveClient {
    async fn list_collection_identifiers(
        &self,
        collection_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<String>> {
        // The search endpoint pages; request at most one page beyond the
        // caller's limit and trim locally.
        let offset = offset.unwrap_or(0);
        let rows = limit.unwrap_or(10_000);

        let response = self.search(collection_id, rows, offset).await?;
        let identifiers: Vec<String> = response
            .response
            .docs
            .into_iter()
            .map(|d| d.identifier)
            .collect();

        debug!(
            "Listed {} identifiers for collection {} (offset {})",
            identifiers.len(),
            collection_id,
            offset
        );
        Ok(identifiers)
    }

    async fn fetch_item_metadata(&self, identifier: &str) -> Result<Show> {
        let url = format!("{}/metadata/{}", self.base_url, identifier);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch item {}", identifier))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Failed to fetch item {}: status {}",
                identifier,
                response.status()
            );
        }

        let item: ItemResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse metadata for {}", identifier))?;

        Ok(item.into_show(identifier))
    }

    async fn test_connectivity(&self) -> Result<bool> {
        let url = format!("{}/metadata/", self.base_url);
        match self.client.head(&url).send().await {
            Ok(response) => Ok(!response.status().is_server_error()),
            Err(_) => Ok(false),
        }
    }

    async fn collection_count(&self, collection_id: &str) -> Result<usize> {
        // rows=0 still returns the total hit count.
        let response = self.search(collection_id, 0, 0).await?;
        Ok(response.response.num_found)
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(rename = "numFound", default)]
    num_found: usize,
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    #[serde(default)]
    metadata: ItemMetadata,
    #[serde(default)]
    files: Vec<ItemFile>,
    #[serde(default)]
    server: Option<String>,
    #[serde(default, rename = "dir")]
    directory: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    taper: Option<String>,
    #[serde(default)]
    lineage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemFile {
    name: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    track: Option<String>,
    #[serde(default)]
    length: Option<String>,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

impl ItemResponse {
    fn into_show(self, identifier: &str) -> Show {
        let mut tracks: Vec<ShowTrack> = self
            .files
            .into_iter()
            .filter(|f| {
                f.format
                    .as_deref()
                    .map(|fmt| AUDIO_FORMATS.contains(&fmt))
                    .unwrap_or(false)
            })
            .map(|f| {
                let position = f
                    .track
                    .as_deref()
                    .and_then(|t| t.split('/').next())
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0);
                ShowTrack {
                    title: f.title.unwrap_or_else(|| f.name.clone()),
                    position,
                    duration_secs: f.length.as_deref().and_then(parse_length),
                    md5: f.md5,
                    size_bytes: f.size.and_then(|s| s.parse().ok()),
                    file_ref: f.name,
                }
            })
            .collect();

        // Archive file listings are not ordered; restore track order, falling
        // back to file name when the track number is absent.
        tracks.sort_by(|a, b| a.position.cmp(&b.position).then(a.file_ref.cmp(&b.file_ref)));
        for (index, track) in tracks.iter_mut().enumerate() {
            if track.position == 0 {
                track.position = index as u32 + 1;
            }
        }

        Show {
            identifier: identifier.to_string(),
            title: self
                .metadata
                .title
                .unwrap_or_else(|| identifier.to_string()),
            date: self.metadata.date,
            venue: self.metadata.venue,
            taper: self.metadata.taper,
            lineage: self.metadata.lineage,
            stream_host: self.server,
            stream_path: self.directory,
            tracks,
        }
    }
}

/// Parse a track length reported either as seconds ("123.45") or "mm:ss".
fn parse_length(raw: &str) -> Option<f64> {
    if let Ok(secs) = raw.parse::<f64>() {
        return Some(secs);
    }
    let mut parts = raw.rsplit(':');
    let secs: f64 = parts.next()?.parse().ok()?;
    let mins: f64 = parts.next()?.parse().ok()?;
    let hours: f64 = parts.next().and_then(|h| h.parse().ok()).unwrap_or(0.0);
    Some(hours * 3600.0 + mins * 60.0 + secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length("123.45"), Some(123.45));
        assert_eq!(parse_length("4:20"), Some(260.0));
        assert_eq!(parse_length("1:02:03"), Some(3723.0));
        assert_eq!(parse_length("nope"), None);
    }

    #[test]
    fn test_into_show_orders_and_filters_tracks() {
        let item = ItemResponse {
            metadata: ItemMetadata {
                title: Some("Barton Hall".to_string()),
                date: Some("1977-05-08".to_string()),
                ..Default::default()
            },
            files: vec![
                ItemFile {
                    name: "d1t02.flac".to_string(),
                    format: Some("Flac".to_string()),
                    title: Some("They Love Each Other".to_string()),
                    track: Some("2".to_string()),
                    length: Some("7:04".to_string()),
                    md5: None,
                    size: None,
                },
                ItemFile {
                    name: "info.txt".to_string(),
                    format: Some("Text".to_string()),
                    title: None,
                    track: None,
                    length: None,
                    md5: None,
                    size: None,
                },
                ItemFile {
                    name: "d1t01.flac".to_string(),
                    format: Some("Flac".to_string()),
                    title: Some("New Minglewood Blues".to_string()),
                    track: Some("1/12".to_string()),
                    length: Some("271.2".to_string()),
                    md5: None,
                    size: Some("31457280".to_string()),
                },
            ],
            server: Some("ia800502.us.archive.org".to_string()),
            directory: Some("/1/items/gd77".to_string()),
        };

        let show = item.into_show("gd1977-05-08");
        assert_eq!(show.tracks.len(), 2);
        assert_eq!(show.tracks[0].title, "New Minglewood Blues");
        assert_eq!(show.tracks[0].position, 1);
        assert_eq!(show.tracks[0].size_bytes, Some(31457280));
        assert_eq!(show.tracks[1].title, "They Love Each Other");
        assert_eq!(show.tracks[1].duration_secs, Some(424.0));
    }

    #[test]
    fn test_into_show_assigns_positions_when_untracked() {
        let item = ItemResponse {
            metadata: ItemMetadata::default(),
            files: vec![
                ItemFile {
                    name: "b.flac".to_string(),
                    format: Some("Flac".to_string()),
                    title: None,
                    track: None,
                    length: None,
                    md5: None,
                    size: None,
                },
                ItemFile {
                    name: "a.flac".to_string(),
                    format: Some("Flac".to_string()),
                    title: None,
                    track: None,
                    length: None,
                    md5: None,
                    size: None,
                },
            ],
            server: None,
            directory: None,
        };

        let show = item.into_show("x");
        assert_eq!(show.tracks[0].file_ref, "a.flac");
        assert_eq!(show.tracks[0].position, 1);
        assert_eq!(show.tracks[1].position, 2);
    }
}
