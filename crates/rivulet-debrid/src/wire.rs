//! Payload shapes of the upstream debrid REST API.
//!
//! These mirror the wire contract exactly; mapping into the domain model
//! happens in the synchronization crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Upstream status label for a torrent whose transfer has finished.
pub const STATUS_DOWNLOADED: &str = "downloaded";

/// One torrent as returned by `GET /torrents`.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentSummary {
    /// Stable upstream identifier.
    pub id: String,
    /// Display file name of the torrent.
    pub filename: String,
    /// Info hash.
    pub hash: String,
    /// Total payload size in bytes.
    pub bytes: u64,
    /// Upstream transfer status label.
    pub status: String,
    /// Transfer progress percentage (0-100).
    pub progress: f64,
    /// When the torrent was added upstream.
    pub added: DateTime<Utc>,
    /// When the transfer finished, if it has.
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
}

impl TorrentSummary {
    /// Whether the torrent is in its terminal ready state and eligible for
    /// the mirrored library.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == STATUS_DOWNLOADED && self.progress >= 100.0
    }
}

/// Full torrent detail as returned by `GET /torrents/info/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentDetail {
    /// Stable upstream identifier.
    pub id: String,
    /// Display file name of the torrent.
    pub filename: String,
    /// Info hash.
    pub hash: String,
    /// Total payload size in bytes.
    pub bytes: u64,
    /// Upstream transfer status label.
    pub status: String,
    /// Transfer progress percentage (0-100).
    pub progress: f64,
    /// When the torrent was added upstream.
    pub added: DateTime<Utc>,
    /// When the transfer finished, if it has.
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
    /// All files contained in the torrent payload.
    #[serde(default)]
    pub files: Vec<DetailFile>,
    /// Restricted links, parallel to the selected entries of `files`.
    #[serde(default)]
    pub links: Vec<String>,
}

/// One file within a torrent detail response.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailFile {
    /// Upstream file identifier.
    pub id: u64,
    /// Path of the file within the torrent payload.
    pub path: String,
    /// File size in bytes.
    pub bytes: u64,
    /// Selection flag; `1` when the file is selected for download.
    pub selected: u8,
}

impl DetailFile {
    /// Whether the file is selected for download upstream.
    #[must_use]
    pub const fn is_selected(&self) -> bool {
        self.selected == 1
    }
}

/// Response of `POST /unrestrict/link`.
#[derive(Debug, Clone, Deserialize)]
pub struct UnrestrictedLink {
    /// Time-limited direct download URL.
    pub download: String,
}

/// Account profile as returned by `GET /user`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    /// Account identifier.
    pub id: i64,
    /// Account user name.
    pub username: String,
    /// Fidelity points balance.
    #[serde(default)]
    pub points: i64,
    /// Account type label (e.g. `premium`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Seconds of premium time remaining.
    #[serde(default)]
    pub premium: i64,
    /// Premium expiration timestamp.
    pub expiration: DateTime<Utc>,
}

/// Per-host traffic counters as returned by `GET /traffic`.
pub type TrafficInfo = BTreeMap<String, HostTraffic>;

/// Traffic counters for a single host.
#[derive(Debug, Clone, Deserialize)]
pub struct HostTraffic {
    /// Bytes already served for the host.
    #[serde(default)]
    pub bytes: Option<u64>,
    /// Remaining quota in bytes, when the host is metered.
    #[serde(default)]
    pub left: Option<u64>,
    /// Quota ceiling, when the host is metered.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Quota accounting scheme label.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_requires_downloaded_status_and_full_progress() {
        let mut summary: TorrentSummary = serde_json::from_value(serde_json::json!({
            "id": "ABC",
            "filename": "Example.Release",
            "hash": "deadbeef",
            "bytes": 1024,
            "status": "downloaded",
            "progress": 100,
            "added": "2024-05-01T10:00:00Z",
            "ended": "2024-05-01T11:00:00Z"
        }))
        .expect("summary should decode");
        assert!(summary.is_ready());

        summary.progress = 99.5;
        assert!(!summary.is_ready());

        summary.progress = 100.0;
        summary.status = "downloading".to_string();
        assert!(!summary.is_ready());
    }

    #[test]
    fn detail_decodes_files_and_links() {
        let detail: TorrentDetail = serde_json::from_value(serde_json::json!({
            "id": "ABC",
            "filename": "Example.Release",
            "hash": "deadbeef",
            "bytes": 2048,
            "status": "downloaded",
            "progress": 100,
            "added": "2024-05-01T10:00:00Z",
            "files": [
                {"id": 1, "path": "/Example.Release/example.mkv", "bytes": 2000, "selected": 1},
                {"id": 2, "path": "/Example.Release/sample.mkv", "bytes": 48, "selected": 0}
            ],
            "links": ["https://host.example/restricted/1"]
        }))
        .expect("detail should decode");
        assert_eq!(detail.files.len(), 2);
        assert!(detail.files[0].is_selected());
        assert!(!detail.files[1].is_selected());
        assert_eq!(detail.links.len(), 1);
    }
}
