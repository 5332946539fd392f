//! Domain types for the mirrored debrid library and its synchronization state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directory index committed on every library refresh: directory name mapped
/// to the access keys stored under it.
pub type DirectoryIndex = BTreeMap<String, BTreeSet<String>>;

/// A torrent mirrored from the upstream library.
///
/// List refreshes produce records without file detail; a later detail fetch
/// fills `selected_files` and stamps `cache_timestamp`. A record is
/// "detailed" only when both hold, see [`Torrent::is_detailed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Torrent {
    /// Stable identifier assigned by the upstream service.
    pub id: String,
    /// Display name; doubles as the directory name in the default layout.
    pub name: String,
    /// Info hash reported by the upstream service.
    pub hash: String,
    /// Timestamp the torrent was added upstream.
    pub added: DateTime<Utc>,
    /// Timestamp the upstream transfer finished, when reported.
    pub ended: Option<DateTime<Utc>>,
    /// Files selected for download, keyed by file name.
    #[serde(default)]
    pub selected_files: BTreeMap<String, FileEntry>,
    /// Overall health of the torrent.
    pub state: TorrentHealth,
    /// Total payload size in bytes.
    pub total_size: u64,
    /// Set when file detail was last fetched; absent for list-only records.
    pub cache_timestamp: Option<DateTime<Utc>>,
}

impl Torrent {
    /// Whether file detail has been fetched and committed for this torrent.
    #[must_use]
    pub fn is_detailed(&self) -> bool {
        self.cache_timestamp.is_some() && !self.selected_files.is_empty()
    }
}

/// Health of a mirrored torrent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentHealth {
    /// The torrent resolved normally upstream.
    Ok,
    /// The upstream record is unusable (no payload links available).
    Broken,
}

impl TorrentHealth {
    /// Render the health as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Broken => "broken",
        }
    }
}

/// A single file within a torrent's selected payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Upstream file identifier.
    pub id: String,
    /// Path of the file within the torrent payload.
    pub path: String,
    /// File size in bytes.
    pub bytes: u64,
    /// Whether the file is selected for download upstream.
    pub selected: bool,
    /// Ephemeral signed download link, when one has been issued.
    pub link: Option<String>,
    /// Timestamp the current link was issued, when one is present.
    pub link_issued_at: Option<DateTime<Utc>>,
    /// Health of the file entry.
    pub state: FileHealth,
}

/// Health of an individual file entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileHealth {
    /// A download link can be issued for the file.
    Ok,
    /// The upstream record carries no usable link for the file.
    Broken,
}

/// Bookkeeping for the last committed library snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// When the library list was last refreshed successfully.
    pub last_refresh: Option<DateTime<Utc>>,
    /// Ids present in the last committed snapshot, used for New/Known diffing.
    pub known_ids: BTreeSet<String>,
    /// Ids classified as New by the latest diff; ranks the New candidate tier.
    pub new_ids: Vec<String>,
    /// Change-detection digest over the sorted id set.
    pub fingerprint: String,
}

impl CacheMetadata {
    /// Compute the change-detection digest for a set of torrent ids.
    ///
    /// The digest is a BLAKE3 hash over the newline-joined sorted ids, so any
    /// membership change alters it regardless of the id set's total length.
    #[must_use]
    pub fn fingerprint_of<I, S>(ids: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sorted: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        sorted.sort_unstable();
        let mut hasher = blake3::Hasher::new();
        for id in &sorted {
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Progress record for a bulk detail-population run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshJob {
    /// Job identifier.
    pub id: Uuid,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Number of candidates selected for this run.
    pub total: u32,
    /// Number of candidates processed so far, including failures.
    pub processed: u32,
    /// Identifier of the torrent currently being processed.
    pub current_torrent: Option<String>,
    /// When the job started.
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure or summary message recorded on completion.
    pub error_message: Option<String>,
}

impl RefreshJob {
    /// Whether the job is still in its `Running` state.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.status, JobStatus::Running)
    }
}

/// Lifecycle status of a [`RefreshJob`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The job is in progress (or was abandoned mid-run and awaits reaping).
    Running,
    /// The job finished; its success flag lives in the completion message.
    Completed,
    /// The job failed or was reaped as stale.
    Failed,
}

impl JobStatus {
    /// Render the status as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Stable short-code mapping standing in for an expiring signed link.
///
/// The code is immutable once minted; only `link` and `link_refreshed_at`
/// change when the underlying signed URL is reissued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrmMapping {
    /// Fixed-length alphanumeric code handed out to clients.
    pub code: String,
    /// Directory the file was browsed under when the code was minted.
    pub directory: String,
    /// Upstream torrent identifier.
    pub torrent_id: String,
    /// File name within the torrent.
    pub filename: String,
    /// Most recently known signed download link.
    pub link: String,
    /// When the mapping was first minted.
    pub created_at: DateTime<Utc>,
    /// When `link` was last refreshed; equals `created_at` until a refresh.
    pub link_refreshed_at: DateTime<Utc>,
}

/// Priority class governing detail-population order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateTier {
    /// Classified New by the latest list diff and never detailed.
    New,
    /// Already detailed; refreshed oldest-first.
    Stale,
    /// Never detailed and not classified New (e.g. missed by a truncated run).
    Uncached,
}

/// Library coverage counters surfaced to status consumers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Torrent records currently stored.
    pub total: u64,
    /// Records with committed file detail.
    pub detailed: u64,
    /// Records still awaiting a detail fetch.
    pub pending: u64,
}
