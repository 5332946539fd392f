//! Row shapes decoded from Postgres and their domain conversions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rivulet_core::model::{
    FileEntry, JobStatus, RefreshJob, StrmMapping, Torrent, TorrentHealth,
};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub(crate) struct TorrentRow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) hash: String,
    pub(crate) added: DateTime<Utc>,
    pub(crate) ended: Option<DateTime<Utc>>,
    pub(crate) selected_files: Json<BTreeMap<String, FileEntry>>,
    pub(crate) state: String,
    pub(crate) total_size: i64,
    pub(crate) cache_timestamp: Option<DateTime<Utc>>,
}

impl From<TorrentRow> for Torrent {
    fn from(row: TorrentRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            hash: row.hash,
            added: row.added,
            ended: row.ended,
            selected_files: row.selected_files.0,
            state: parse_health(&row.state),
            total_size: u64::try_from(row.total_size).unwrap_or_default(),
            cache_timestamp: row.cache_timestamp,
        }
    }
}

fn parse_health(label: &str) -> TorrentHealth {
    match label {
        "ok" => TorrentHealth::Ok,
        "broken" => TorrentHealth::Broken,
        other => {
            tracing::warn!(state = %other, "unknown torrent state encountered in cache store");
            TorrentHealth::Broken
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct JobRow {
    pub(crate) id: Uuid,
    pub(crate) status: String,
    pub(crate) total: i32,
    pub(crate) processed: i32,
    pub(crate) current_torrent: Option<String>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) error_message: Option<String>,
}

impl From<JobRow> for RefreshJob {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            status: parse_status(&row.status),
            total: u32::try_from(row.total).unwrap_or_default(),
            processed: u32::try_from(row.processed).unwrap_or_default(),
            current_torrent: row.current_torrent,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
        }
    }
}

fn parse_status(label: &str) -> JobStatus {
    match label {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        other => {
            tracing::warn!(status = %other, "unknown job status encountered in cache store");
            JobStatus::Failed
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct StrmRow {
    pub(crate) code: String,
    pub(crate) directory: String,
    pub(crate) torrent_id: String,
    pub(crate) filename: String,
    pub(crate) link: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) link_refreshed_at: DateTime<Utc>,
}

impl From<StrmRow> for StrmMapping {
    fn from(row: StrmRow) -> Self {
        Self {
            code: row.code,
            directory: row.directory,
            torrent_id: row.torrent_id,
            filename: row.filename,
            link: row.link,
            created_at: row.created_at,
            link_refreshed_at: row.link_refreshed_at,
        }
    }
}
