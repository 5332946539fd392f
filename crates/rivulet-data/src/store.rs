//! Postgres implementation of the cache store contract.
//!
//! # Design
//! - Writes are idempotent upserts keyed by stable identifiers, so racing
//!   invocations converge on one row instead of corrupting state.
//! - Queries are plain SQL constants bound at runtime; migrations run once
//!   when the store is constructed.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rivulet_core::error::{StoreError, StoreResult};
use rivulet_core::model::{
    CacheMetadata, CacheStatistics, CandidateTier, DirectoryIndex, JobStatus, RefreshJob,
    StrmMapping, Torrent,
};
use rivulet_core::store::CacheStore;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::rows::{JobRow, StrmRow, TorrentRow};

const TORRENT_COLUMNS: &str =
    "id, name, hash, added, ended, selected_files, state, total_size, cache_timestamp";

const UPSERT_TORRENT: &str = r"
    INSERT INTO torrents
        (access_key, id, name, hash, added, ended, selected_files, state, total_size, cache_timestamp)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (access_key) DO UPDATE SET
        id = EXCLUDED.id,
        name = EXCLUDED.name,
        hash = EXCLUDED.hash,
        added = EXCLUDED.added,
        ended = EXCLUDED.ended,
        selected_files = EXCLUDED.selected_files,
        state = EXCLUDED.state,
        total_size = EXCLUDED.total_size,
        cache_timestamp = EXCLUDED.cache_timestamp
";

const CANDIDATES_NEW: &str = r"
    SELECT t.id FROM torrents t
    WHERE t.cache_timestamp IS NULL
      AND t.id IN (
          SELECT jsonb_array_elements_text(m.new_ids) FROM cache_metadata m WHERE m.id = 1
      )
      AND t.id <> ALL($1)
    ORDER BY t.added DESC
    LIMIT $2
";

const CANDIDATES_STALE: &str = r"
    SELECT t.id FROM torrents t
    WHERE t.cache_timestamp IS NOT NULL
      AND t.selected_files <> '{}'::jsonb
      AND t.id <> ALL($1)
    ORDER BY t.cache_timestamp ASC
    LIMIT $2
";

const CANDIDATES_UNCACHED: &str = r"
    SELECT t.id FROM torrents t
    WHERE t.cache_timestamp IS NULL
      AND t.id NOT IN (
          SELECT jsonb_array_elements_text(m.new_ids) FROM cache_metadata m WHERE m.id = 1
      )
      AND t.id <> ALL($1)
    ORDER BY t.added DESC
    LIMIT $2
";

const DIRECTORY_SNAPSHOT: &str = r"
    SELECT t.id, t.name, t.hash, t.added, t.ended, t.selected_files, t.state,
           t.total_size, t.cache_timestamp
    FROM torrents t
    JOIN directories d ON d.access_key = t.access_key
    WHERE d.directory = $1
    ORDER BY t.name
";

const SET_CACHE_METADATA: &str = r"
    INSERT INTO cache_metadata (id, last_refresh, known_ids, new_ids, fingerprint)
    VALUES (1, $1, $2, $3, $4)
    ON CONFLICT (id) DO UPDATE SET
        last_refresh = EXCLUDED.last_refresh,
        known_ids = EXCLUDED.known_ids,
        new_ids = EXCLUDED.new_ids,
        fingerprint = EXCLUDED.fingerprint
";

const REAP_STALE_JOBS: &str = r"
    UPDATE refresh_jobs
    SET status = 'failed', completed_at = $2, error_message = 'reaped stale job'
    WHERE status = 'running'
      AND started_at < $1
      AND ($3 = FALSE OR processed = 0)
    RETURNING id
";

const PRUNE_REFRESH_JOBS: &str = r"
    DELETE FROM refresh_jobs
    WHERE status <> 'running'
      AND id NOT IN (SELECT id FROM refresh_jobs ORDER BY started_at DESC LIMIT $1)
";

const INSERT_STRM: &str = r"
    INSERT INTO strm_codes
        (code, directory, torrent_id, filename, link, created_at, link_refreshed_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT DO NOTHING
";

/// Postgres-backed [`CacheStore`].
#[derive(Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    /// Initialise the store over an existing pool, applying pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| StoreError::new("migrate", err))?;
        Ok(Self { pool })
    }

    /// Connect to the given database URL and initialise the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migrations fail.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|err| StoreError::new("connect", err))?;
        Self::new(pool).await
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn torrent(&self, id: &str) -> StoreResult<Option<Torrent>> {
        let query = format!("SELECT {TORRENT_COLUMNS} FROM torrents WHERE id = $1");
        let row: Option<TorrentRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::new("torrent", err))?;
        Ok(row.map(Torrent::from))
    }

    async fn upsert_torrent(&self, torrent: &Torrent) -> StoreResult<()> {
        sqlx::query(UPSERT_TORRENT)
            .bind(&torrent.id)
            .bind(&torrent.id)
            .bind(&torrent.name)
            .bind(&torrent.hash)
            .bind(torrent.added)
            .bind(torrent.ended)
            .bind(Json(&torrent.selected_files))
            .bind(torrent.state.as_str())
            .bind(clamp_i64(torrent.total_size))
            .bind(torrent.cache_timestamp)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::new("upsert_torrent", err))?;
        Ok(())
    }

    async fn list_candidates(
        &self,
        tier: CandidateTier,
        limit: u32,
        exclude: &[String],
    ) -> StoreResult<Vec<String>> {
        let query = match tier {
            CandidateTier::New => CANDIDATES_NEW,
            CandidateTier::Stale => CANDIDATES_STALE,
            CandidateTier::Uncached => CANDIDATES_UNCACHED,
        };
        sqlx::query_scalar(query)
            .bind(exclude)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StoreError::new("list_candidates", err))
    }

    async fn directory_snapshot(&self, name: &str) -> StoreResult<Vec<Torrent>> {
        let rows: Vec<TorrentRow> = sqlx::query_as(DIRECTORY_SNAPSHOT)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StoreError::new("directory_snapshot", err))?;
        Ok(rows.into_iter().map(Torrent::from).collect())
    }

    async fn directory_index(&self) -> StoreResult<DirectoryIndex> {
        let rows = sqlx::query(
            "SELECT directory, access_key FROM directories ORDER BY directory, access_key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| StoreError::new("directory_index", err))?;

        let mut index = DirectoryIndex::new();
        for row in rows {
            let directory: String = row
                .try_get("directory")
                .map_err(|err| StoreError::new("directory_index", err))?;
            let access_key: String = row
                .try_get("access_key")
                .map_err(|err| StoreError::new("directory_index", err))?;
            index.entry(directory).or_default().insert(access_key);
        }
        Ok(index)
    }

    async fn replace_directory_index(&self, index: &DirectoryIndex) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| StoreError::new("replace_directory_index", err))?;
        sqlx::query("DELETE FROM directories")
            .execute(&mut *tx)
            .await
            .map_err(|err| StoreError::new("replace_directory_index", err))?;
        for (directory, access_keys) in index {
            for access_key in access_keys {
                sqlx::query("INSERT INTO directories (directory, access_key) VALUES ($1, $2)")
                    .bind(directory)
                    .bind(access_key)
                    .execute(&mut *tx)
                    .await
                    .map_err(|err| StoreError::new("replace_directory_index", err))?;
            }
        }
        tx.commit()
            .await
            .map_err(|err| StoreError::new("replace_directory_index", err))?;
        Ok(())
    }

    async fn cache_metadata(&self) -> StoreResult<Option<CacheMetadata>> {
        let row = sqlx::query(
            "SELECT last_refresh, known_ids, new_ids, fingerprint FROM cache_metadata WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StoreError::new("cache_metadata", err))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let known_ids: Json<BTreeSet<String>> = row
            .try_get("known_ids")
            .map_err(|err| StoreError::new("cache_metadata", err))?;
        let new_ids: Json<Vec<String>> = row
            .try_get("new_ids")
            .map_err(|err| StoreError::new("cache_metadata", err))?;
        Ok(Some(CacheMetadata {
            last_refresh: row
                .try_get("last_refresh")
                .map_err(|err| StoreError::new("cache_metadata", err))?,
            known_ids: known_ids.0,
            new_ids: new_ids.0,
            fingerprint: row
                .try_get("fingerprint")
                .map_err(|err| StoreError::new("cache_metadata", err))?,
        }))
    }

    async fn set_cache_metadata(&self, metadata: &CacheMetadata) -> StoreResult<()> {
        sqlx::query(SET_CACHE_METADATA)
            .bind(metadata.last_refresh)
            .bind(Json(&metadata.known_ids))
            .bind(Json(&metadata.new_ids))
            .bind(&metadata.fingerprint)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::new("set_cache_metadata", err))?;
        Ok(())
    }

    async fn create_refresh_job(&self, total: u32) -> StoreResult<RefreshJob> {
        let job = RefreshJob {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            total,
            processed: 0,
            current_torrent: None,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };
        sqlx::query(
            "INSERT INTO refresh_jobs (id, status, total, processed, started_at) \
             VALUES ($1, 'running', $2, 0, $3)",
        )
        .bind(job.id)
        .bind(clamp_i32(total))
        .bind(job.started_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::new("create_refresh_job", err))?;
        Ok(job)
    }

    async fn update_refresh_job(
        &self,
        id: Uuid,
        processed: u32,
        current: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE refresh_jobs SET processed = $2, current_torrent = $3 WHERE id = $1")
            .bind(id)
            .bind(clamp_i32(processed))
            .bind(current)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::new("update_refresh_job", err))?;
        Ok(())
    }

    async fn complete_refresh_job(
        &self,
        id: Uuid,
        success: bool,
        message: Option<&str>,
    ) -> StoreResult<()> {
        let status = if success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        sqlx::query(
            "UPDATE refresh_jobs SET status = $2, completed_at = $3, error_message = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::new("complete_refresh_job", err))?;
        Ok(())
    }

    async fn refresh_job(&self, id: Option<Uuid>) -> StoreResult<Option<RefreshJob>> {
        let row: Option<JobRow> = match id {
            Some(id) => sqlx::query_as(
                "SELECT id, status, total, processed, current_torrent, started_at, \
                 completed_at, error_message FROM refresh_jobs WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::new("refresh_job", err))?,
            None => sqlx::query_as(
                "SELECT id, status, total, processed, current_torrent, started_at, \
                 completed_at, error_message FROM refresh_jobs \
                 ORDER BY started_at DESC LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::new("refresh_job", err))?,
        };
        Ok(row.map(RefreshJob::from))
    }

    async fn reap_stale_jobs(
        &self,
        started_before: DateTime<Utc>,
        only_if_unprogressed: bool,
    ) -> StoreResult<Vec<Uuid>> {
        sqlx::query_scalar(REAP_STALE_JOBS)
            .bind(started_before)
            .bind(Utc::now())
            .bind(only_if_unprogressed)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StoreError::new("reap_stale_jobs", err))
    }

    async fn prune_refresh_jobs(&self, keep: u32) -> StoreResult<()> {
        sqlx::query(PRUNE_REFRESH_JOBS)
            .bind(i64::from(keep))
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::new("prune_refresh_jobs", err))?;
        Ok(())
    }

    async fn get_or_create_strm_mapping(
        &self,
        proposed: &StrmMapping,
    ) -> StoreResult<Option<StrmMapping>> {
        if let Some(existing) = self
            .strm_mapping_by_file(&proposed.torrent_id, &proposed.filename)
            .await?
        {
            return Ok(Some(existing));
        }

        let inserted = sqlx::query(INSERT_STRM)
            .bind(&proposed.code)
            .bind(&proposed.directory)
            .bind(&proposed.torrent_id)
            .bind(&proposed.filename)
            .bind(&proposed.link)
            .bind(proposed.created_at)
            .bind(proposed.link_refreshed_at)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::new("get_or_create_strm_mapping", err))?;
        if inserted.rows_affected() == 1 {
            return Ok(Some(proposed.clone()));
        }

        // The insert was a no-op: either a racing caller minted the mapping
        // for this file first, or the proposed code collided with a mapping
        // for a different file.
        self.strm_mapping_by_file(&proposed.torrent_id, &proposed.filename)
            .await
    }

    async fn strm_mapping_by_code(&self, code: &str) -> StoreResult<Option<StrmMapping>> {
        let row: Option<StrmRow> = sqlx::query_as(
            "SELECT code, directory, torrent_id, filename, link, created_at, \
             link_refreshed_at FROM strm_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StoreError::new("strm_mapping_by_code", err))?;
        Ok(row.map(StrmMapping::from))
    }

    async fn update_strm_link(&self, code: &str, link: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE strm_codes SET link = $2, link_refreshed_at = $3 WHERE code = $1",
        )
        .bind(code)
        .bind(link)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::new("update_strm_link", err))?;
        Ok(())
    }

    async fn cache_statistics(&self) -> StoreResult<CacheStatistics> {
        let (total, detailed): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE cache_timestamp IS NOT NULL) FROM torrents",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|err| StoreError::new("cache_statistics", err))?;
        let total = u64::try_from(total).unwrap_or_default();
        let detailed = u64::try_from(detailed).unwrap_or_default();
        Ok(CacheStatistics {
            total,
            detailed,
            pending: total.saturating_sub(detailed),
        })
    }
}

impl PgCacheStore {
    async fn strm_mapping_by_file(
        &self,
        torrent_id: &str,
        filename: &str,
    ) -> StoreResult<Option<StrmMapping>> {
        let row: Option<StrmRow> = sqlx::query_as(
            "SELECT code, directory, torrent_id, filename, link, created_at, \
             link_refreshed_at FROM strm_codes WHERE torrent_id = $1 AND filename = $2",
        )
        .bind(torrent_id)
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StoreError::new("strm_mapping_by_file", err))?;
        Ok(row.map(StrmMapping::from))
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_handles_large_values() {
        assert_eq!(clamp_i64(42), 42);
        assert_eq!(clamp_i64(u64::MAX), i64::MAX);
        assert_eq!(clamp_i32(u32::MAX), i32::MAX);
    }
}
