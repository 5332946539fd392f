//! Stable stream codes standing in for expiring signed links.
//!
//! # Design
//! - Codes are immutable identities: once a `(torrent, file)` pair has a
//!   code, later mints return it unchanged regardless of the link offered.
//! - Resolution validates the code format before any storage access, and
//!   degrades every failure to a placeholder URL; streaming clients handle
//!   a clear fallback better than an HTTP error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rivulet_core::model::StrmMapping;
use rivulet_core::store::CacheStore;
use rivulet_debrid::client::UpstreamClient;
use rivulet_telemetry::Metrics;
use tracing::{debug, warn};

use crate::detail::fetch_and_store_detail;
use crate::error::SyncError;

/// Length of every stream code.
pub const CODE_LENGTH: usize = 16;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Collision-checked mint attempts before giving up.
const MINT_ATTEMPTS: u32 = 8;

/// Whether a string is a well-formed stream code.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH
        && code
            .bytes()
            .all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit())
}

/// Settings for [`StrmResolver`].
#[derive(Debug, Clone)]
pub struct StrmOptions {
    /// Age after which a stored signed link is refreshed before use.
    pub link_ttl: Duration,
    /// Placeholder URL returned when resolution fails.
    pub fallback_url: String,
}

impl Default for StrmOptions {
    fn default() -> Self {
        Self {
            link_ttl: Duration::from_secs(21_600),
            fallback_url: "http://127.0.0.1:8080/not_found.mp4".to_string(),
        }
    }
}

/// Mints and resolves stable stream codes.
pub struct StrmResolver {
    client: Arc<dyn UpstreamClient>,
    store: Arc<dyn CacheStore>,
    options: StrmOptions,
    metrics: Metrics,
}

impl StrmResolver {
    /// Construct a resolver over the shared client and store.
    #[must_use]
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn CacheStore>,
        options: StrmOptions,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            store,
            options,
            metrics,
        }
    }

    /// Return the stable code for a file, minting one on first request.
    ///
    /// An existing mapping wins unconditionally, even when `link` differs
    /// from what it stores.
    ///
    /// # Errors
    ///
    /// Returns a store error when persistence fails, or
    /// [`SyncError::CodeMintExhausted`] if every collision-checked attempt
    /// collides.
    pub async fn mint_or_get(
        &self,
        directory: &str,
        torrent_id: &str,
        filename: &str,
        link: &str,
    ) -> Result<String, SyncError> {
        for _ in 0..MINT_ATTEMPTS {
            let now = Utc::now();
            let proposed = StrmMapping {
                code: generate_code(),
                directory: directory.to_string(),
                torrent_id: torrent_id.to_string(),
                filename: filename.to_string(),
                link: link.to_string(),
                created_at: now,
                link_refreshed_at: now,
            };
            if let Some(mapping) = self.store.get_or_create_strm_mapping(&proposed).await? {
                return Ok(mapping.code);
            }
            debug!(torrent_id, filename, "stream code collision, reminting");
        }
        Err(SyncError::CodeMintExhausted)
    }

    /// Resolve a code to a download URL.
    ///
    /// A stale stored link triggers exactly one lazy refresh through the
    /// detail-fetch path; any failure along the way yields the fallback URL.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidCodeFormat`] for malformed codes, before
    /// any storage access. Every other failure degrades to the fallback URL.
    pub async fn resolve(&self, code: &str) -> Result<String, SyncError> {
        if !is_valid_code(code) {
            return Err(SyncError::InvalidCodeFormat);
        }

        let mapping = match self.store.strm_mapping_by_code(code).await {
            Ok(Some(mapping)) => mapping,
            Ok(None) => {
                debug!(code, "unknown stream code");
                return Ok(self.fallback());
            }
            Err(err) => {
                warn!(code, error = %err, "stream code lookup failed");
                return Ok(self.fallback());
            }
        };

        if link_is_fresh(&mapping, self.options.link_ttl, Utc::now()) {
            return Ok(mapping.link);
        }

        match self.refresh_link(&mapping).await {
            Ok(Some(link)) => Ok(link),
            Ok(None) => {
                warn!(
                    code,
                    torrent_id = %mapping.torrent_id,
                    "file no longer resolves upstream"
                );
                Ok(self.fallback())
            }
            Err(err) => {
                warn!(
                    code,
                    torrent_id = %mapping.torrent_id,
                    error = %err,
                    "stream link refresh failed"
                );
                Ok(self.fallback())
            }
        }
    }

    /// Re-run the detail-fetch path for the mapped torrent, unrestrict the
    /// file's link, and update the mapping in place. The code is unchanged.
    async fn refresh_link(&self, mapping: &StrmMapping) -> Result<Option<String>, SyncError> {
        let torrent =
            fetch_and_store_detail(self.client.as_ref(), self.store.as_ref(), &mapping.torrent_id)
                .await?;
        let Some(restricted) = torrent
            .selected_files
            .get(&mapping.filename)
            .and_then(|file| file.link.clone())
        else {
            return Ok(None);
        };
        let unrestricted = self.client.unrestrict_link(&restricted).await?;
        self.store
            .update_strm_link(&mapping.code, &unrestricted.download)
            .await?;
        Ok(Some(unrestricted.download))
    }

    fn fallback(&self) -> String {
        self.metrics.record_strm_fallback();
        self.options.fallback_url.clone()
    }
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..CODE_CHARSET.len());
            char::from(CODE_CHARSET[index])
        })
        .collect()
}

fn link_is_fresh(mapping: &StrmMapping, ttl: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(mapping.link_refreshed_at)
        .to_std()
        .map_or(true, |age| age < ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_test_support::fixtures::detail_with_files;
    use rivulet_test_support::{MemoryStore, ScriptedUpstream};

    fn resolver(
        client: Arc<ScriptedUpstream>,
        store: Arc<MemoryStore>,
        options: StrmOptions,
    ) -> StrmResolver {
        StrmResolver::new(
            client,
            store,
            options,
            Metrics::new().expect("metrics registry"),
        )
    }

    #[test]
    fn generated_codes_use_the_fixed_charset_and_length() {
        for _ in 0..32 {
            let code = generate_code();
            assert!(is_valid_code(&code), "generated invalid code {code}");
        }
    }

    #[test]
    fn format_validation_rejects_wrong_shapes() {
        assert!(is_valid_code("ABCD1234EFGH5678"));
        assert!(!is_valid_code("abcd1234efgh5678"));
        assert!(!is_valid_code("ABCD1234EFGH567"));
        assert!(!is_valid_code("ABCD1234EFGH5678X"));
        assert!(!is_valid_code("ABCD-234EFGH5678"));
    }

    #[tokio::test]
    async fn minting_twice_returns_the_same_code_regardless_of_link() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(client, store, StrmOptions::default());

        let first = resolver
            .mint_or_get("Example", "AA", "movie.mkv", "https://host.example/link-a")
            .await
            .expect("first mint");
        let second = resolver
            .mint_or_get("Example", "AA", "movie.mkv", "https://host.example/link-b")
            .await
            .expect("second mint");

        assert_eq!(first, second);
        assert!(is_valid_code(&first));
    }

    #[tokio::test]
    async fn malformed_codes_fail_fast() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(client, store, StrmOptions::default());

        let error = resolver
            .resolve("not-a-valid-code")
            .await
            .expect_err("format check should reject");
        assert!(matches!(error, SyncError::InvalidCodeFormat));
    }

    #[tokio::test]
    async fn unknown_codes_resolve_to_the_fallback() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(client, store, StrmOptions::default());

        let url = resolver
            .resolve("ABCD1234EFGH5678")
            .await
            .expect("unknown code degrades, never errors");
        assert_eq!(url, StrmOptions::default().fallback_url);
    }

    #[tokio::test]
    async fn fresh_links_are_returned_without_touching_the_upstream() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(Arc::clone(&client), store, StrmOptions::default());

        let code = resolver
            .mint_or_get("Example", "AA", "movie.mkv", "https://host.example/direct/AA/0")
            .await
            .expect("mint");
        let url = resolver.resolve(&code).await.expect("resolve");

        assert_eq!(url, "https://host.example/direct/AA/0");
        assert!(client.detail_calls().is_empty());
    }

    #[tokio::test]
    async fn stale_links_are_refreshed_in_place_with_the_code_unchanged() {
        let now = Utc::now();
        let client = Arc::new(ScriptedUpstream::new());
        client.set_detail(detail_with_files(
            "AA",
            "Example.Release",
            now,
            &[("/Example.Release/movie.mkv", 100, true)],
        ));
        let store = Arc::new(MemoryStore::new());
        let options = StrmOptions {
            // Zero TTL makes every stored link stale immediately.
            link_ttl: Duration::from_secs(0),
            ..StrmOptions::default()
        };
        let resolver = resolver(Arc::clone(&client), Arc::clone(&store), options);

        let code = resolver
            .mint_or_get("Example.Release", "AA", "movie.mkv", "https://host.example/old")
            .await
            .expect("mint");
        let url = resolver.resolve(&code).await.expect("resolve");

        // The scripted upstream unrestricts restricted links into direct ones.
        assert_eq!(url, "https://host.example/direct/AA/0");

        let mapping = store
            .strm_mapping_by_code(&code)
            .await
            .expect("read")
            .expect("mapping still present");
        assert_eq!(mapping.code, code);
        assert_eq!(mapping.link, "https://host.example/direct/AA/0");
    }

    #[tokio::test]
    async fn failed_refresh_degrades_to_the_fallback() {
        let client = Arc::new(ScriptedUpstream::new());
        client.fail_detail("AA");
        let store = Arc::new(MemoryStore::new());
        let options = StrmOptions {
            link_ttl: Duration::from_secs(0),
            ..StrmOptions::default()
        };
        let resolver = resolver(client, store, options);

        let code = resolver
            .mint_or_get("Example", "AA", "movie.mkv", "https://host.example/old")
            .await
            .expect("mint");
        let url = resolver.resolve(&code).await.expect("degrades, never errors");
        assert_eq!(url, StrmOptions::default().fallback_url);
    }
}
