//! HTTP client for the upstream debrid API.
//!
//! # Design
//! - Every outbound call is admitted through a single pacing lane so the
//!   process never exceeds the upstream's aggregate request ceiling,
//!   regardless of caller concurrency.
//! - Rate-limited responses are retried after a fixed delay with a bounded
//!   attempt budget; exhaustion is a terminal error, never recursion.
//! - Each request carries the hard timeout configured on the inner client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rivulet_telemetry::Metrics;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::error::UpstreamError;
use crate::lane::Lane;
use crate::wire::{TorrentDetail, TorrentSummary, TrafficInfo, UnrestrictedLink, UserInfo};

/// Operations offered by the upstream debrid service.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetch one page of the torrent library.
    async fn list_torrents(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TorrentSummary>, UpstreamError>;

    /// Fetch full detail, including files and links, for one torrent.
    async fn torrent_detail(&self, id: &str) -> Result<TorrentDetail, UpstreamError>;

    /// Exchange a restricted link for a time-limited direct download URL.
    async fn unrestrict_link(&self, link: &str) -> Result<UnrestrictedLink, UpstreamError>;

    /// Fetch the account profile.
    async fn user_info(&self) -> Result<UserInfo, UpstreamError>;

    /// Fetch per-host traffic counters.
    async fn traffic_info(&self) -> Result<TrafficInfo, UpstreamError>;
}

/// Settings for [`DebridClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the upstream REST API.
    pub base_url: Url,
    /// Bearer token presented on every request.
    pub token: String,
    /// Hard per-request timeout.
    pub timeout: Duration,
    /// Minimum interval between any two outbound requests.
    pub min_interval: Duration,
    /// Total attempts permitted when the upstream reports rate limiting.
    pub rate_limit_attempts: u32,
    /// Fixed delay before retrying a rate-limited request.
    pub rate_limit_delay: Duration,
}

impl ClientOptions {
    /// Options with the upstream service's documented operational limits.
    #[must_use]
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            base_url,
            token: token.into(),
            timeout: Duration::from_secs(30),
            min_interval: Duration::from_millis(1000),
            rate_limit_attempts: 3,
            rate_limit_delay: Duration::from_millis(2000),
        }
    }
}

/// Serialized, rate-limited gateway to the upstream debrid API.
pub struct DebridClient {
    http: reqwest::Client,
    options: ClientOptions,
    lane: Lane,
    metrics: Metrics,
}

impl DebridClient {
    /// Build a client from the given options.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(options: ClientOptions, metrics: Metrics) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|source| UpstreamError::Transport { source })?;
        let lane = Lane::new(options.min_interval);
        Ok(Self {
            http,
            options,
            lane,
            metrics,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{path}",
            self.options.base_url.as_str().trim_end_matches('/')
        )
    }

    async fn execute<T, F>(&self, endpoint: &'static str, make_request: F) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.lane.admit().await;
            self.metrics.record_upstream_request(endpoint);
            debug!(endpoint, attempt, "dispatching upstream request");

            let response = match make_request()
                .bearer_auth(&self.options.token)
                .send()
                .await
            {
                Ok(response) => response,
                Err(source) => {
                    self.metrics.record_upstream_failure();
                    return Err(UpstreamError::from_transport(source));
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.options.rate_limit_attempts {
                    self.metrics.record_upstream_failure();
                    return Err(UpstreamError::RateLimitExhausted);
                }
                self.metrics.record_rate_limit_retry();
                warn!(endpoint, attempt, "upstream rate limited, retrying after delay");
                sleep(self.options.rate_limit_delay).await;
                continue;
            }
            if !status.is_success() {
                self.metrics.record_upstream_failure();
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                });
            }

            return response.json::<T>().await.map_err(|source| {
                self.metrics.record_upstream_failure();
                if source.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Decode { source }
                }
            });
        }
    }
}

#[async_trait]
impl UpstreamClient for DebridClient {
    async fn list_torrents(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TorrentSummary>, UpstreamError> {
        let url = self.endpoint("torrents");
        self.execute("torrents", || {
            self.http
                .get(&url)
                .query(&[("page", page), ("limit", limit)])
        })
        .await
    }

    async fn torrent_detail(&self, id: &str) -> Result<TorrentDetail, UpstreamError> {
        let url = self.endpoint(&format!("torrents/info/{id}"));
        self.execute("torrents_info", || self.http.get(&url)).await
    }

    async fn unrestrict_link(&self, link: &str) -> Result<UnrestrictedLink, UpstreamError> {
        let url = self.endpoint("unrestrict/link");
        self.execute("unrestrict_link", || {
            self.http.post(&url).form(&[("link", link)])
        })
        .await
    }

    async fn user_info(&self) -> Result<UserInfo, UpstreamError> {
        let url = self.endpoint("user");
        self.execute("user", || self.http.get(&url)).await
    }

    async fn traffic_info(&self) -> Result<TrafficInfo, UpstreamError> {
        let url = self.endpoint("traffic");
        self.execute("traffic", || self.http.get(&url)).await
    }
}
