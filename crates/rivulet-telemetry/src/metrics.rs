//! Prometheus-backed metrics registry.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters relevant to upstream pacing and cache population.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::TelemetryError;

/// Metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    upstream_requests_total: IntCounterVec,
    upstream_rate_limit_retries_total: IntCounter,
    upstream_failures_total: IntCounter,
    library_refreshes_total: IntCounter,
    torrents_detailed_total: IntCounter,
    detail_failures_total: IntCounter,
    strm_fallbacks_total: IntCounter,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let upstream_requests_total = IntCounterVec::new(
            Opts::new(
                "upstream_requests_total",
                "Requests dispatched to the upstream API by endpoint",
            ),
            &["endpoint"],
        )?;
        let upstream_rate_limit_retries_total = IntCounter::new(
            "upstream_rate_limit_retries_total",
            "Rate-limited upstream responses that triggered a retry",
        )?;
        let upstream_failures_total = IntCounter::new(
            "upstream_failures_total",
            "Upstream requests that failed terminally",
        )?;
        let library_refreshes_total = IntCounter::new(
            "library_refreshes_total",
            "Library list refreshes committed",
        )?;
        let torrents_detailed_total = IntCounter::new(
            "torrents_detailed_total",
            "Torrents whose file detail was fetched and committed",
        )?;
        let detail_failures_total = IntCounter::new(
            "detail_failures_total",
            "Per-torrent detail fetches that failed and were skipped",
        )?;
        let strm_fallbacks_total = IntCounter::new(
            "strm_fallbacks_total",
            "Stream-code resolutions that degraded to the fallback URL",
        )?;

        registry.register(Box::new(upstream_requests_total.clone()))?;
        registry.register(Box::new(upstream_rate_limit_retries_total.clone()))?;
        registry.register(Box::new(upstream_failures_total.clone()))?;
        registry.register(Box::new(library_refreshes_total.clone()))?;
        registry.register(Box::new(torrents_detailed_total.clone()))?;
        registry.register(Box::new(detail_failures_total.clone()))?;
        registry.register(Box::new(strm_fallbacks_total.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                upstream_requests_total,
                upstream_rate_limit_retries_total,
                upstream_failures_total,
                library_refreshes_total,
                torrents_detailed_total,
                detail_failures_total,
                strm_fallbacks_total,
            }),
        })
    }

    /// Record an upstream request dispatched for the given endpoint label.
    pub fn record_upstream_request(&self, endpoint: &str) {
        self.inner
            .upstream_requests_total
            .with_label_values(&[endpoint])
            .inc();
    }

    /// Record a rate-limited response that will be retried.
    pub fn record_rate_limit_retry(&self) {
        self.inner.upstream_rate_limit_retries_total.inc();
    }

    /// Record a terminally failed upstream request.
    pub fn record_upstream_failure(&self) {
        self.inner.upstream_failures_total.inc();
    }

    /// Record a committed library refresh.
    pub fn record_refresh(&self) {
        self.inner.library_refreshes_total.inc();
    }

    /// Record a torrent whose detail was fetched and committed.
    pub fn record_torrent_detailed(&self) {
        self.inner.torrents_detailed_total.inc();
    }

    /// Record a skipped per-torrent detail failure.
    pub fn record_detail_failure(&self) {
        self.inner.detail_failures_total.inc();
    }

    /// Record a stream-code resolution that fell back to the placeholder URL.
    pub fn record_strm_fallback(&self) {
        self.inner.strm_fallbacks_total.inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the gathered metrics cannot be encoded.
    pub fn render(&self) -> Result<String, TelemetryError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncoding { source })?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
