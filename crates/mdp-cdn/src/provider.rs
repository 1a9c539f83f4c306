//! CDN provider capability
//!
//! The engine tracks jobs and timing; providers only translate requests into
//! their native API. [`StaticCdnProvider`] covers origins that have no purge
//! API and still probes over real HTTP.

use crate::error::CdnError;
use crate::origin::OriginConfig;
use crate::types::{
    CacheMetrics, ProbeResponse, PurgeJobId, PurgeRequest, PurgeStatus, PurgeStatusReport,
    StatsRange,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, AGE, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use std::time::Duration;

/// Operations consumed by the cache invalidation engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CdnProvider: Send + Sync {
    /// Submit a purge; returns the initial job status
    async fn request_purge(&self, request: &PurgeRequest) -> Result<PurgeStatus, CdnError>;

    /// Check a previously submitted purge
    async fn poll_status(&self, job_id: &PurgeJobId) -> Result<PurgeStatusReport, CdnError>;

    /// Fetch `url` through the edge and capture cache headers
    async fn probe(&self, url: &str) -> Result<ProbeResponse, CdnError>;

    /// Push origin settings
    async fn configure_origin(&self, _config: &OriginConfig) -> Result<(), CdnError> {
        Ok(())
    }

    /// Edge traffic counters over `range`
    async fn cache_statistics(&self, _range: &StatsRange) -> Result<CacheMetrics, CdnError> {
        Err(CdnError::Unsupported("cache statistics"))
    }
}

/// Provider for CDNs without a purge API
///
/// Purges are accepted and report completed on the first poll. Traffic
/// statistics are not available.
#[derive(Debug, Clone)]
pub struct StaticCdnProvider {
    client: reqwest::Client,
}

impl StaticCdnProvider {
    /// Create with a per-request timeout
    ///
    /// # Errors
    /// Fails when the HTTP client cannot be built (TLS backend init)
    pub fn new(request_timeout: Duration) -> Result<Self, CdnError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout.min(Duration::from_secs(5)))
            .timeout(request_timeout)
            .build()
            .map_err(|e| CdnError::transient(format!("http client init failed: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CdnProvider for StaticCdnProvider {
    async fn request_purge(&self, request: &PurgeRequest) -> Result<PurgeStatus, CdnError> {
        tracing::debug!(
            job_id = %request.job_id,
            mode = %request.mode,
            paths = request.paths.len(),
            "Static origin: purge accepted"
        );
        Ok(PurgeStatus::InProgress)
    }

    async fn poll_status(&self, _job_id: &PurgeJobId) -> Result<PurgeStatusReport, CdnError> {
        Ok(PurgeStatusReport::new(PurgeStatus::Completed).with_progress(100))
    }

    async fn probe(&self, url: &str) -> Result<ProbeResponse, CdnError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CdnError::Timeout(format!("GET {url}: {e}"))
            } else {
                CdnError::transient(format!("GET {url}: {e}"))
            }
        })?;
        Ok(response_from_headers(response.status().as_u16(), response.headers()))
    }
}

fn response_from_headers(status: u16, headers: &HeaderMap) -> ProbeResponse {
    let text = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    ProbeResponse {
        status,
        x_cache: headers
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        age_secs: text(AGE).and_then(|v| v.trim().parse().ok()),
        content_type: text(CONTENT_TYPE),
        content_length: text(CONTENT_LENGTH).and_then(|v| v.trim().parse().ok()),
        cache_control: text(CACHE_CONTROL),
        etag: text(ETAG),
        last_modified: text(LAST_MODIFIED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn headers_are_captured() {
        let mut headers = HeaderMap::new();
        headers.insert("x-cache", HeaderValue::from_static("TCP_HIT"));
        headers.insert(AGE, HeaderValue::from_static("42"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/webp"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));

        let response = response_from_headers(200, &headers);
        assert_eq!(response.status, 200);
        assert_eq!(response.x_cache.as_deref(), Some("TCP_HIT"));
        assert_eq!(response.age_secs, Some(42));
        assert_eq!(response.content_type.as_deref(), Some("image/webp"));
        assert_eq!(response.content_length, Some(1024));
        assert!(response.etag.is_none());
    }

    #[test]
    fn malformed_numbers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(AGE, HeaderValue::from_static("soon"));
        let response = response_from_headers(304, &headers);
        assert_eq!(response.age_secs, None);
    }

    #[tokio::test]
    async fn static_purge_completes_on_first_poll() {
        let provider = StaticCdnProvider::new(Duration::from_secs(1)).unwrap();
        let request = PurgeRequest {
            job_id: PurgeJobId::generate(),
            mode: crate::types::PurgeMode::Paths,
            paths: vec!["/a.webp".into()],
        };
        assert_eq!(
            provider.request_purge(&request).await.unwrap(),
            PurgeStatus::InProgress
        );
        let report = provider.poll_status(&request.job_id).await.unwrap();
        assert_eq!(report.status, PurgeStatus::Completed);
    }

    #[tokio::test]
    async fn static_provider_has_no_statistics() {
        let provider = StaticCdnProvider::new(Duration::from_secs(1)).unwrap();
        let today = chrono::Utc::now().date_naive();
        let err = provider
            .cache_statistics(&StatsRange::ending_on(today))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("NotSupported"));
    }
}
