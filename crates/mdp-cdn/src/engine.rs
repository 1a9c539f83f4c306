//! Cache invalidation engine
//!
//! Tracks purge jobs it submitted until they finish, waits on them with a
//! bounded poll loop and keeps the history of change-driven purges.

use crate::config::CdnConfig;
use crate::error::CdnError;
use crate::history::PurgeHistory;
use crate::origin::{OriginConfig, OriginOverrides, OriginSettings};
use crate::provider::CdnProvider;
use crate::types::{
    CacheState, CacheStatistics, ProbeResult, PurgeJob, PurgeJobId, PurgeMode, PurgeOutcome,
    PurgeRecord, PurgeRequest, PurgeStatistics, PurgeStatus, PurgeStatusReport,
    SmartPurgeResult, StatsRange, PURGE_SECONDS_PER_PATH,
};
use chrono::Utc;
use dashmap::DashMap;
use mdp_model::ErrorKind;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Smallest poll cadence honoured by [`CacheInvalidationEngine::wait_for_completion`]
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Purge and probe front end over a [`CdnProvider`]
pub struct CacheInvalidationEngine {
    provider: Arc<dyn CdnProvider>,
    config: CdnConfig,
    jobs: DashMap<PurgeJobId, PurgeJob>,
    history: PurgeHistory,
    origin: RwLock<Option<OriginConfig>>,
}

impl std::fmt::Debug for CacheInvalidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidationEngine")
            .field("config", &self.config)
            .field("jobs", &self.jobs.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl CacheInvalidationEngine {
    /// Create engine over `provider`
    #[must_use]
    pub fn new(provider: Arc<dyn CdnProvider>, config: CdnConfig) -> Self {
        Self {
            provider,
            config,
            jobs: DashMap::new(),
            history: PurgeHistory::new(),
            origin: RwLock::new(None),
        }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CdnConfig {
        &self.config
    }

    /// Submit a purge without waiting for it
    ///
    /// Paths are normalized to start with `/`.
    ///
    /// # Errors
    /// [`CdnError::InvalidRequest`] for a path purge without paths; provider
    /// errors pass through.
    pub async fn request_purge(
        &self,
        paths: &[String],
        mode: PurgeMode,
    ) -> Result<PurgeJob, CdnError> {
        if mode == PurgeMode::Paths && paths.is_empty() {
            return Err(CdnError::InvalidRequest("path purge without paths".to_string()));
        }
        if let PurgeMode::Pattern(pattern) = &mode {
            if pattern.trim().is_empty() {
                return Err(CdnError::InvalidRequest("empty purge pattern".to_string()));
            }
        }

        let paths: Vec<String> = paths.iter().map(|p| normalize_path(p)).collect();
        let request = PurgeRequest {
            job_id: PurgeJobId::generate(),
            mode,
            paths,
        };

        let status = self.provider.request_purge(&request).await?;
        let job = PurgeJob {
            estimated_seconds: request.paths.len() as u64 * PURGE_SECONDS_PER_PATH,
            id: request.job_id,
            status,
            mode: request.mode,
            paths: request.paths,
            created_at: Utc::now(),
        };

        tracing::info!(
            job_id = %job.id,
            mode = %job.mode,
            paths = job.paths.len(),
            status = %job.status,
            "Purge requested"
        );
        if job.status.is_terminal() {
            self.history.archive(job.clone());
        } else {
            self.jobs.insert(job.id.clone(), job.clone());
        }
        Ok(job)
    }

    /// Purge every path matching `pattern`
    ///
    /// # Errors
    /// Same as [`request_purge`](Self::request_purge)
    pub async fn purge_pattern(&self, pattern: &str) -> Result<PurgeJob, CdnError> {
        self.request_purge(&[], PurgeMode::Pattern(pattern.to_string()))
            .await
    }

    /// Check a job once
    ///
    /// # Errors
    /// Provider errors pass through
    pub async fn poll_status(&self, job_id: &PurgeJobId) -> Result<PurgeStatus, CdnError> {
        self.poll_report(job_id).await.map(|r| r.status)
    }

    async fn poll_report(&self, job_id: &PurgeJobId) -> Result<PurgeStatusReport, CdnError> {
        let report = self.provider.poll_status(job_id).await?;
        tracing::debug!(job_id = %job_id, status = %report.status, "Purge polled");
        if report.status.is_terminal() {
            if let Some((_, mut job)) = self.jobs.remove(job_id) {
                job.status = report.status;
                self.history.archive(job);
            }
        } else if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.status = report.status;
        }
        Ok(report)
    }

    /// Poll until the job is terminal or `timeout` passes
    ///
    /// The remote purge keeps running after a timeout.
    pub async fn wait_for_completion(
        &self,
        job_id: &PurgeJobId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> PurgeOutcome {
        let started = Instant::now();
        let deadline = started + timeout;
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let mut last_status = self
            .jobs
            .get(job_id)
            .map_or(PurgeStatus::Pending, |j| j.status);

        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.poll_report(job_id)).await {
                Err(_) => break,
                Ok(Err(err)) => {
                    tracing::warn!("Polling purge {} failed: {}", job_id, err);
                    return PurgeOutcome::Error {
                        job_id: job_id.clone(),
                        failure: err.to_failure(),
                    };
                }
                Ok(Ok(report)) => match report.status {
                    PurgeStatus::Completed => {
                        let elapsed_ms =
                            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                        tracing::info!(job_id = %job_id, elapsed_ms, "Purge completed");
                        return PurgeOutcome::Completed {
                            job_id: job_id.clone(),
                            elapsed_ms,
                        };
                    }
                    PurgeStatus::Failed => {
                        let reason = report.error.unwrap_or_else(|| "Unknown error".to_string());
                        tracing::warn!("Purge {} failed: {}", job_id, reason);
                        return PurgeOutcome::Failed {
                            job_id: job_id.clone(),
                            reason,
                        };
                    }
                    status => last_status = status,
                },
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }

        tracing::warn!(
            "Timed out after {:?} waiting for purge {} (last status {})",
            timeout,
            job_id,
            last_status
        );
        PurgeOutcome::TimedOut {
            job_id: job_id.clone(),
            last_status,
        }
    }

    /// Wait using the configured timeout and poll cadence
    pub async fn wait_with_defaults(&self, job_id: &PurgeJobId) -> PurgeOutcome {
        self.wait_for_completion(job_id, self.config.purge_timeout(), self.config.poll_interval())
            .await
    }

    /// Purge exactly the changed paths and record it in the history
    ///
    /// An empty change set succeeds without contacting the provider.
    pub async fn smart_purge(&self, changed_paths: &[String]) -> SmartPurgeResult {
        if changed_paths.is_empty() {
            tracing::debug!("Smart purge skipped: no changed paths");
            return SmartPurgeResult {
                success: true,
                job: None,
                file_count: 0,
                message: Some("No files to purge".to_string()),
                error: None,
            };
        }

        match self.request_purge(changed_paths, PurgeMode::Paths).await {
            Ok(job) => {
                self.history.append(PurgeRecord {
                    timestamp: job.created_at,
                    file_count: changed_paths.len(),
                    job_id: job.id.clone(),
                });
                SmartPurgeResult {
                    success: true,
                    file_count: changed_paths.len(),
                    job: Some(job),
                    message: None,
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!("Smart purge of {} path(s) failed: {}", changed_paths.len(), err);
                SmartPurgeResult {
                    success: false,
                    job: None,
                    file_count: changed_paths.len(),
                    message: None,
                    error: Some(err.to_failure()),
                }
            }
        }
    }

    /// Merge `overrides` over the default origin settings and push them
    ///
    /// # Errors
    /// [`CdnError::InvalidRequest`] for an empty URL; provider errors pass
    /// through.
    pub async fn configure_origin(
        &self,
        origin_url: &str,
        overrides: Option<OriginOverrides>,
    ) -> Result<OriginConfig, CdnError> {
        if origin_url.trim().is_empty() {
            return Err(CdnError::InvalidRequest("origin url is empty".to_string()));
        }
        let config = OriginConfig {
            origin_url: origin_url.to_string(),
            settings: OriginSettings::default().merged(overrides.unwrap_or_default()),
        };
        self.provider.configure_origin(&config).await?;
        tracing::info!(
            origin = origin_url,
            ttl = config.settings.cache_ttl_secs,
            "Origin configured"
        );
        *self.origin.write() = Some(config.clone());
        Ok(config)
    }

    /// Last origin configuration pushed
    #[must_use]
    pub fn origin(&self) -> Option<OriginConfig> {
        self.origin.read().clone()
    }

    /// Probe `url` through the edge within the configured bound
    ///
    /// Never fails; errors are reported inside the result.
    pub async fn test_response(&self, url: &str) -> ProbeResult {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.probe_timeout(), self.provider.probe(url)).await;
        let response_time_ms = round_2dp(started.elapsed().as_secs_f64() * 1000.0);

        let failed = |message: String, kind: ErrorKind| ProbeResult {
            success: false,
            url: url.to_string(),
            status_code: None,
            response_time_ms,
            cache_state: CacheState::Unknown,
            cache_age_secs: 0,
            content_type: None,
            content_length: 0,
            cache_control: None,
            etag: None,
            last_modified: None,
            error: Some(message),
            error_kind: Some(kind),
        };

        match outcome {
            Err(_) => {
                tracing::warn!("Probe of {} timed out", url);
                failed(
                    format!("no response within {}s", self.config.probe_timeout_secs),
                    ErrorKind::Timeout,
                )
            }
            Ok(Err(err)) => {
                tracing::warn!("Probe of {} failed: {}", url, err);
                failed(err.to_string(), err.kind())
            }
            Ok(Ok(response)) => {
                let cache_state = CacheState::from_header(response.x_cache.as_deref());
                tracing::debug!(url, status = response.status, %cache_state, "Probe answered");
                ProbeResult {
                    success: true,
                    url: url.to_string(),
                    status_code: Some(response.status),
                    response_time_ms,
                    cache_state,
                    cache_age_secs: response.age_secs.unwrap_or(0),
                    content_type: response.content_type,
                    content_length: response.content_length.unwrap_or(0),
                    cache_control: response.cache_control,
                    etag: response.etag,
                    last_modified: response.last_modified,
                    error: None,
                    error_kind: None,
                }
            }
        }
    }

    /// Edge traffic statistics over `range`
    ///
    /// Without a range, covers the last [`StatsRange::DEFAULT_DAYS`] days up
    /// to today (UTC).
    ///
    /// # Errors
    /// [`CdnError::InvalidRequest`] when `start` is after `end`; provider
    /// errors pass through, [`CdnError::Unsupported`] included.
    pub async fn cache_statistics(
        &self,
        range: Option<StatsRange>,
    ) -> Result<CacheStatistics, CdnError> {
        let range = range.unwrap_or_else(|| StatsRange::ending_on(Utc::now().date_naive()));
        if !range.is_ordered() {
            return Err(CdnError::InvalidRequest(format!(
                "statistics range starts {} after it ends {}",
                range.start, range.end
            )));
        }
        let metrics = self.provider.cache_statistics(&range).await?;
        let stats = CacheStatistics::from_metrics(range, metrics);
        tracing::debug!(
            start = %range.start,
            end = %range.end,
            hit_rate = stats.cache_hit_rate,
            "Cache statistics fetched"
        );
        Ok(stats)
    }

    /// Snapshot of a job, in flight or archived
    #[must_use]
    pub fn job(&self, job_id: &PurgeJobId) -> Option<PurgeJob> {
        self.jobs
            .get(job_id)
            .map(|j| j.value().clone())
            .or_else(|| self.history.archived_job(job_id))
    }

    /// Number of jobs still in flight
    #[must_use]
    pub fn tracked_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Jobs that reached a terminal status, oldest first
    #[must_use]
    pub fn archived_jobs(&self) -> Vec<PurgeJob> {
        self.history.archived_jobs()
    }

    /// Copy of the smart purge history
    #[must_use]
    pub fn history(&self) -> Vec<PurgeRecord> {
        self.history.records()
    }

    /// Aggregate over the smart purge history
    #[must_use]
    pub fn purge_statistics(&self) -> PurgeStatistics {
        self.history.statistics()
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
