//! Purge and probe types

use chrono::{DateTime, Days, NaiveDate, Utc};
use mdp_model::{ErrorKind, Failure};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Seconds of edge propagation estimated per purged path
pub const PURGE_SECONDS_PER_PATH: u64 = 2;

/// What a purge request targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "pattern", rename_all = "snake_case")]
pub enum PurgeMode {
    /// The listed paths
    Paths,
    /// Every cached object of the service
    All,
    /// Every path matching a glob such as `/images/*.jpg`
    Pattern(String),
}

impl fmt::Display for PurgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paths => f.write_str("path"),
            Self::All => f.write_str("all"),
            Self::Pattern(p) => write!(f, "pattern({p})"),
        }
    }
}

/// Lifecycle of a purge job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeStatus {
    /// Accepted, not yet started
    Pending,
    /// Propagating to edges
    InProgress,
    /// Done everywhere
    Completed,
    /// Provider gave up
    Failed,
}

impl PurgeStatus {
    /// Completed or failed
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PurgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque purge job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurgeJobId(String);

impl PurgeJobId {
    /// Fresh identifier, unique within the process
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("purge_{}", Ulid::new()))
    }

    /// Borrow as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PurgeJobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PurgeJobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PurgeJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request handed to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeRequest {
    /// Engine-assigned job id
    pub job_id: PurgeJobId,
    /// Purge scope
    pub mode: PurgeMode,
    /// Paths for [`PurgeMode::Paths`], each starting with `/`
    pub paths: Vec<String>,
}

/// Provider answer to a status poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeStatusReport {
    /// Current status
    pub status: PurgeStatus,
    /// Progress, when the provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    /// Failure reason for [`PurgeStatus::Failed`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PurgeStatusReport {
    /// Report with status only
    #[must_use]
    pub fn new(status: PurgeStatus) -> Self {
        Self {
            status,
            progress_percent: None,
            error: None,
        }
    }

    /// Failed report with a reason
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: PurgeStatus::Failed,
            progress_percent: None,
            error: Some(reason.into()),
        }
    }

    /// Set progress
    #[inline]
    #[must_use]
    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress_percent = Some(percent.min(100));
        self
    }
}

/// A tracked purge job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeJob {
    /// Job id
    pub id: PurgeJobId,
    /// Last known status
    pub status: PurgeStatus,
    /// Purge scope
    pub mode: PurgeMode,
    /// Requested paths
    pub paths: Vec<String>,
    /// When the request was accepted
    pub created_at: DateTime<Utc>,
    /// Expected propagation time
    pub estimated_seconds: u64,
}

impl PurgeJob {
    /// Number of paths requested
    #[inline]
    #[must_use]
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }
}

/// Terminal result of waiting on a purge job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurgeOutcome {
    /// Provider reported completion
    Completed {
        /// Job id
        job_id: PurgeJobId,
        /// Time spent waiting
        elapsed_ms: u64,
    },
    /// Provider reported failure
    Failed {
        /// Job id
        job_id: PurgeJobId,
        /// Provider reason
        reason: String,
    },
    /// Deadline passed before a terminal status
    TimedOut {
        /// Job id
        job_id: PurgeJobId,
        /// Status seen on the last poll
        last_status: PurgeStatus,
    },
    /// A poll itself failed
    Error {
        /// Job id
        job_id: PurgeJobId,
        /// Poll failure
        failure: Failure,
    },
}

impl PurgeOutcome {
    /// Whether the purge completed
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Job the outcome belongs to
    #[must_use]
    pub fn job_id(&self) -> &PurgeJobId {
        match self {
            Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::TimedOut { job_id, .. }
            | Self::Error { job_id, .. } => job_id,
        }
    }

    /// Failure record for anything but completion
    #[must_use]
    pub fn to_failure(&self) -> Option<Failure> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { reason, .. } => Some(
                Failure::new(ErrorKind::RemoteRejection, reason.clone()).with_code("PurgeFailed"),
            ),
            Self::TimedOut {
                job_id,
                last_status,
            } => Some(Failure::timeout(format!(
                "purge {job_id} still {last_status} at deadline"
            ))),
            Self::Error { failure, .. } => Some(failure.clone()),
        }
    }
}

/// Result of a change-driven purge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartPurgeResult {
    /// Whether the purge was accepted (or nothing needed purging)
    pub success: bool,
    /// Job created, absent when nothing was purged
    pub job: Option<PurgeJob>,
    /// Number of changed paths
    pub file_count: usize,
    /// Informational message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl SmartPurgeResult {
    /// Id of the created job
    #[must_use]
    pub fn job_id(&self) -> Option<&PurgeJobId> {
        self.job.as_ref().map(|j| &j.id)
    }
}

/// Observed edge cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheState {
    /// Served from edge cache
    Hit,
    /// Fetched from origin
    Miss,
    /// Cache skipped
    Bypass,
    /// No recognizable cache header
    Unknown,
}

impl CacheState {
    /// Classify an `X-Cache` header value such as `TCP_HIT` or `Miss from edge`
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Unknown;
        };
        let upper = value.to_ascii_uppercase();
        if upper.contains("HIT") {
            Self::Hit
        } else if upper.contains("MISS") {
            Self::Miss
        } else if upper.contains("BYPASS") {
            Self::Bypass
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Raw response captured by a provider probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// HTTP status code
    pub status: u16,
    /// `X-Cache` header
    pub x_cache: Option<String>,
    /// `Age` header in seconds
    pub age_secs: Option<u64>,
    /// `Content-Type` header
    pub content_type: Option<String>,
    /// `Content-Length` header
    pub content_length: Option<u64>,
    /// `Cache-Control` header
    pub cache_control: Option<String>,
    /// `ETag` header
    pub etag: Option<String>,
    /// `Last-Modified` header
    pub last_modified: Option<String>,
}

impl ProbeResponse {
    /// Response with a status code and no headers
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Set the `X-Cache` header
    #[inline]
    #[must_use]
    pub fn with_x_cache(mut self, value: impl Into<String>) -> Self {
        self.x_cache = Some(value.into());
        self
    }
}

/// Outcome of a cache probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Whether a response was received
    pub success: bool,
    /// Probed URL
    pub url: String,
    /// HTTP status code
    pub status_code: Option<u16>,
    /// Round trip in milliseconds, two decimals
    pub response_time_ms: f64,
    /// Classified cache state
    pub cache_state: CacheState,
    /// `Age` header, 0 when absent
    pub cache_age_secs: u64,
    /// `Content-Type` header
    pub content_type: Option<String>,
    /// `Content-Length` header, 0 when absent
    pub content_length: u64,
    /// `Cache-Control` header
    pub cache_control: Option<String>,
    /// `ETag` header
    pub etag: Option<String>,
    /// `Last-Modified` header
    pub last_modified: Option<String>,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ProbeResult {
    /// Whether the URL answered `200 OK`
    #[inline]
    #[must_use]
    pub fn is_ok_200(&self) -> bool {
        self.success && self.status_code == Some(200)
    }
}

/// One entry of the purge history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeRecord {
    /// When the purge was requested
    pub timestamp: DateTime<Utc>,
    /// Number of paths purged
    pub file_count: usize,
    /// Job created
    pub job_id: PurgeJobId,
}

/// Aggregate over the purge history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeStatistics {
    /// Purges recorded
    pub total_purges: usize,
    /// Paths across all purges
    pub total_files_purged: usize,
    /// Timestamp of the latest purge
    pub last_purge: Option<DateTime<Utc>>,
}

/// Inclusive day range for edge traffic statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRange {
    /// First day
    pub start: NaiveDate,
    /// Last day
    pub end: NaiveDate,
}

impl StatsRange {
    /// Days covered when no range is given
    pub const DEFAULT_DAYS: u64 = 28;

    /// Range from `start` to `end`, both included
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `DEFAULT_DAYS` days ending on `end`
    #[must_use]
    pub fn ending_on(end: NaiveDate) -> Self {
        let start = end
            .checked_sub_days(Days::new(Self::DEFAULT_DAYS - 1))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// Whether `start` is not after `end`
    #[inline]
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

/// Raw edge traffic counters reported by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Requests served by the edge
    pub total_requests: u64,
    /// Requests answered from cache
    pub cache_hits: u64,
    /// Requests forwarded to the origin
    pub cache_misses: u64,
    /// Bytes sent to clients
    pub bandwidth_bytes: u64,
    /// Mean edge response time
    pub avg_response_time_ms: f64,
}

/// Edge traffic statistics over a day range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Covered days
    pub range: StatsRange,
    /// Percentage of requests answered from cache, two decimals
    pub cache_hit_rate: f64,
    /// Provider counters
    pub metrics: CacheMetrics,
}

impl CacheStatistics {
    /// Derive the hit rate from `metrics`; zero without requests
    #[must_use]
    pub fn from_metrics(range: StatsRange, metrics: CacheMetrics) -> Self {
        let cache_hit_rate = if metrics.total_requests == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = metrics.cache_hits as f64 / metrics.total_requests as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        };
        Self {
            range,
            cache_hit_rate,
            metrics,
        }
    }
}
