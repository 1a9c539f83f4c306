//! Testing utilities for media-deploy
//!
//! Deterministic stand-ins for the three external collaborators plus small
//! fixtures for source trees.

#![allow(missing_docs)]

use async_trait::async_trait;
use mdp_cdn::{
    CacheMetrics, CdnError, CdnProvider, OriginConfig, ProbeResponse, PurgeJobId, PurgeRequest,
    PurgeStatus, PurgeStatusReport, StatsRange,
};
use mdp_optimizer::{CodecError, EncodedImage, ImageCodec, TransformParams};
use mdp_transfer::{
    CompletedPart, InMemoryStore, ObjectInfo, ObjectMetadata, ObjectStore, StorageError,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// In-memory store that fails on demand and counts calls
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    transient_failures: AtomicU32,
    rejected_fragments: Mutex<Vec<String>>,
    part_delay: Option<Duration>,
    put_calls: AtomicUsize,
    multipart_sessions: AtomicUsize,
    part_calls: AtomicUsize,
    aborts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FlakyStore {
    pub fn new<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: InMemoryStore::with_buckets(buckets),
            ..Self::default()
        }
    }

    /// Fail the next `n` puts or part uploads with a transient error
    #[must_use]
    pub fn fail_transiently(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Reject writes whose key contains `fragment`
    #[must_use]
    pub fn reject_keys_containing(self, fragment: impl Into<String>) -> Self {
        self.rejected_fragments.lock().push(fragment.into());
        self
    }

    /// Hold each part upload for `delay`
    #[must_use]
    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn multipart_sessions(&self) -> usize {
        self.multipart_sessions.load(Ordering::SeqCst)
    }

    pub fn part_calls(&self) -> usize {
        self.part_calls.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_transient(&self) -> Result<(), StorageError> {
        let took = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(StorageError::Transient {
                code: Some("SlowDown".to_string()),
                message: "injected transient failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn check_rejected(&self, key: &str) -> Result<(), StorageError> {
        if self.rejected_fragments.lock().iter().any(|f| key.contains(f.as_str())) {
            Err(StorageError::rejected("AccessDenied", format!("write to {key} denied")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.check_rejected(key)?;
        self.take_transient()?;
        self.inner
            .put_object(bucket, key, data, content_type, metadata)
            .await
    }

    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, StorageError> {
        self.multipart_sessions.fetch_add(1, Ordering::SeqCst);
        self.check_rejected(key)?;
        self.inner
            .create_multipart(bucket, key, content_type, metadata)
            .await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> Result<CompletedPart, StorageError> {
        self.part_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.part_delay {
            tokio::time::sleep(delay).await;
        }
        let result = match self.take_transient() {
            Ok(()) => {
                self.inner
                    .upload_part(bucket, key, upload_id, part_number, data)
                    .await
            }
            Err(e) => Err(e),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        self.inner
            .complete_multipart(bucket, key, upload_id, parts)
            .await
    }

    async fn abort_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort_multipart(bucket, key, upload_id).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        self.inner.head_object(bucket, key).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get_object(bucket, key).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        self.inner.list_objects(bucket, prefix, max_keys).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.inner.delete_object(bucket, key).await
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        self.inner
            .copy_object(source_bucket, source_key, dest_bucket, dest_key)
            .await
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("https://storage.test/{bucket}/{key}")
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        self.inner.head_object(bucket, key).await?;
        Ok(format!(
            "{}?expires_in={}",
            self.object_url(bucket, key),
            expires_in.as_secs()
        ))
    }
}

// ---------------------------------------------------------------------------
// CDN
// ---------------------------------------------------------------------------

/// CDN provider replaying scripted poll answers
///
/// Each poll consumes one scripted report; the last one repeats. With no
/// script every poll reports completed.
#[derive(Debug)]
pub struct ScriptedCdn {
    initial: PurgeStatus,
    script: Mutex<VecDeque<PurgeStatusReport>>,
    purge_error: Option<CdnError>,
    probe: Result<ProbeResponse, CdnError>,
    probe_delay: Option<Duration>,
    metrics: Option<CacheMetrics>,
    stats_ranges: Mutex<Vec<StatsRange>>,
    requests: Mutex<Vec<PurgeRequest>>,
    origins: Mutex<Vec<OriginConfig>>,
    polls: AtomicUsize,
    probes: AtomicUsize,
}

impl Default for ScriptedCdn {
    fn default() -> Self {
        Self {
            initial: PurgeStatus::InProgress,
            script: Mutex::new(VecDeque::new()),
            purge_error: None,
            probe: Ok(ProbeResponse::with_status(200).with_x_cache("HIT")),
            probe_delay: None,
            metrics: None,
            stats_ranges: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            origins: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }
}

impl ScriptedCdn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll answers, in order
    #[must_use]
    pub fn with_statuses<I>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = PurgeStatus>,
    {
        self.with_reports(statuses.into_iter().map(PurgeStatusReport::new))
    }

    /// Full poll reports, in order
    #[must_use]
    pub fn with_reports<I>(self, reports: I) -> Self
    where
        I: IntoIterator<Item = PurgeStatusReport>,
    {
        self.script.lock().extend(reports);
        self
    }

    #[must_use]
    pub fn with_initial_status(mut self, status: PurgeStatus) -> Self {
        self.initial = status;
        self
    }

    #[must_use]
    pub fn with_purge_error(mut self, err: CdnError) -> Self {
        self.purge_error = Some(err);
        self
    }

    #[must_use]
    pub fn with_probe(mut self, response: ProbeResponse) -> Self {
        self.probe = Ok(response);
        self
    }

    #[must_use]
    pub fn with_probe_error(mut self, err: CdnError) -> Self {
        self.probe = Err(err);
        self
    }

    /// Delay every probe answer
    #[must_use]
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    /// Traffic counters answered for every statistics range
    #[must_use]
    pub fn with_cache_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn stats_ranges(&self) -> Vec<StatsRange> {
        self.stats_ranges.lock().clone()
    }

    pub fn purge_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn purge_requests(&self) -> Vec<PurgeRequest> {
        self.requests.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn origins(&self) -> Vec<OriginConfig> {
        self.origins.lock().clone()
    }
}

#[async_trait]
impl CdnProvider for ScriptedCdn {
    async fn request_purge(&self, request: &PurgeRequest) -> Result<PurgeStatus, CdnError> {
        self.requests.lock().push(request.clone());
        match &self.purge_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.initial),
        }
    }

    async fn poll_status(&self, _job_id: &PurgeJobId) -> Result<PurgeStatusReport, CdnError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        let report = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        Ok(report.unwrap_or_else(|| PurgeStatusReport::new(PurgeStatus::Completed)))
    }

    async fn probe(&self, _url: &str) -> Result<ProbeResponse, CdnError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        self.probe.clone()
    }

    async fn configure_origin(&self, config: &OriginConfig) -> Result<(), CdnError> {
        self.origins.lock().push(config.clone());
        Ok(())
    }

    async fn cache_statistics(&self, range: &StatsRange) -> Result<CacheMetrics, CdnError> {
        self.stats_ranges.lock().push(*range);
        self.metrics
            .clone()
            .ok_or(CdnError::Unsupported("cache statistics"))
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Payloads starting with this prefix fail to decode
pub const CORRUPT_MARKER: &[u8] = b"CORRUPT";

/// Codec that halves its input and reports the requested bounds
#[derive(Debug, Default)]
pub struct FakeCodec {
    calls: AtomicUsize,
}

impl FakeCodec {
    pub const SOURCE_WIDTH: u32 = 4000;
    pub const SOURCE_HEIGHT: u32 = 3000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageCodec for FakeCodec {
    fn transform(&self, input: &[u8], params: &TransformParams) -> Result<EncodedImage, CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if input.is_empty() || input.starts_with(CORRUPT_MARKER) {
            return Err(CodecError::Decode("not an image".to_string()));
        }
        let keep = input.len().div_ceil(2);
        Ok(EncodedImage {
            bytes: input[..keep].to_vec(),
            width: params.max_width.map_or(Self::SOURCE_WIDTH, |w| w.min(Self::SOURCE_WIDTH)),
            height: params
                .max_height
                .map_or(Self::SOURCE_HEIGHT, |h| h.min(Self::SOURCE_HEIGHT)),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Write `files` (relative path, bytes) under `root`
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel, bytes) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }
}
