//! Transfer engine
//!
//! Wraps an [`ObjectStore`] with strategy selection and retry. The retry loop
//! covers the whole upload call: a transient failure in any part restarts the
//! attempt from scratch, including a fresh multipart session.

use crate::config::TransferConfig;
use crate::content_type::{infer_content_type, DEFAULT_CONTENT_TYPE};
use crate::error::StorageError;
use crate::store::{CompletedPart, ObjectInfo, ObjectMetadata, ObjectStore, MAX_PRESIGN_EXPIRY};
use crate::strategy::{select_strategy, UploadStrategy};
use futures::stream::{self, StreamExt, TryStreamExt};
use mdp_model::{Failure, ObjectKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Payload to upload
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Bytes already in memory
    Bytes(Vec<u8>),
    /// File read at upload time
    Path(PathBuf),
}

/// Outcome of one upload call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Whether the object was written
    pub success: bool,
    /// Target bucket
    pub bucket: String,
    /// Target key
    pub key: String,
    /// Object URL on success
    pub url: Option<String>,
    /// Payload size in bytes
    pub size: u64,
    /// Content type sent to the store
    pub content_type: String,
    /// Strategy used (absent when the payload could not be read)
    pub strategy: Option<UploadStrategy>,
    /// Attempts made
    pub attempts: u32,
    /// Failure details
    pub error: Option<Failure>,
}

impl TransferResult {
    /// Provider error code of a failed upload
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().and_then(|f| f.code.as_deref())
    }
}

/// Outcome of a metadata read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadResult {
    /// Whether the object exists and was read
    pub success: bool,
    /// Bucket queried
    pub bucket: String,
    /// Key queried
    pub key: String,
    /// Metadata on success
    pub metadata: Option<ObjectMetadata>,
    /// Failure details
    pub error: Option<Failure>,
}

/// Upload engine over an object store
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn ObjectStore>,
    config: TransferConfig,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Create engine over `store`
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: TransferConfig) -> Self {
        Self { store, config }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Get the underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload a payload to `bucket/key`
    ///
    /// Never fails: read errors, rejections and exhausted retries all come
    /// back as a result with `success == false`.
    pub async fn upload(
        &self,
        source: UploadSource,
        bucket: &str,
        key: &ObjectKey,
        metadata: Option<&HashMap<String, String>>,
        content_type: Option<&str>,
    ) -> TransferResult {
        let (data, source_path) = match source {
            UploadSource::Bytes(bytes) => (bytes, None),
            UploadSource::Path(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => (bytes, Some(path)),
                Err(e) => {
                    let err =
                        StorageError::LocalInput(format!("cannot read {}: {e}", path.display()));
                    tracing::warn!("Upload of {} skipped: {}", key, err);
                    return TransferResult {
                        success: false,
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        url: None,
                        size: 0,
                        content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
                        strategy: None,
                        attempts: 0,
                        error: Some(err.to_failure()),
                    };
                }
            },
        };

        let content_type = match content_type {
            Some(ct) => ct.to_string(),
            None => resolve_content_type(key, source_path.as_ref()).to_string(),
        };
        let empty = HashMap::new();
        let metadata = metadata.unwrap_or(&empty);
        let size = data.len() as u64;
        let strategy = select_strategy(size, &self.config);
        let policy = self.config.retry;

        tracing::debug!(bucket, key = %key, size, ?strategy, "Selected upload strategy");

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match self
                .attempt_upload(&data, bucket, key.as_str(), &content_type, metadata, strategy)
                .await
            {
                Ok(()) => break Ok(()),
                Err(err) if err.is_retryable() && attempt < policy.attempts() => {
                    let delay = policy.delay_after(attempt);
                    tracing::warn!(
                        "Upload attempt {}/{} for {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        policy.attempts(),
                        bucket,
                        key,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    bucket,
                    key = %key,
                    size,
                    multipart = strategy.is_multipart(),
                    attempts = attempt,
                    "Uploaded object"
                );
                TransferResult {
                    success: true,
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    url: Some(self.store.object_url(bucket, key.as_str())),
                    size,
                    content_type,
                    strategy: Some(strategy),
                    attempts: attempt,
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Upload of {}/{} failed after {} attempt(s): {}",
                    bucket,
                    key,
                    attempt,
                    err
                );
                TransferResult {
                    success: false,
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    url: None,
                    size,
                    content_type,
                    strategy: Some(strategy),
                    attempts: attempt,
                    error: Some(err.to_failure()),
                }
            }
        }
    }

    async fn attempt_upload(
        &self,
        data: &[u8],
        bucket: &str,
        key: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
        strategy: UploadStrategy,
    ) -> Result<(), StorageError> {
        match strategy {
            UploadStrategy::SinglePut => {
                self.store
                    .put_object(bucket, key, data, content_type, metadata)
                    .await
            }
            UploadStrategy::Multipart {
                part_size,
                concurrency,
                ..
            } => {
                self.upload_multipart(data, bucket, key, content_type, metadata, part_size, concurrency)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_multipart(
        &self,
        data: &[u8],
        bucket: &str,
        key: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
        part_size: u64,
        concurrency: usize,
    ) -> Result<(), StorageError> {
        let upload_id = self
            .store
            .create_multipart(bucket, key, content_type, metadata)
            .await?;

        let chunk_len = usize::try_from(part_size).unwrap_or(usize::MAX).max(1);
        let store = &self.store;
        let upload_id_ref = upload_id.as_str();

        let uploaded: Result<Vec<CompletedPart>, StorageError> =
            stream::iter(data.chunks(chunk_len).enumerate())
                .map(|(idx, chunk)| async move {
                    let part_number = u32::try_from(idx + 1).map_err(|_| {
                        StorageError::LocalInput("payload has too many parts".to_string())
                    })?;
                    store
                        .upload_part(bucket, key, upload_id_ref, part_number, chunk)
                        .await
                })
                .boxed()
                .buffer_unordered(concurrency.max(1))
                .try_collect()
                .await;

        let finished = match uploaded {
            Ok(mut parts) => {
                parts.sort_by_key(|p| p.part_number);
                self.store
                    .complete_multipart(bucket, key, &upload_id, &parts)
                    .await
            }
            Err(err) => Err(err),
        };

        if let Err(err) = finished {
            if let Err(abort_err) = self.store.abort_multipart(bucket, key, &upload_id).await {
                tracing::warn!("Abort of multipart upload {} failed: {}", upload_id, abort_err);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Read object metadata
    pub async fn head(&self, bucket: &str, key: &ObjectKey) -> HeadResult {
        match self.store.head_object(bucket, key.as_str()).await {
            Ok(metadata) => HeadResult {
                success: true,
                bucket: bucket.to_string(),
                key: key.to_string(),
                metadata: Some(metadata),
                error: None,
            },
            Err(err) => {
                tracing::debug!("HEAD {}/{} failed: {}", bucket, key, err);
                HeadResult {
                    success: false,
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    metadata: None,
                    error: Some(err.to_failure()),
                }
            }
        }
    }

    /// Read an object back
    ///
    /// # Errors
    /// Store errors pass through unchanged
    pub async fn download(&self, bucket: &str, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        self.store.get_object(bucket, key.as_str()).await
    }

    /// List objects under a prefix
    ///
    /// # Errors
    /// Store errors pass through unchanged
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        self.store.list_objects(bucket, prefix, max_keys).await
    }

    /// Delete an object
    ///
    /// # Errors
    /// Store errors pass through unchanged
    pub async fn delete(&self, bucket: &str, key: &ObjectKey) -> Result<(), StorageError> {
        self.store.delete_object(bucket, key.as_str()).await
    }

    /// Copy an object
    ///
    /// # Errors
    /// Store errors pass through unchanged
    pub async fn copy(
        &self,
        source_bucket: &str,
        source_key: &ObjectKey,
        dest_bucket: &str,
        dest_key: &ObjectKey,
    ) -> Result<(), StorageError> {
        self.store
            .copy_object(
                source_bucket,
                source_key.as_str(),
                dest_bucket,
                dest_key.as_str(),
            )
            .await
    }

    /// Time-limited download URL for `bucket/key`
    ///
    /// # Errors
    /// [`StorageError::LocalInput`] unless `expires_in` is between one second
    /// and seven days; store errors pass through, a missing object included.
    pub async fn presigned_url(
        &self,
        bucket: &str,
        key: &ObjectKey,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        if expires_in.as_secs() == 0 || expires_in > MAX_PRESIGN_EXPIRY {
            return Err(StorageError::LocalInput(format!(
                "presigned url lifetime {}s outside 1..={}s",
                expires_in.as_secs(),
                MAX_PRESIGN_EXPIRY.as_secs()
            )));
        }
        let url = self
            .store
            .presigned_url(bucket, key.as_str(), expires_in)
            .await?;
        tracing::debug!(
            bucket,
            key = %key,
            expires_secs = expires_in.as_secs(),
            "Presigned URL issued"
        );
        Ok(url)
    }
}

fn resolve_content_type(key: &ObjectKey, source: Option<&PathBuf>) -> &'static str {
    let from_key = infer_content_type(key.as_str());
    if from_key != DEFAULT_CONTENT_TYPE {
        return from_key;
    }
    source
        .map(|p| infer_content_type(&p.to_string_lossy()))
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
