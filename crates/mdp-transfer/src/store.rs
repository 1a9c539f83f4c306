//! Object store capability
//!
//! The engine never speaks a wire protocol itself; it drives an
//! [`ObjectStore`]. Implementations map their native failures onto
//! [`StorageError`] so retry decisions stay in the engine.

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Lifetime of a presigned URL when the caller does not pick one
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(3600);

/// Longest accepted presigned URL lifetime (7 days)
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 3600);

/// Metadata returned by a HEAD request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Object size in bytes
    pub size: u64,
    /// Stored content type
    pub content_type: Option<String>,
    /// Last modified timestamp (Unix epoch seconds)
    pub last_modified: Option<i64>,
    /// Entity tag
    pub etag: Option<String>,
    /// User-defined metadata
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds)
    pub last_modified: Option<i64>,
    /// Entity tag
    pub etag: Option<String>,
}

/// Receipt for one uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: u32,
    /// Part entity tag
    pub etag: String,
}

/// Storage operations consumed by the transfer engine
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a whole object in one request
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StorageError>;

    /// Open a multipart session, returning its upload id
    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, StorageError>;

    /// Upload one part of an open session
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> Result<CompletedPart, StorageError>;

    /// Finalize a session; `parts` is sorted by part number
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError>;

    /// Discard a session and its parts
    async fn abort_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;

    /// Read object metadata; [`StorageError::NotFound`] when absent
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError>;

    /// Read a whole object
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// List objects under a prefix, sorted by key
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Delete an object (deleting a missing object succeeds)
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Server-side copy
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError>;

    /// Public URL of an object
    fn object_url(&self, bucket: &str, key: &str) -> String;

    /// Time-limited download URL for an existing object
    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;
}

/// `expires=<epoch secs>&signature=<fingerprint>` query used by the bundled stores
pub(crate) fn signed_query(bucket: &str, key: &str, expires_in: Duration) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    let expires = now.saturating_add(expires_in.as_secs());
    let signature = fingerprint(format!("{bucket}/{key}:{expires}").as_bytes());
    format!("expires={expires}&signature={signature}")
}

/// Weak content fingerprint used as an etag by the bundled stores
pub(crate) fn fingerprint(data: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
