//! Process-local object store
//!
//! Buckets must be created up front; writes to an unknown bucket are rejected
//! with `NoSuchBucket`, as a real store would.

use crate::error::StorageError;
use crate::store::{
    fingerprint, signed_query, CompletedPart, ObjectInfo, ObjectMetadata, ObjectStore,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    metadata: HashMap<String, String>,
    last_modified: i64,
    etag: String,
}

#[derive(Debug)]
struct MultipartSession {
    bucket: String,
    key: String,
    content_type: String,
    metadata: HashMap<String, String>,
    parts: BTreeMap<u32, Vec<u8>>,
}

/// In-memory [`ObjectStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    buckets: DashSet<String>,
    objects: DashMap<(String, String), StoredObject>,
    uploads: DashMap<String, MultipartSession>,
    next_upload: AtomicU64,
}

impl InMemoryStore {
    /// Empty store without buckets
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given buckets created
    #[must_use]
    pub fn with_buckets<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for bucket in buckets {
            store.create_bucket(bucket);
        }
        store
    }

    /// Create a bucket (idempotent)
    pub fn create_bucket(&self, bucket: impl Into<String>) {
        self.buckets.insert(bucket.into());
    }

    /// Number of stored objects across buckets
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of multipart sessions still open
    #[must_use]
    pub fn open_uploads(&self) -> usize {
        self.uploads.len()
    }

    fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        if self.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(StorageError::rejected(
                "NoSuchBucket",
                format!("bucket does not exist: {bucket}"),
            ))
        }
    }

    fn store(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: String,
        metadata: HashMap<String, String>,
        etag: String,
    ) {
        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type,
                metadata,
                last_modified: now_epoch_secs(),
                etag,
            },
        );
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.ensure_bucket(bucket)?;
        self.store(
            bucket,
            key,
            data.to_vec(),
            content_type.to_string(),
            metadata.clone(),
            fingerprint(data),
        );
        Ok(())
    }

    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, StorageError> {
        self.ensure_bucket(bucket)?;
        let upload_id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::Relaxed));
        self.uploads.insert(
            upload_id.clone(),
            MultipartSession {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> Result<CompletedPart, StorageError> {
        let mut session = self
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::UnknownUpload(upload_id.to_string()))?;
        session.parts.insert(part_number, data.to_vec());
        Ok(CompletedPart {
            part_number,
            etag: fingerprint(data),
        })
    }

    async fn complete_multipart(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        let (_, session) = self
            .uploads
            .remove(upload_id)
            .ok_or_else(|| StorageError::UnknownUpload(upload_id.to_string()))?;

        let mut data = Vec::new();
        for part in parts {
            let bytes = session.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::rejected(
                    "InvalidPart",
                    format!("part {} was never uploaded", part.part_number),
                )
            })?;
            data.extend_from_slice(bytes);
        }

        let etag = format!("{}-{}", fingerprint(&data), parts.len());
        self.store(
            &session.bucket,
            &session.key,
            data,
            session.content_type,
            session.metadata,
            etag,
        );
        Ok(())
    }

    async fn abort_multipart(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.uploads.remove(upload_id);
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        self.ensure_bucket(bucket)?;
        let object = self
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| StorageError::not_found(bucket, key))?;
        Ok(ObjectMetadata {
            size: object.data.len() as u64,
            content_type: Some(object.content_type.clone()),
            last_modified: Some(object.last_modified),
            etag: Some(object.etag.clone()),
            user_metadata: object.metadata.clone(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.ensure_bucket(bucket)?;
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        self.ensure_bucket(bucket)?;
        let mut listed: Vec<ObjectInfo> = self
            .objects
            .iter()
            .filter(|e| e.key().0 == bucket && e.key().1.starts_with(prefix))
            .map(|e| ObjectInfo {
                key: e.key().1.clone(),
                size: e.value().data.len() as u64,
                last_modified: Some(e.value().last_modified),
                etag: Some(e.value().etag.clone()),
            })
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        listed.truncate(max_keys);
        Ok(listed)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.ensure_bucket(bucket)?;
        self.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        self.ensure_bucket(source_bucket)?;
        self.ensure_bucket(dest_bucket)?;
        let object = self
            .objects
            .get(&(source_bucket.to_string(), source_key.to_string()))
            .map(|o| o.value().clone())
            .ok_or_else(|| StorageError::not_found(source_bucket, source_key))?;
        self.objects
            .insert((dest_bucket.to_string(), dest_key.to_string()), object);
        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("memory://{bucket}/{key}")
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        self.head_object(bucket, key).await?;
        Ok(format!(
            "{}?{}",
            self.object_url(bucket, key),
            signed_query(bucket, key, expires_in)
        ))
    }
}

fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_bucket_is_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .put_object("missing", "k", b"x", "text/plain", &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("NoSuchBucket"));
    }

    #[tokio::test]
    async fn multipart_assembles_in_part_order() {
        let store = InMemoryStore::with_buckets(["b"]);
        let id = store
            .create_multipart("b", "k", "application/octet-stream", &HashMap::new())
            .await
            .unwrap();
        let p2 = store.upload_part("b", "k", &id, 2, b"world").await.unwrap();
        let p1 = store.upload_part("b", "k", &id, 1, b"hello ").await.unwrap();
        store.complete_multipart("b", "k", &id, &[p1, p2]).await.unwrap();

        assert_eq!(store.get_object("b", "k").await.unwrap(), b"hello world");
        assert_eq!(store.open_uploads(), 0);
        let meta = store.head_object("b", "k").await.unwrap();
        assert!(meta.etag.unwrap().ends_with("-2"));
    }

    #[tokio::test]
    async fn list_copy_delete() {
        let store = InMemoryStore::with_buckets(["b"]);
        let meta = HashMap::new();
        store.put_object("b", "img/a.png", b"a", "image/png", &meta).await.unwrap();
        store.put_object("b", "img/b.png", b"bb", "image/png", &meta).await.unwrap();
        store.put_object("b", "css/site.css", b"c", "text/css", &meta).await.unwrap();

        let listed = store.list_objects("b", "img/", 10).await.unwrap();
        assert_eq!(
            listed.iter().map(|o| o.key.as_str()).collect::<Vec<_>>(),
            vec!["img/a.png", "img/b.png"]
        );
        assert_eq!(store.list_objects("b", "", 1).await.unwrap().len(), 1);

        store.copy_object("b", "img/a.png", "b", "backup/a.png").await.unwrap();
        assert_eq!(store.get_object("b", "backup/a.png").await.unwrap(), b"a");

        store.delete_object("b", "img/a.png").await.unwrap();
        assert!(matches!(
            store.head_object("b", "img/a.png").await,
            Err(StorageError::NotFound { .. })
        ));
    }
}
