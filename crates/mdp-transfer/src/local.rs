//! Filesystem-backed object store
//!
//! Objects live at `<root>/<bucket>/<key>`. Content type and user metadata are
//! kept in JSON sidecars under `<root>/.mdp/meta`, multipart parts under
//! `<root>/.mdp/uploads/<upload_id>`. Buckets are created on first write.

use crate::error::StorageError;
use crate::store::{
    fingerprint, signed_query, CompletedPart, ObjectInfo, ObjectMetadata, ObjectStore,
};
use async_trait::async_trait;
use mdp_model::ObjectKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};

const STATE_DIR: &str = ".mdp";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    etag: String,
}

/// [`ObjectStore`] writing into a local directory
#[derive(Debug)]
pub struct LocalDirStore {
    root: PathBuf,
    next_upload: AtomicU64,
}

impl LocalDirStore {
    /// Store rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_upload: AtomicU64::new(0),
        }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let bucket = checked_segment(bucket)?;
        let key = ObjectKey::new(key).map_err(|e| StorageError::LocalInput(e.to_string()))?;
        Ok(self.root.join(bucket).join(key.as_str()))
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let bucket = checked_segment(bucket)?;
        let key = ObjectKey::new(key).map_err(|e| StorageError::LocalInput(e.to_string()))?;
        Ok(self
            .root
            .join(STATE_DIR)
            .join("meta")
            .join(bucket)
            .join(format!("{}.json", key.as_str())))
    }

    fn upload_dir(&self, upload_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self
            .root
            .join(STATE_DIR)
            .join("uploads")
            .join(checked_segment(upload_id)?))
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        sidecar: &Sidecar,
    ) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        write_file(&path, data).await?;

        let sidecar_json = serde_json::to_vec(sidecar)
            .map_err(|e| StorageError::LocalInput(format!("sidecar encoding failed: {e}")))?;
        write_file(&self.sidecar_path(bucket, key)?, &sidecar_json).await
    }

    async fn read_sidecar(&self, bucket: &str, key: &str) -> Sidecar {
        let Ok(path) = self.sidecar_path(bucket, key) else {
            return Sidecar::default();
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Sidecar::default(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            metadata: metadata.clone(),
            etag: fingerprint(data),
        };
        self.write_object(bucket, key, data, &sidecar).await
    }

    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<String, StorageError> {
        self.object_path(bucket, key)?;
        let upload_id = format!(
            "upload-{}-{}",
            std::process::id(),
            self.next_upload.fetch_add(1, Ordering::Relaxed)
        );
        let dir = self.upload_dir(&upload_id)?;
        let session = serde_json::to_vec(&Sidecar {
            content_type: content_type.to_string(),
            metadata: metadata.clone(),
            etag: String::new(),
        })
        .map_err(|e| StorageError::LocalInput(format!("session encoding failed: {e}")))?;
        write_file(&dir.join("session.json"), &session).await?;
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
        let dir = self.upload_dir(upload_id)?;
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(StorageError::UnknownUpload(upload_id.to_string()));
        }
        write_file(&dir.join(format!("part-{part_number:05}")), data).await?;
        Ok(CompletedPart {
            part_number,
            etag: fingerprint(data),
        })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        let dir = self.upload_dir(upload_id)?;
        let session_bytes = tokio::fs::read(dir.join("session.json"))
            .await
            .map_err(|_| StorageError::UnknownUpload(upload_id.to_string()))?;
        let mut sidecar: Sidecar = serde_json::from_slice(&session_bytes).unwrap_or_default();

        let mut data = Vec::new();
        for part in parts {
            let path = dir.join(format!("part-{:05}", part.part_number));
            let bytes = tokio::fs::read(&path).await.map_err(|_| {
                StorageError::rejected(
                    "InvalidPart",
                    format!("part {} was never uploaded", part.part_number),
                )
            })?;
            data.extend_from_slice(&bytes);
        }

        sidecar.etag = format!("{}-{}", fingerprint(&data), parts.len());
        self.write_object(bucket, key, &data, &sidecar).await?;
        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }

    async fn abort_multipart(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(self.upload_dir(upload_id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(e, upload_id)),
        }
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        let path = self.object_path(bucket, key)?;
        let meta = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                StorageError::not_found(bucket, key)
            } else {
                map_io(e, key)
            }
        })?;
        if !meta.is_file() {
            return Err(StorageError::not_found(bucket, key));
        }
        let sidecar = self.read_sidecar(bucket, key).await;
        Ok(ObjectMetadata {
            size: meta.len(),
            content_type: (!sidecar.content_type.is_empty()).then_some(sidecar.content_type),
            last_modified: modified_epoch_secs(&meta),
            etag: (!sidecar.etag.is_empty()).then_some(sidecar.etag),
            user_metadata: sidecar.metadata,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                StorageError::not_found(bucket, key)
            } else {
                map_io(e, key)
            }
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let bucket_root = self.root.join(checked_segment(bucket)?);
        let mut listed = Vec::new();
        let mut pending = vec![bucket_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == IoErrorKind::NotFound => continue,
                Err(e) => return Err(map_io(e, bucket)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(e, bucket))? {
                let path = entry.path();
                let meta = entry.metadata().await.map_err(|e| map_io(e, bucket))?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_root) else {
                    continue;
                };
                let Ok(key) = ObjectKey::from_relative_path(relative) else {
                    continue;
                };
                if !key.as_str().starts_with(prefix) {
                    continue;
                }
                let etag = self.read_sidecar(bucket, key.as_str()).await.etag;
                listed.push(ObjectInfo {
                    key: key.to_string(),
                    size: meta.len(),
                    last_modified: modified_epoch_secs(&meta),
                    etag: (!etag.is_empty()).then_some(etag),
                });
            }
        }

        listed.sort_by(|a, b| a.key.cmp(&b.key));
        listed.truncate(max_keys);
        Ok(listed)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        for path in [self.object_path(bucket, key)?, self.sidecar_path(bucket, key)?] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => return Err(map_io(e, key)),
            }
        }
        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        let data = self.get_object(source_bucket, source_key).await?;
        let sidecar = self.read_sidecar(source_bucket, source_key).await;
        self.write_object(dest_bucket, dest_key, &data, &sidecar).await
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("file://{}/{bucket}/{key}", self.root.display())
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

fn checked_segment(segment: &str) -> Result<&str, StorageError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment == STATE_DIR
        || segment.contains(['/', '\\'])
    {
        return Err(StorageError::LocalInput(format!(
            "invalid path segment: {segment:?}"
        )));
    }
    Ok(segment)
}

async fn write_file(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| map_io(e, &parent.display().to_string()))?;
    }
    tokio::fs::write(path, data)
        .await
        .map_err(|e| map_io(e, &path.display().to_string()))
}

fn map_io(err: std::io::Error, subject: &str) -> StorageError {
    match err.kind() {
        IoErrorKind::PermissionDenied => {
            StorageError::rejected("AccessDenied", format!("{subject}: {err}"))
        }
        IoErrorKind::NotFound => StorageError::rejected("NotFound", format!("{subject}: {err}")),
        _ => StorageError::transient(format!("{subject}: {err}")),
    }
}

fn modified_epoch_secs(meta: &std::fs::Metadata) -> Option<i64> {
    meta.modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
}
