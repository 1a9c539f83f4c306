//! Assets and object keys
//!
//! An [`ObjectKey`] is the bucket-relative path an asset is written to. Keys
//! are case-preserving and always use `/` as the separator, whatever the
//! separator of the source path was.

use crate::error::{ErrorKind, Failure};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Errors building an [`ObjectKey`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Nothing left after normalization
    #[error("object key is empty")]
    Empty,

    /// `..` would escape the bucket prefix
    #[error("object key may not contain '..': {0}")]
    ParentSegment(String),

    /// Path outside the source root or absolute
    #[error("path is not relative to the source root: {0}")]
    NotRelative(PathBuf),
}

/// Bucket-relative object key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Normalize a raw key
    ///
    /// Backslashes become `/`, empty and `.` segments are dropped.
    ///
    /// # Errors
    /// - [`KeyError::Empty`] if no segment remains
    /// - [`KeyError::ParentSegment`] if any segment is `..`
    pub fn new(raw: &str) -> Result<Self, KeyError> {
        let unified = raw.replace('\\', "/");
        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(KeyError::ParentSegment(raw.to_string())),
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    /// Build a key from a path relative to a source root
    ///
    /// # Errors
    /// [`KeyError::NotRelative`] for absolute paths, prefixes or `..`
    pub fn from_relative_path(path: &Path) -> Result<Self, KeyError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(KeyError::NotRelative(path.to_path_buf())),
            }
        }
        Self::new(&segments.join("/"))
    }

    /// Key under a prefix, e.g. `originals` + `photo.jpg`
    ///
    /// # Errors
    /// Same as [`ObjectKey::new`]
    pub fn join(prefix: &str, name: &str) -> Result<Self, KeyError> {
        Self::new(&format!("{prefix}/{name}"))
    }

    /// Key as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Extension of the last segment, without the dot
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Replace (or add) the extension of the last segment
    #[must_use]
    pub fn with_extension(&self, ext: &str) -> Self {
        let ext = ext.trim_start_matches('.');
        let name = self.file_name();
        let stem = match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        };
        let dir_len = self.0.len() - name.len();
        let mut key = String::with_capacity(self.0.len() + ext.len() + 1);
        key.push_str(&self.0[..dir_len]);
        key.push_str(stem);
        if !ext.is_empty() {
            key.push('.');
            key.push_str(ext);
        }
        Self(key)
    }

    /// Path submitted to CDN purges: `/` + key
    #[must_use]
    pub fn cdn_path(&self) -> String {
        format!("/{}", self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors loading an asset
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// Source could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source path does not map to a valid key
    #[error("invalid object key: {0}")]
    InvalidKey(#[from] KeyError),
}

impl AssetError {
    /// All asset errors are local input problems
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::LocalInput
    }

    /// Convert into a reportable failure
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

/// One logical file moving through the pipeline
#[derive(Debug, Clone)]
pub struct Asset {
    source: PathBuf,
    key: ObjectKey,
    payload: Vec<u8>,
}

impl Asset {
    /// Create an asset from bytes already in memory
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, key: ObjectKey, payload: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            key,
            payload,
        }
    }

    /// Read an asset from disk
    ///
    /// # Errors
    /// [`AssetError::Io`] if the file cannot be read
    pub async fn load(source: impl Into<PathBuf>, key: ObjectKey) -> Result<Self, AssetError> {
        let source = source.into();
        let payload = tokio::fs::read(&source)
            .await
            .map_err(|e| AssetError::Io {
                path: source.clone(),
                source: e,
            })?;
        Ok(Self {
            source,
            key,
            payload,
        })
    }

    /// Source path on disk
    #[inline]
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Target object key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Current payload
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Whether the payload is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// File stem of the source path, falling back to the key
    #[must_use]
    pub fn stem(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.key.with_extension("").file_name().to_string())
    }

    /// Swap in a transformed payload, optionally rewriting the key extension
    pub fn replace_payload(&mut self, payload: Vec<u8>, extension: Option<&str>) {
        self.payload = payload;
        if let Some(ext) = extension {
            self.key = self.key.with_extension(ext);
        }
    }

    /// Consume the asset, returning its payload
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
