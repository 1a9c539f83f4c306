//! Storage errors
//!
//! Every store implementation maps its native failures onto these variants so
//! the engine can decide which ones to retry.

use mdp_model::{ErrorKind, Failure};

/// Errors returned by [`ObjectStore`](crate::ObjectStore) implementations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Connection reset, throttling, server-side 5xx
    #[error("transient network error: {message}")]
    Transient {
        code: Option<String>,
        message: String,
    },

    /// Request refused by the store
    #[error("request rejected [{code}]: {message}")]
    Rejected { code: String, message: String },

    /// Object does not exist
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Multipart session id not known to the store
    #[error("unknown multipart upload: {0}")]
    UnknownUpload(String),

    /// Local payload could not be read or is invalid
    #[error("local input error: {0}")]
    LocalInput(String),
}

impl StorageError {
    /// Transient error without a provider code
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            code: None,
            message: message.into(),
        }
    }

    /// Rejection with a provider code
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Missing object
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Failure classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::TransientNetwork,
            Self::Rejected { .. } | Self::NotFound { .. } | Self::UnknownUpload(_) => {
                ErrorKind::RemoteRejection
            }
            Self::LocalInput(_) => ErrorKind::LocalInput,
        }
    }

    /// Whether the engine should retry
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Provider error code, if any
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Transient { code, .. } => code.as_deref(),
            Self::Rejected { code, .. } => Some(code),
            Self::NotFound { .. } => Some("NoSuchKey"),
            Self::UnknownUpload(_) => Some("NoSuchUpload"),
            Self::LocalInput(_) => None,
        }
    }

    /// Convert into a reportable failure
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        let failure = Failure::new(self.kind(), self.to_string());
        match self.code() {
            Some(code) => failure.with_code(code),
            None => failure,
        }
    }
}
