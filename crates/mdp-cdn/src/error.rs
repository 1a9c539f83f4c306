//! CDN errors

use mdp_model::{ErrorKind, Failure};

/// Errors raised by [`CdnProvider`](crate::CdnProvider) implementations and
/// the invalidation engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CdnError {
    /// Connection failure or provider-side 5xx
    #[error("transient CDN error: {message}")]
    Transient {
        code: Option<String>,
        message: String,
    },

    /// Request refused by the provider
    #[error("CDN request rejected [{code}]: {message}")]
    Rejected { code: String, message: String },

    /// Operation did not finish within its bound
    #[error("CDN operation timed out: {0}")]
    Timeout(String),

    /// Job id not known to the engine or provider
    #[error("unknown purge job: {0}")]
    UnknownJob(String),

    /// Request is malformed before reaching the provider
    #[error("invalid purge request: {0}")]
    InvalidRequest(String),

    /// Provider has no API for the operation
    #[error("operation not supported by provider: {0}")]
    Unsupported(&'static str),
}

impl CdnError {
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

    /// Failure classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::TransientNetwork,
            Self::Rejected { .. } | Self::UnknownJob(_) | Self::Unsupported(_) => {
                ErrorKind::RemoteRejection
            }
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidRequest(_) => ErrorKind::LocalInput,
        }
    }

    /// Provider code, if any
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Transient { code, .. } => code.as_deref(),
            Self::Rejected { code, .. } => Some(code),
            Self::UnknownJob(_) => Some("NoSuchPurge"),
            Self::Unsupported(_) => Some("NotSupported"),
            Self::Timeout(_) | Self::InvalidRequest(_) => None,
        }
    }

    /// Convert into the shared failure record
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        let failure = Failure::new(self.kind(), self.to_string());
        match self.code() {
            Some(code) => failure.with_code(code),
            None => failure,
        }
    }
}
