//! Failure taxonomy shared across the pipeline
//!
//! Every result type in the workspace carries an `Option<Failure>` instead of
//! propagating errors. The [`ErrorKind`] decides what the caller may do next:
//! retry, give up on one asset, or report a configuration problem.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection reset, throttling, 5xx. Retried by the transfer engine.
    TransientNetwork,
    /// The remote side refused the request (missing bucket, access denied).
    RemoteRejection,
    /// Invalid or unreadable local input. Aborts only the affected asset.
    LocalInput,
    /// A bounded wait elapsed (purge completion, probe).
    Timeout,
}

impl ErrorKind {
    /// Whether an operation failing with this kind may succeed on retry
    #[inline]
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransientNetwork)
    }

    /// Stable snake_case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::RemoteRejection => "remote_rejection",
            Self::LocalInput => "local_input",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported as data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure classification
    pub kind: ErrorKind,
    /// Provider error code, when the remote side supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl Failure {
    /// Create a failure without a provider code
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Attach a provider error code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Local input failure
    #[must_use]
    pub fn local_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LocalInput, message)
    }

    /// Timeout failure
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{}]: {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorKind::TransientNetwork.is_retryable());
        assert!(!ErrorKind::RemoteRejection.is_retryable());
        assert!(!ErrorKind::LocalInput.is_retryable());
        assert!(!ErrorKind::Timeout.is_retryable());
    }

    #[test]
    fn failure_display_includes_code() {
        let failure = Failure::new(ErrorKind::RemoteRejection, "bucket does not exist")
            .with_code("NoSuchBucket");
        assert_eq!(
            failure.to_string(),
            "remote_rejection [NoSuchBucket]: bucket does not exist"
        );
        assert_eq!(
            Failure::timeout("probe exceeded 10s").to_string(),
            "timeout: probe exceeded 10s"
        );
    }

    #[test]
    fn failure_serializes_kind_as_snake_case() {
        let json = serde_json::to_string(&Failure::local_input("empty file")).unwrap();
        assert_eq!(json, r#"{"kind":"local_input","message":"empty file"}"#);
    }
}
