//! Pipeline errors

use crate::step::{RunState, Step};
use mdp_model::{AssetError, ErrorKind, Failure, KeyError};
use std::path::PathBuf;

/// Configuration could not be loaded or is inconsistent
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML is malformed or has wrong types
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Dotted field name
        field: &'static str,
        /// What is wrong
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A run tried to move backwards or skip a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal run transition {from} -> {to}")]
pub struct StepOrderError {
    /// Current state
    pub from: RunState,
    /// Requested state
    pub to: RunState,
}

/// Why a run or file did not go through
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A collaborator reported failure during a step
    #[error("{step} failed: {failure}")]
    StepFailed {
        /// Failing step
        step: Step,
        /// Collaborator failure
        failure: Failure,
    },

    /// Source file problem
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Source path does not map to an object key
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Directory walk failed
    #[error("cannot walk {path}: {message}")]
    Walk {
        /// Entry that failed
        path: PathBuf,
        /// walkdir message
        message: String,
    },

    /// Internal step ordering violated
    #[error(transparent)]
    StepOrder(#[from] StepOrderError),
}

impl PipelineError {
    /// Step failure from a collaborator failure
    pub(crate) fn step(step: Step, failure: Failure) -> Self {
        Self::StepFailed { step, failure }
    }

    /// Failure classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StepFailed { failure, .. } => failure.kind,
            Self::Asset(_) | Self::Key(_) | Self::Walk { .. } | Self::StepOrder(_) => {
                ErrorKind::LocalInput
            }
        }
    }

    /// Convert into the shared failure record, keeping any provider code
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        let failure = Failure::new(self.kind(), self.to_string());
        match self {
            Self::StepFailed {
                failure: Failure {
                    code: Some(code), ..
                },
                ..
            } => failure.with_code(code.clone()),
            _ => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failure_keeps_kind_and_code() {
        let err = PipelineError::step(
            Step::UploadOriginal,
            Failure::new(ErrorKind::RemoteRejection, "denied").with_code("AccessDenied"),
        );
        let failure = err.to_failure();
        assert_eq!(failure.kind, ErrorKind::RemoteRejection);
        assert_eq!(failure.code.as_deref(), Some("AccessDenied"));
        assert!(failure.message.starts_with("upload_original failed"));
    }

    #[test]
    fn key_errors_are_local_input() {
        let err = PipelineError::from(KeyError::Empty);
        assert_eq!(err.kind(), ErrorKind::LocalInput);
    }
}
