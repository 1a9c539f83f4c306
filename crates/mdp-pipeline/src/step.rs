//! Pipeline steps and the run state machine
//!
//! A run walks `Started → OriginalUploaded → VariantsGenerated? → Optimized →
//! CacheSynced → Succeeded`. Any non-terminal state may drop to `Failed`.

use crate::error::StepOrderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Units of work recorded on a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Original file stored under `originals/`
    UploadOriginal,
    /// Every variant generated and stored under `thumbnails/`
    GenerateThumbnails,
    /// Re-encoded image stored under `optimized/`
    OptimizeImage,
    /// Written paths purged from the edge
    CdnSync,
}

impl Step {
    /// Canonical order
    pub const ORDER: [Self; 4] = [
        Self::UploadOriginal,
        Self::GenerateThumbnails,
        Self::OptimizeImage,
        Self::CdnSync,
    ];

    /// Stable name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UploadOriginal => "upload_original",
            Self::GenerateThumbnails => "generate_thumbnails",
            Self::OptimizeImage => "optimize_image",
            Self::CdnSync => "cdn_sync",
        }
    }

    /// State a run enters once this step completes
    #[must_use]
    pub fn completes_into(self) -> RunState {
        match self {
            Self::UploadOriginal => RunState::OriginalUploaded,
            Self::GenerateThumbnails => RunState::VariantsGenerated,
            Self::OptimizeImage => RunState::Optimized,
            Self::CdnSync => RunState::CacheSynced,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Started,
    OriginalUploaded,
    VariantsGenerated,
    Optimized,
    CacheSynced,
    Succeeded,
    Failed,
}

impl RunState {
    /// Succeeded or failed
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Started => "started",
            Self::OriginalUploaded => "original_uploaded",
            Self::VariantsGenerated => "variants_generated",
            Self::Optimized => "optimized",
            Self::CacheSynced => "cache_synced",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

/// States reachable from `from` in one move
#[must_use]
pub fn allowed_transitions(from: RunState) -> Vec<RunState> {
    use RunState::{
        CacheSynced, Failed, Optimized, OriginalUploaded, Started, Succeeded, VariantsGenerated,
    };
    match from {
        Started => vec![OriginalUploaded, Failed],
        OriginalUploaded => vec![VariantsGenerated, Optimized, Failed],
        VariantsGenerated => vec![Optimized, Failed],
        Optimized => vec![CacheSynced, Failed],
        CacheSynced => vec![Succeeded],
        Succeeded | Failed => vec![],
    }
}

/// Reject moves the state machine does not allow
///
/// # Errors
/// [`StepOrderError`] naming both states
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), StepOrderError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StepOrderError { from, to })
    }
}
