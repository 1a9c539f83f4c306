//! Upload strategy selection

use crate::config::TransferConfig;
use serde::{Deserialize, Serialize};

/// How a payload is written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadStrategy {
    /// One atomic put
    SinglePut,
    /// Chunked upload finalized as one object
    Multipart {
        /// Bytes per part (last part may be shorter)
        part_size: u64,
        /// Number of parts
        part_count: u64,
        /// Parallel part uploads
        concurrency: usize,
    },
}

impl UploadStrategy {
    /// Whether this is a multipart upload
    #[inline]
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart { .. })
    }
}

/// Pick the strategy for a payload of `size` bytes
///
/// Sizes at or above the threshold go multipart; concurrency never exceeds
/// the configured cap or the number of parts.
#[must_use]
pub fn select_strategy(size: u64, config: &TransferConfig) -> UploadStrategy {
    if size < config.multipart_threshold {
        return UploadStrategy::SinglePut;
    }

    let part_size = config.part_size.max(1);
    let part_count = size.div_ceil(part_size).max(1);
    let concurrency = usize::try_from(part_count)
        .unwrap_or(usize::MAX)
        .min(config.effective_concurrency());

    UploadStrategy::Multipart {
        part_size,
        part_count,
        concurrency,
    }
}
