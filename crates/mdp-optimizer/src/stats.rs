//! Cumulative optimization statistics

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// `(original - optimized) / original * 100`, two decimals; 0 when `original == 0`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn reduction_percent(original: u64, optimized: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let reduction = (original as f64 - optimized as f64) / original as f64 * 100.0;
    (reduction * 100.0).round() / 100.0
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    processed: u64,
    original: u64,
    optimized: u64,
}

/// Running totals shared by every adapter of a pipeline
///
/// Totals only grow; build a new instance to start over.
#[derive(Debug, Default)]
pub struct OptimizationStats {
    inner: Mutex<Totals>,
}

impl OptimizationStats {
    /// Zeroed totals
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one successful transform
    pub fn record(&self, original: u64, optimized: u64) {
        let mut totals = self.inner.lock();
        totals.processed += 1;
        totals.original = totals.original.saturating_add(original);
        totals.optimized = totals.optimized.saturating_add(optimized);
    }

    /// Consistent copy of the totals
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let totals = *self.inner.lock();
        let derived = totals.processed > 0 && totals.original > 0;
        StatsSnapshot {
            total_processed: totals.processed,
            total_original_size: totals.original,
            total_optimized_size: totals.optimized,
            total_reduction_bytes: derived.then(|| {
                i64::try_from(totals.original).unwrap_or(i64::MAX)
                    - i64::try_from(totals.optimized).unwrap_or(i64::MAX)
            }),
            average_reduction_percent: derived
                .then(|| reduction_percent(totals.original, totals.optimized)),
        }
    }
}

/// Point-in-time statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Transforms that succeeded
    pub total_processed: u64,
    /// Input bytes across them
    pub total_original_size: u64,
    /// Output bytes across them
    pub total_optimized_size: u64,
    /// Bytes saved (negative when outputs grew)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_reduction_bytes: Option<i64>,
    /// Overall reduction, two decimals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_reduction_percent: Option<f64>,
}
