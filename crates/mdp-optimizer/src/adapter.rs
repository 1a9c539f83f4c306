//! Optimization adapter
//!
//! Wraps an [`ImageCodec`] with input validation, blocking-pool dispatch and
//! statistics. Failures come back inside the results; the original payload is
//! returned untouched whenever optimization does not run.

use crate::codec::{CodecError, EncodedImage, ImageCodec, TransformParams};
use crate::format::ImageFormat;
use crate::stats::{reduction_percent, OptimizationStats, StatsSnapshot};
use mdp_model::{Asset, ErrorKind, Failure};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of one optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Whether the transform ran and succeeded
    pub success: bool,
    /// Input size in bytes
    pub original_size: u64,
    /// Output size in bytes (input size when nothing ran)
    pub optimized_size: u64,
    /// Reduction percentage, two decimals
    pub reduction_percent: f64,
    /// Target format
    pub format: ImageFormat,
    /// Output dimensions `(width, height)`, zero when unknown
    pub dimensions: (u32, u32),
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl OptimizationResult {
    fn failed(original_size: u64, format: ImageFormat, failure: Failure) -> Self {
        Self {
            success: false,
            original_size,
            optimized_size: original_size,
            reduction_percent: 0.0,
            format,
            dimensions: (0, 0),
            error: Some(failure),
        }
    }
}

/// One requested variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Variant name used in the output file name
    pub name: String,
    /// Width bound in pixels
    pub max_width: i64,
    /// Height bound in pixels
    pub max_height: i64,
}

impl VariantSpec {
    /// Create a spec
    #[must_use]
    pub fn new(name: impl Into<String>, max_width: i64, max_height: i64) -> Self {
        Self {
            name: name.into(),
            max_width,
            max_height,
        }
    }

    /// `large` 1920x1080, `medium` 1280x720, `small` 640x360
    #[must_use]
    pub fn default_thumbnails() -> Vec<Self> {
        vec![
            Self::new("large", 1920, 1080),
            Self::new("medium", 1280, 720),
            Self::new("small", 640, 360),
        ]
    }

    fn bounds(&self) -> Result<(u32, u32), Failure> {
        if self.max_width <= 0 || self.max_height <= 0 {
            return Err(Failure::local_input(format!(
                "variant '{}' has non-positive bounds {}x{}",
                self.name, self.max_width, self.max_height
            )));
        }
        Ok((
            u32::try_from(self.max_width).unwrap_or(u32::MAX),
            u32::try_from(self.max_height).unwrap_or(u32::MAX),
        ))
    }
}

/// Outcome of one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOutcome {
    /// Variant name
    pub name: String,
    /// Output file name, `{stem}_{name}.{ext}`
    pub file_name: String,
    /// Whether the variant was produced
    pub success: bool,
    /// Output dimensions
    pub dimensions: (u32, u32),
    /// Output size in bytes
    pub size_bytes: u64,
    /// Encoded bytes
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

/// Front end over an [`ImageCodec`]
#[derive(Clone)]
pub struct OptimizationAdapter {
    codec: Arc<dyn ImageCodec>,
    stats: Arc<OptimizationStats>,
}

impl std::fmt::Debug for OptimizationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationAdapter")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl OptimizationAdapter {
    /// Create adapter with its own statistics
    #[must_use]
    pub fn new(codec: Arc<dyn ImageCodec>) -> Self {
        Self::with_stats(codec, Arc::new(OptimizationStats::new()))
    }

    /// Create adapter folding into shared statistics
    #[must_use]
    pub fn with_stats(codec: Arc<dyn ImageCodec>, stats: Arc<OptimizationStats>) -> Self {
        Self { codec, stats }
    }

    /// Shared statistics handle
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Arc<OptimizationStats> {
        &self.stats
    }

    /// Re-encode `asset` into `target`
    ///
    /// Returns the bytes to publish: the optimized output on success, the
    /// original payload otherwise.
    pub async fn optimize(
        &self,
        asset: &Asset,
        target: ImageFormat,
        quality: u8,
        max_dimension: Option<u32>,
    ) -> (Vec<u8>, OptimizationResult) {
        let original_size = asset.len();

        if let Err(failure) = validate(asset, quality, max_dimension) {
            tracing::warn!("Skipping optimization of {}: {}", asset.key(), failure);
            return (
                asset.payload().to_vec(),
                OptimizationResult::failed(original_size, target, failure),
            );
        }

        let mut params = TransformParams::new(target, quality);
        if let Some(max) = max_dimension {
            params = params.with_max_dimension(max);
        }

        match self.run_codec(asset.payload().to_vec(), params).await {
            Ok(encoded) => {
                let optimized_size = encoded.bytes.len() as u64;
                self.stats.record(original_size, optimized_size);
                let result = OptimizationResult {
                    success: true,
                    original_size,
                    optimized_size,
                    reduction_percent: reduction_percent(original_size, optimized_size),
                    format: target,
                    dimensions: (encoded.width, encoded.height),
                    error: None,
                };
                tracing::debug!(
                    key = %asset.key(),
                    original_size,
                    optimized_size,
                    reduction = result.reduction_percent,
                    "Optimized image"
                );
                (encoded.bytes, result)
            }
            Err(err) => {
                tracing::warn!("Optimization of {} failed: {}", asset.key(), err);
                (
                    asset.payload().to_vec(),
                    OptimizationResult::failed(original_size, target, err.to_failure()),
                )
            }
        }
    }

    /// Produce one resized variant per spec, in order
    ///
    /// A failing spec does not stop the others.
    pub async fn generate_variants(
        &self,
        asset: &Asset,
        specs: &[VariantSpec],
        format: ImageFormat,
        quality: u8,
    ) -> Vec<VariantOutcome> {
        let stem = asset.stem();
        let mut outcomes = Vec::with_capacity(specs.len());

        for spec in specs {
            let file_name = format!("{stem}_{}.{}", spec.name, format.extension());
            let attempt = match (spec.bounds(), validate(asset, quality, None)) {
                (Err(failure), _) | (_, Err(failure)) => Err(failure),
                (Ok((width, height)), Ok(())) => {
                    let params = TransformParams::new(format, quality).with_bounds(width, height);
                    self.run_codec(asset.payload().to_vec(), params)
                        .await
                        .map_err(|e| e.to_failure())
                }
            };

            let outcome = match attempt {
                Ok(encoded) => VariantOutcome {
                    name: spec.name.clone(),
                    file_name,
                    success: true,
                    dimensions: (encoded.width, encoded.height),
                    size_bytes: encoded.bytes.len() as u64,
                    bytes: Some(encoded.bytes),
                    error: None,
                },
                Err(failure) => {
                    tracing::warn!("Variant '{}' of {} failed: {}", spec.name, asset.key(), failure);
                    VariantOutcome {
                        name: spec.name.clone(),
                        file_name,
                        success: false,
                        dimensions: (0, 0),
                        size_bytes: 0,
                        bytes: None,
                        error: Some(failure),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Copy of the cumulative statistics
    #[must_use]
    pub fn statistics(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn run_codec(
        &self,
        input: Vec<u8>,
        params: TransformParams,
    ) -> Result<EncodedImage, CodecError> {
        let codec = Arc::clone(&self.codec);
        tokio::task::spawn_blocking(move || codec.transform(&input, &params))
            .await
            .map_err(|e| CodecError::Encode(format!("codec task aborted: {e}")))?
    }
}

fn validate(asset: &Asset, quality: u8, max_dimension: Option<u32>) -> Result<(), Failure> {
    if asset.is_empty() {
        return Err(Failure::local_input(format!("{} is empty", asset.key())));
    }
    if !(1..=100).contains(&quality) {
        return Err(Failure::local_input(format!(
            "quality {quality} outside 1..=100"
        )));
    }
    if max_dimension == Some(0) {
        return Err(Failure::new(
            ErrorKind::LocalInput,
            "max dimension must be positive",
        ));
    }
    Ok(())
}
