//! Pipeline configuration
//!
//! Loaded from TOML; every section and key is optional.
//!
//! ```toml
//! [pipeline]
//! bucket = "media"
//! cdn_domain = "https://cdn.example.com"
//! wait_for_purge = true
//!
//! [transfer]
//! max_concurrency = 8
//!
//! [transfer.retry]
//! max_attempts = 3
//! initial_backoff_ms = 2000
//! max_backoff_ms = 10000
//!
//! [cdn]
//! probe_timeout_secs = 10
//!
//! [optimizer]
//! optimized_quality = 85
//! ```

use crate::error::ConfigError;
use mdp_cdn::CdnConfig;
use mdp_optimizer::{ImageFormat, VariantSpec};
use mdp_transfer::{TransferConfig, MAX_ATTEMPTS_CAP, MAX_BACKOFF_CAP_MS, MAX_CONCURRENCY_CAP};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deployment target
    pub pipeline: PipelineSettings,
    /// Upload strategy and retry
    pub transfer: TransferConfig,
    /// Purge and probe timing
    pub cdn: CdnConfig,
    /// Encoding parameters
    pub optimizer: OptimizerSettings,
}

/// Deployment target settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Destination bucket
    pub bucket: String,
    /// Public CDN base URL, no trailing slash
    pub cdn_domain: String,
    /// Block `cdn_sync` until the purge completes
    pub wait_for_purge: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bucket: "media".to_string(),
            cdn_domain: "https://cdn.example.com".to_string(),
            wait_for_purge: false,
        }
    }
}

/// Encoding parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Format of the `optimized/` rendition
    pub optimized_format: ImageFormat,
    /// Quality of the `optimized/` rendition
    pub optimized_quality: u8,
    /// Longer-side bound for the `optimized/` rendition
    pub max_dimension: Option<u32>,
    /// Format of thumbnails
    pub thumbnail_format: ImageFormat,
    /// Quality of thumbnails
    pub thumbnail_quality: u8,
    /// Thumbnails generated when a run asks for the defaults
    pub thumbnails: Vec<VariantSpec>,
    /// Quality used when images are re-encoded during tree deploys
    pub deploy_quality: u8,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            optimized_format: ImageFormat::Webp,
            optimized_quality: 85,
            max_dimension: None,
            thumbnail_format: ImageFormat::Webp,
            thumbnail_quality: 80,
            thumbnails: VariantSpec::default_thumbnails(),
            deploy_quality: 80,
        }
    }
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`] for
    /// out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Same as [`from_toml_str`](Self::from_toml_str), plus
    /// [`ConfigError::Read`] when the file cannot be read
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.bucket.trim().is_empty() {
            return Err(ConfigError::invalid("pipeline.bucket", "must not be empty"));
        }
        if p.cdn_domain.trim().is_empty() {
            return Err(ConfigError::invalid("pipeline.cdn_domain", "must not be empty"));
        }
        if p.cdn_domain.ends_with('/') {
            return Err(ConfigError::invalid(
                "pipeline.cdn_domain",
                "must not end with '/'",
            ));
        }

        let t = &self.transfer;
        if !(1..=MAX_CONCURRENCY_CAP).contains(&t.max_concurrency) {
            return Err(ConfigError::invalid(
                "transfer.max_concurrency",
                format!("{} outside 1..={MAX_CONCURRENCY_CAP}", t.max_concurrency),
            ));
        }
        if t.part_size == 0 {
            return Err(ConfigError::invalid("transfer.part_size", "must be positive"));
        }
        if !(1..=MAX_ATTEMPTS_CAP).contains(&t.retry.max_attempts) {
            return Err(ConfigError::invalid(
                "transfer.retry.max_attempts",
                format!("{} outside 1..={MAX_ATTEMPTS_CAP}", t.retry.max_attempts),
            ));
        }
        if t.retry.max_backoff_ms > MAX_BACKOFF_CAP_MS {
            return Err(ConfigError::invalid(
                "transfer.retry.max_backoff_ms",
                format!("{} above {MAX_BACKOFF_CAP_MS}", t.retry.max_backoff_ms),
            ));
        }
        if t.retry.initial_backoff_ms > t.retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "transfer.retry.initial_backoff_ms",
                "exceeds max_backoff_ms",
            ));
        }

        let o = &self.optimizer;
        for (field, quality) in [
            ("optimizer.optimized_quality", o.optimized_quality),
            ("optimizer.thumbnail_quality", o.thumbnail_quality),
            ("optimizer.deploy_quality", o.deploy_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(ConfigError::invalid(field, format!("{quality} outside 1..=100")));
            }
        }
        if o.max_dimension == Some(0) {
            return Err(ConfigError::invalid("optimizer.max_dimension", "must be positive"));
        }
        Ok(())
    }

    /// Set destination bucket
    #[inline]
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.pipeline.bucket = bucket.into();
        self
    }

    /// Set CDN base URL
    #[inline]
    #[must_use]
    pub fn with_cdn_domain(mut self, domain: impl Into<String>) -> Self {
        self.pipeline.cdn_domain = domain.into();
        self
    }

    /// Toggle waiting for purges during `cdn_sync`
    #[inline]
    #[must_use]
    pub fn with_wait_for_purge(mut self, wait: bool) -> Self {
        self.pipeline.wait_for_purge = wait;
        self
    }

    /// Replace transfer settings
    #[inline]
    #[must_use]
    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    /// Replace CDN settings
    #[inline]
    #[must_use]
    pub fn with_cdn(mut self, cdn: CdnConfig) -> Self {
        self.cdn = cdn;
        self
    }

    /// Replace optimizer settings
    #[inline]
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerSettings) -> Self {
        self.optimizer = optimizer;
        self
    }
}
