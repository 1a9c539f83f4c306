//! media-deploy Pipeline Orchestrator
//!
//! Moves media files from disk to object storage and the CDN edge:
//! - [`MediaPipeline::process_asset`]: original, thumbnails, optimized
//!   rendition and purge for one file, with step-level reporting
//! - [`MediaPipeline::deploy_tree`]: a whole directory with one batch purge
//! - [`MediaPipeline::verify_deployment`]: storage and edge checks for a key
//!
//! # Example
//!
//! ```rust,ignore
//! use mdp_pipeline::{MediaPipeline, PipelineConfig};
//! use mdp_cdn::StaticCdnProvider;
//! use mdp_optimizer::IdentityCodec;
//! use mdp_transfer::InMemoryStore;
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! let pipeline = MediaPipeline::new(
//!     config.clone(),
//!     Arc::new(InMemoryStore::with_buckets([config.pipeline.bucket.as_str()])),
//!     Arc::new(StaticCdnProvider::new(Duration::from_secs(10))?),
//!     Arc::new(IdentityCodec),
//! );
//!
//! let run = pipeline.process_asset(Path::new("hero.jpg"), true, None).await;
//! println!("{:?} -> {:?}", run.steps_completed(), run.cdn_url);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod run;
pub mod step;

pub use config::{OptimizerSettings, PipelineConfig, PipelineSettings};
pub use error::{ConfigError, PipelineError, StepOrderError};
pub use pipeline::MediaPipeline;
pub use run::{
    DeploymentReport, FailedFile, OptimizationSummary, OptimizedImage, PipelineRun,
    PipelineStatistics, RunId, VerificationReport,
};
pub use step::{allowed_transitions, validate_transition, RunState, Step};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
