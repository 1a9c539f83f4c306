//! media-deploy Cache Invalidation Engine
//!
//! Drives a CDN provider for edge cache control:
//! - Submits path, full and pattern purges and tracks their jobs
//! - Waits on a job with a bounded poll loop
//! - Purges only changed paths and keeps a purge history
//! - Merges origin overrides over sensible defaults
//! - Probes URLs and classifies the observed cache state
//!
//! # Example
//!
//! ```rust,ignore
//! use mdp_cdn::{CacheInvalidationEngine, CdnConfig, StaticCdnProvider};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), mdp_cdn::CdnError> {
//! let provider = StaticCdnProvider::new(Duration::from_secs(10))?;
//! let engine = CacheInvalidationEngine::new(Arc::new(provider), CdnConfig::default());
//!
//! let purge = engine.smart_purge(&["/images/hero.webp".to_string()]).await;
//! if let Some(job_id) = purge.job_id() {
//!     let outcome = engine.wait_with_defaults(job_id).await;
//!     assert!(outcome.is_completed());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod origin;
pub mod provider;
pub mod types;

pub use config::CdnConfig;
pub use engine::CacheInvalidationEngine;
pub use error::CdnError;
pub use history::PurgeHistory;
pub use origin::{OriginConfig, OriginOverrides, OriginSettings};
pub use provider::{CdnProvider, StaticCdnProvider};
pub use types::{
    CacheMetrics, CacheState, CacheStatistics, ProbeResponse, ProbeResult, PurgeJob, PurgeJobId, PurgeMode, PurgeOutcome,
    PurgeRecord, PurgeRequest, PurgeStatistics, PurgeStatus, PurgeStatusReport,
    SmartPurgeResult, StatsRange, PURGE_SECONDS_PER_PATH,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
