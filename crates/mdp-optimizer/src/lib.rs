//! media-deploy Optimization Adapter
//!
//! Runs image re-encoding through a pluggable codec:
//! - Validates inputs before any codec call
//! - Generates resized variants with independent failures
//! - Folds successful transforms into shared cumulative statistics
//!
//! # Example
//!
//! ```rust,ignore
//! use mdp_optimizer::{IdentityCodec, ImageFormat, OptimizationAdapter};
//! use mdp_model::{Asset, ObjectKey};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let adapter = OptimizationAdapter::new(Arc::new(IdentityCodec));
//! let asset = Asset::new("hero.png", ObjectKey::new("hero.png").unwrap(), vec![1, 2, 3]);
//! let (bytes, result) = adapter.optimize(&asset, ImageFormat::Webp, 85, None).await;
//! assert!(result.success);
//! assert_eq!(bytes.len(), 3);
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod adapter;
pub mod codec;
pub mod format;
pub mod stats;

pub use adapter::{OptimizationAdapter, OptimizationResult, VariantOutcome, VariantSpec};
pub use codec::{CodecError, EncodedImage, IdentityCodec, ImageCodec, TransformParams};
pub use format::{ImageFormat, UnsupportedFormat};
pub use stats::{reduction_percent, OptimizationStats, StatsSnapshot};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
