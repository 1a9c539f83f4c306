//! media-deploy model
//!
//! Types shared by every stage of the deployment pipeline:
//! - [`Asset`]: one logical file moving through the pipeline
//! - [`ObjectKey`]: the bucket-relative, forward-slash key an asset is stored under
//! - [`ErrorKind`] / [`Failure`]: the failure taxonomy carried inside results
//!
//! Components never let failures escape as panics or unhandled errors; instead
//! each public operation returns a result value holding an optional
//! [`Failure`]. The taxonomy lives here so the transfer, CDN and optimizer
//! crates classify errors the same way.

#![warn(unreachable_pub)]

pub mod asset;
pub mod error;

pub use asset::{Asset, AssetError, KeyError, ObjectKey};
pub use error::{ErrorKind, Failure};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
