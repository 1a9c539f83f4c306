//! media-deploy Transfer Engine
//!
//! Uploads byte payloads to an object store:
//! - Chooses a single-shot put or a multipart upload by payload size
//! - Bounds multipart part parallelism by a configured cap
//! - Retries transient failures with capped exponential backoff
//! - Reports every failure as data inside [`TransferResult`]
//!
//! # Example
//!
//! ```rust,ignore
//! use mdp_transfer::{InMemoryStore, TransferConfig, TransferEngine, UploadSource};
//! use mdp_model::ObjectKey;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = Arc::new(InMemoryStore::with_buckets(["assets"]));
//! let engine = TransferEngine::new(store, TransferConfig::default());
//!
//! let key = ObjectKey::new("images/photo.webp").unwrap();
//! let result = engine
//!     .upload(UploadSource::Bytes(vec![0u8; 1024]), "assets", &key, None, None)
//!     .await;
//! assert!(result.success);
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod content_type;
pub mod engine;
pub mod error;
pub mod local;
pub mod memory;
pub mod store;
pub mod strategy;

pub use config::{
    RetryPolicy, TransferConfig, MAX_ATTEMPTS_CAP, MAX_BACKOFF_CAP_MS, MAX_CONCURRENCY_CAP,
    MULTIPART_THRESHOLD,
};
pub use content_type::{infer_content_type, DEFAULT_CONTENT_TYPE};
pub use engine::{HeadResult, TransferEngine, TransferResult, UploadSource};
pub use error::StorageError;
pub use local::LocalDirStore;
pub use memory::InMemoryStore;
pub use store::{
    CompletedPart, ObjectInfo, ObjectMetadata, ObjectStore, DEFAULT_PRESIGN_EXPIRY,
    MAX_PRESIGN_EXPIRY,
};
pub use strategy::{select_strategy, UploadStrategy};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
