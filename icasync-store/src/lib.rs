// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # icasync Store
//!
//! Disk persistence for the icasync workspace.
//!
//! This crate provides:
//!
//! - **CacheEntry**: one named, TTL-governed value with an async factory
//!   and best-effort disk mirroring
//! - **SessionStore**: the durable OAuth session blob
//! - **Persistence**: secure JSON file I/O helpers
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use icasync_store::{default_cache_dir, CacheEntry};
//!
//! let entry: CacheEntry<Vec<String>, MyError> = CacheEntry::with_disk(
//!     "articles",
//!     24 * 60 * 60,
//!     Arc::new(move || Box::pin(fetch_articles())),
//!     default_cache_dir(),
//! );
//!
//! // TTL decides; pass Some(true)/Some(false) to override.
//! let articles = entry.get_value(None).await?;
//! ```

pub mod cache;
pub mod error;
pub mod persistence;
pub mod session;

pub use cache::{CacheEntry, CacheEnvelope, Factory};
pub use error::StoreError;
pub use persistence::{
    default_cache_dir, default_config_dir, ensure_dir, keyed_path, load_json, load_json_opt,
    save_json, slugify,
};
pub use session::SessionStore;
