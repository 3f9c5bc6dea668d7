// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # icasync Coordinator
//!
//! The polling layer of the icasync workspace: keeps one account's session
//! alive, walks every cached resource on a schedule, reconciles offers and
//! emits change events.
//!
//! ## Components
//!
//! - [`IcaCoordinator`] — the fetch-diff-emit refresh driver
//! - [`ProductRegistry`] — append/merge-only barcode knowledge base
//! - [`BackgroundWorker`] + [`EventSink`] — deferred event delivery around
//!   the host's startup window
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use icasync_coordinator::{CoordinatorConfig, IcaCoordinator};
//!
//! let mut coordinator = IcaCoordinator::new(credentials, None, sink, config)?;
//! coordinator.worker().mark_loaded();
//! loop {
//!     coordinator.refresh_data(None).await?;
//!     tokio::time::sleep(poll_interval).await;
//! }
//! ```

pub mod coordinator;
pub mod error;
pub mod registry;
pub mod worker;

pub use coordinator::{CoordinatorConfig, IcaCoordinator};
pub use error::CoordinatorError;
pub use registry::ProductRegistry;
pub use worker::{BackgroundWorker, EventSink, DEFAULT_SEND_INTERVAL};
