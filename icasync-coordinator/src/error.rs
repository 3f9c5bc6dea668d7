//! Coordinator error types.

use thiserror::Error;

/// Errors that can occur while coordinating a refresh cycle.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Network or protocol failure.
    #[error(transparent)]
    Fetch(#[from] icasync_fetch::FetchError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] icasync_store::StoreError),

    /// Domain validation failure.
    #[error(transparent)]
    Core(#[from] icasync_core::CoreError),

    /// A refresh pass failed; the host retries on the next cycle.
    #[error("Update failed: {0}")]
    UpdateFailed(String),

    /// No source knows the barcode.
    #[error("Product ean '{0}' was not found")]
    ProductNotFound(String),
}
