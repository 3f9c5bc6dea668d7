//! TTL cache entries with lazy disk hydration.
//!
//! A [`CacheEntry`] owns one named value, the async factory that produces
//! it, and a time-to-live. Reads go through [`CacheEntry::get_value`], which
//! decides between the cached value and a factory call; the decision can be
//! overridden per call. Values are mirrored to disk so a process restart
//! serves the last known data instead of starting cold.
//!
//! Disk state is strictly best-effort: any read or write failure is logged
//! and treated as a cache miss. Factory errors are the caller's domain and
//! propagate untouched.

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::persistence;

/// Async producer of fresh values for one cache entry.
pub type Factory<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

// ============================================================================
// Disk Envelope
// ============================================================================

/// On-disk wrapper around a cached value.
///
/// The timestamp is the moment the value was produced, so staleness
/// survives a restart; the key is stored redundantly for debuggability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    /// When the value was produced.
    pub timestamp: DateTime<Utc>,
    /// The entry's cache key.
    pub key: String,
    /// The cached value.
    pub value: T,
}

// ============================================================================
// Cache Entry
// ============================================================================

struct Inner<T> {
    value: Option<(DateTime<Utc>, T)>,
    hydrated: bool,
}

/// One named, TTL-governed cached value.
pub struct CacheEntry<T, E> {
    key: String,
    ttl_secs: i64,
    factory: Factory<T, E>,
    disk_dir: Option<PathBuf>,
    inner: Mutex<Inner<T>>,
}

impl<T, E> CacheEntry<T, E>
where
    T: Clone + Serialize + DeserializeOwned + Send,
{
    /// Creates a memory-only entry. A TTL of zero means every read is stale.
    pub fn new(key: impl Into<String>, ttl_secs: i64, factory: Factory<T, E>) -> Self {
        Self {
            key: key.into(),
            ttl_secs,
            factory,
            disk_dir: None,
            inner: Mutex::new(Inner {
                value: None,
                hydrated: true,
            }),
        }
    }

    /// Creates an entry mirrored to `ica.<slug>.json` inside `disk_dir`.
    ///
    /// The file is read lazily on the first access, not at construction.
    pub fn with_disk(
        key: impl Into<String>,
        ttl_secs: i64,
        factory: Factory<T, E>,
        disk_dir: PathBuf,
    ) -> Self {
        Self {
            key: key.into(),
            ttl_secs,
            factory,
            disk_dir: Some(disk_dir),
            inner: Mutex::new(Inner {
                value: None,
                hydrated: false,
            }),
        }
    }

    /// The entry's cache key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the cached value without consulting the factory.
    ///
    /// Hydrates from disk first if that has not happened yet. Staleness is
    /// not checked; this is "whatever we have".
    pub async fn current_value(&self) -> Option<T> {
        let mut inner = self.inner.lock().await;
        self.hydrate(&mut inner).await;
        inner.value.as_ref().map(|(_, v)| v.clone())
    }

    /// Replaces the cached value, stamping it as fresh now.
    pub async fn set_value(&self, value: T) {
        let mut inner = self.inner.lock().await;
        inner.hydrated = true;
        let now = Utc::now();
        self.persist(now, &value).await;
        inner.value = Some((now, value));
    }

    /// Drops the cached value so the next read consults the factory.
    pub async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        inner.hydrated = true;
        inner.value = None;
    }

    /// Returns the cached value or a fresh one from the factory.
    ///
    /// The `invalidate` override is tri-state: `None` lets the TTL decide,
    /// `Some(false)` never refreshes a held value, `Some(true)` always
    /// refreshes. An empty cache always calls the factory regardless.
    ///
    /// The entry lock is held across the factory call, so concurrent reads
    /// of a stale entry produce exactly one fetch.
    pub async fn get_value(&self, invalidate: Option<bool>) -> Result<T, E> {
        let mut inner = self.inner.lock().await;
        self.hydrate(&mut inner).await;

        let now = Utc::now();
        let stale = match (&inner.value, invalidate) {
            (None, _) => true,
            (Some(_), Some(force)) => force,
            (Some((stamped, _)), None) => {
                self.ttl_secs == 0 || now - *stamped > Duration::seconds(self.ttl_secs)
            }
        };

        if !stale {
            if let Some((_, value)) = &inner.value {
                return Ok(value.clone());
            }
        }

        debug!(key = %self.key, "Cache stale, invoking factory");
        let value = (self.factory)().await?;
        let now = Utc::now();
        self.persist(now, &value).await;
        inner.value = Some((now, value.clone()));
        Ok(value)
    }

    async fn hydrate(&self, inner: &mut Inner<T>) {
        if inner.hydrated {
            return;
        }
        inner.hydrated = true;

        let Some(dir) = &self.disk_dir else { return };
        let path = persistence::keyed_path(dir, &self.key);
        if let Some(envelope) = persistence::load_json_opt::<CacheEnvelope<T>>(&path).await {
            debug!(key = %self.key, timestamp = %envelope.timestamp, "Hydrated from disk");
            inner.value = Some((envelope.timestamp, envelope.value));
        }
    }

    async fn persist(&self, timestamp: DateTime<Utc>, value: &T) {
        #[derive(Serialize)]
        struct EnvelopeRef<'a, T> {
            timestamp: DateTime<Utc>,
            key: &'a str,
            value: &'a T,
        }

        let Some(dir) = &self.disk_dir else { return };
        let path = persistence::keyed_path(dir, &self.key);
        let envelope = EnvelopeRef {
            timestamp,
            key: &self.key,
            value,
        };
        if let Err(e) = persistence::save_json(&path, &envelope).await {
            warn!(key = %self.key, error = %e, "Failed to mirror cache entry to disk");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
