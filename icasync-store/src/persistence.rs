//! File persistence helpers.
//!
//! All durable artifacts are JSON files named `ica.<slug>.json` inside a
//! single directory, so one account's session and cache files are easy to
//! find and easy to wipe. Files are written atomically and, on Unix, kept
//! private to the owning user.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

// ============================================================================
// Default Paths
// ============================================================================

/// Default configuration directory.
///
/// - macOS: `~/Library/Application Support/icasync`
/// - Linux: `~/.config/icasync`
/// - Windows: `%APPDATA%\icasync`
pub fn default_config_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    let base = dirs::home_dir().map(|h| h.join("Library/Application Support"));
    #[cfg(not(target_os = "macos"))]
    let base = dirs::config_dir();

    base.map_or_else(|| PathBuf::from("."), |b| b.join("icasync"))
}

/// Default cache directory.
///
/// - macOS: `~/Library/Caches/icasync`
/// - Linux: `~/.cache/icasync`
/// - Windows: `%LOCALAPPDATA%\icasync\cache`
pub fn default_cache_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    let base = dirs::home_dir().map(|h| h.join("Library/Caches"));
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map_or_else(|| PathBuf::from("."), |b| b.join("icasync"))
}

/// Turns a cache key into a filesystem-safe slug.
///
/// Lowercases and replaces every non-alphanumeric run with a single
/// underscore, so `"Shopping lists (tracked)"` becomes
/// `"shopping_lists_tracked"`.
pub fn slugify(key: &str) -> String {
    let mut slug = String::with_capacity(key.len());
    let mut last_sep = true;
    for ch in key.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            slug.push('_');
            last_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// The file path a keyed artifact lives at inside `dir`.
pub fn keyed_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("ica.{}.json", slugify(key)))
}

// ============================================================================
// Permissions
// ============================================================================

/// Restricts a path to its owner: 0600 for files, 0700 for directories.
/// Session blobs carry tokens and cache files carry account data, so
/// neither may be world-readable.
#[cfg(unix)]
async fn restrict_to_owner(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(mode);
    tokio::fs::set_permissions(path, perms).await?;
    debug!(path = %path.display(), mode = format!("{mode:o}"), "Restricted permissions");
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

// ============================================================================
// File Operations
// ============================================================================

/// Creates a directory (owner-only on Unix) when it does not exist yet.
pub async fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        return Ok(());
    }
    debug!(path = %path.display(), "Creating directory");
    tokio::fs::create_dir_all(path).await?;
    restrict_to_owner(path, 0o700).await
}

/// Writes a value as pretty JSON, atomically.
///
/// The parent directory is created when missing; the content lands in a
/// sibling temp file first and is renamed over the target, so a crash never
/// leaves a half-written artifact.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }

    let json = serde_json::to_string_pretty(data)?;
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, &json).await?;
    tokio::fs::rename(&staging, path).await?;
    restrict_to_owner(path, 0o600).await?;

    debug!(path = %path.display(), bytes = json.len(), "Wrote JSON artifact");
    Ok(())
}

/// Reads and decodes a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = tokio::fs::read_to_string(path).await?;
    debug!(path = %path.display(), bytes = content.len(), "Read JSON artifact");
    Ok(serde_json::from_str(&content)?)
}

/// Reads a JSON file, mapping every failure to `None`.
///
/// Disk state is a warm-start optimization, never a source of truth; a
/// missing, unreadable or corrupt file degrades to a cache miss.
pub async fn load_json_opt<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match load_json(path).await {
        Ok(data) => Some(data),
        Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load, treating as miss");
            None
        }
    }
}

/// Removes a file, ignoring a missing one.
pub async fn remove_file(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Tests
// ============================================================================
