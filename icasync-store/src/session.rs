//! Durable session storage.
//!
//! Persists the [`AuthState`] blob after every successful login or refresh
//! so a restart resumes the session instead of burning a full login.

use std::path::PathBuf;
use tracing::debug;

use icasync_core::AuthState;

use crate::error::StoreError;
use crate::persistence;

/// Reads and writes one account's session blob.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// A store at the default config directory.
    pub fn new() -> Self {
        Self::at_dir(persistence::default_config_dir())
    }

    /// A store inside a specific directory.
    pub fn at_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: persistence::keyed_path(&dir.into(), "session"),
        }
    }

    /// Loads the persisted session, `None` on a missing or unreadable blob.
    pub async fn load(&self) -> Option<AuthState> {
        let state = persistence::load_json_opt(&self.path).await;
        if state.is_some() {
            debug!(path = %self.path.display(), "Resumed session from disk");
        }
        state
    }

    /// Persists the session blob.
    pub async fn save(&self, state: &AuthState) -> Result<(), StoreError> {
        persistence::save_json(&self.path, state).await
    }

    /// Removes the persisted session.
    pub async fn clear(&self) -> Result<(), StoreError> {
        persistence::remove_file(&self.path).await
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use icasync_core::{JwtUserInfo, OAuthClient};

    fn state() -> AuthState {
        AuthState {
            client: Some(OAuthClient {
                client_id: "id".into(),
                client_secret: "secret".into(),
                scope: "openid".into(),
            }),
            token: None,
            user: Some(JwtUserInfo::new("Anna", "Svensson")),
        }
    }

    #[tokio::test]
    async fn test_save_load_clear_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::at_dir(dir.path());

        assert!(store.load().await.is_none());

        store.save(&state()).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state());

        store.clear().await.unwrap();
        assert!(store.load().await.is_none());
        // Clearing twice is fine.
        store.clear().await.unwrap();
    }
}
