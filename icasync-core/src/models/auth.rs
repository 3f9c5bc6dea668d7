//! Session and OAuth value types.
//!
//! [`AuthState`] is the single durable unit of session state: the registered
//! OAuth client, the current token pair and the decoded identity. It is
//! persisted as an opaque JSON blob after every successful login or refresh
//! so a process restart resumes without a full re-login.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fallback token lifetime when the server omits `expires_in` (30 days).
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 2_592_000;

/// Fraction of the token lifetime treated as the refresh safety margin.
///
/// A token is considered due for refresh once 80% of its declared lifetime
/// has elapsed, well before hard expiry.
const REFRESH_MARGIN_FRACTION: f64 = 0.20;

// ============================================================================
// Credentials
// ============================================================================

/// Login credentials, supplied once at setup. Immutable.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthCredentials {
    /// Account user name (personal id).
    pub username: String,
    /// Account password.
    pub password: String,
}

impl AuthCredentials {
    /// Creates a new credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// OAuth Client Registration
// ============================================================================

/// A dynamically registered OAuth client.
///
/// Obtained once via the app-registration endpoint and reused across logins
/// until the server rejects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthClient {
    /// Registered client id.
    pub client_id: String,
    /// Registered client secret.
    pub client_secret: String,
    /// Granted scope.
    pub scope: String,
}

// ============================================================================
// OAuth Token
// ============================================================================

/// An access/refresh token pair with a locally computed expiry.
///
/// `expiry` is always derived as `now + expires_in` at the moment of
/// issuance. The server-declared absolute timestamps are never trusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    /// Identity token (JWT), when issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Token type, normally `bearer`.
    #[serde(default)]
    pub token_type: String,
    /// Bearer access token.
    pub access_token: String,
    /// Refresh token for the refresh-grant chain. May be absent in a
    /// refresh response, in which case the previous one is kept.
    #[serde(default)]
    pub refresh_token: String,
    /// Granted scope.
    #[serde(default)]
    pub scope: String,
    /// Declared lifetime in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    /// Absolute expiry, computed locally at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECS
}

impl OAuthToken {
    /// Stamps the absolute expiry from the declared lifetime.
    pub fn stamp_expiry(&mut self, issued_at: DateTime<Utc>) {
        self.expiry = Some(issued_at + Duration::seconds(self.expires_in));
    }

    /// Returns true once the token has passed its hard expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Returns true once the token is inside the refresh safety margin.
    ///
    /// The margin is 20% of the declared lifetime, so refresh is due after
    /// 80% of the lifetime has elapsed. An unstamped token is always due.
    pub fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        let Some(expiry) = self.expiry else {
            return true;
        };
        #[allow(clippy::cast_possible_truncation)]
        let margin =
            Duration::seconds((self.expires_in as f64 * REFRESH_MARGIN_FRACTION) as i64);
        expiry - margin <= now
    }

    /// Merges the fields of a refresh response into this token.
    ///
    /// Fields present in the response overwrite; an absent refresh token or
    /// id token keeps the previous value. Expiry is recomputed from `now`.
    pub fn merge_refresh(&mut self, refreshed: OAuthToken, now: DateTime<Utc>) {
        if refreshed.id_token.is_some() {
            self.id_token = refreshed.id_token;
        }
        if !refreshed.token_type.is_empty() {
            self.token_type = refreshed.token_type;
        }
        self.access_token = refreshed.access_token;
        if !refreshed.refresh_token.is_empty() {
            self.refresh_token = refreshed.refresh_token;
        }
        if !refreshed.scope.is_empty() {
            self.scope = refreshed.scope;
        }
        self.expires_in = refreshed.expires_in;
        self.stamp_expiry(now);
    }
}

// ============================================================================
// Decoded Identity
// ============================================================================

/// Identity summary extracted from the (unverified) id token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtUserInfo {
    /// Given name claim.
    pub given_name: String,
    /// Family name claim.
    pub family_name: String,
    /// Convenience concatenation of given and family name.
    pub person_name: String,
}

impl JwtUserInfo {
    /// Builds the identity summary from name claims.
    pub fn new(given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        let given_name = given_name.into();
        let family_name = family_name.into();
        let person_name = format!("{given_name} {family_name}");
        Self {
            given_name,
            family_name,
            person_name,
        }
    }
}

// ============================================================================
// Auth State
// ============================================================================

/// The durable snapshot of one account's OAuth session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthState {
    /// Registered OAuth client, reused across logins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<OAuthClient>,
    /// Current token pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<OAuthToken>,
    /// Decoded identity of the logged-in user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<JwtUserInfo>,
}

impl AuthState {
    /// Returns the current access token, if a token is held.
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.access_token.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in: i64) -> OAuthToken {
        OAuthToken {
            id_token: Some("jwt".into()),
            token_type: "bearer".into(),
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            scope: "openid".into(),
            expires_in,
            expiry: None,
        }
    }

    #[test]
    fn test_expiry_stamped_from_lifetime() {
        let now = Utc::now();
        let mut t = token(3600);
        t.stamp_expiry(now);
        assert_eq!(t.expiry, Some(now + Duration::seconds(3600)));
        assert!(!t.is_expired(now));
        assert!(t.is_expired(now + Duration::seconds(3601)));
    }

    #[test]
    fn test_refresh_due_at_margin() {
        let now = Utc::now();
        let mut t = token(1000);
        t.stamp_expiry(now);
        // Not due before 80% of the lifetime has elapsed.
        assert!(!t.refresh_due(now + Duration::seconds(799)));
        assert!(t.refresh_due(now + Duration::seconds(800)));
        assert!(t.refresh_due(now + Duration::seconds(1200)));
    }

    #[test]
    fn test_unstamped_token_is_always_due() {
        let t = token(1000);
        assert!(t.refresh_due(Utc::now()));
    }

    #[test]
    fn test_zero_lifetime_is_immediately_due() {
        let now = Utc::now();
        let mut t = token(0);
        t.stamp_expiry(now);
        assert!(t.refresh_due(now));
    }

    #[test]
    fn test_merge_refresh_keeps_old_refresh_token() {
        let now = Utc::now();
        let mut current = token(1000);
        current.stamp_expiry(now - Duration::seconds(1000));

        let mut refreshed = token(7200);
        refreshed.access_token = "access2".into();
        refreshed.refresh_token = String::new();
        refreshed.id_token = None;

        current.merge_refresh(refreshed, now);
        assert_eq!(current.access_token, "access2");
        assert_eq!(current.refresh_token, "refresh");
        assert_eq!(current.id_token.as_deref(), Some("jwt"));
        assert_eq!(current.expiry, Some(now + Duration::seconds(7200)));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = AuthCredentials::new("user", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_auth_state_roundtrip() {
        let mut t = token(3600);
        t.stamp_expiry(Utc::now());
        let state = AuthState {
            client: Some(OAuthClient {
                client_id: "id".into(),
                client_secret: "secret".into(),
                scope: "openid".into(),
            }),
            token: Some(t),
            user: Some(JwtUserInfo::new("Anna", "Svensson")),
        };

        let json = serde_json::to_string(&state).unwrap();
        let parsed: AuthState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
        assert_eq!(parsed.access_token(), Some("access"));
        assert_eq!(parsed.user.unwrap().person_name, "Anna Svensson");
    }
}
