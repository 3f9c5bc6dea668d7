//! OAuth-with-PKCE login state machine.
//!
//! Produces and keeps fresh an [`AuthState`] for one account. The flow
//! mirrors the vendor's Curity-based authorization server:
//!
//! 1. Dynamic client registration (once, cached in the state): a
//!    client-credentials grant with fixed registration credentials yields a
//!    short-lived bearer token, which registers a new OAuth client.
//! 2. Full login chain: authorize request with a PKCE challenge (the
//!    server-issued state rides in the redirect `Location`), HTML form
//!    login (login token in hidden inputs), code exchange via a second
//!    redirect, then the token endpoint with the code verifier.
//! 3. Refresh chain: `grant_type=refresh_token` with Basic auth.
//!
//! No step is idempotent (login consumes a one-time code and state), and no
//! two logins/refreshes may run concurrently for the same state — the
//! methods take `&mut self`, so the compiler enforces the serialization the
//! coordinator relies on.

use base64::prelude::*;
use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use icasync_core::{AuthCredentials, AuthState, JwtUserInfo, OAuthClient, OAuthToken};

use crate::client::HttpClient;
use crate::error::FetchError;
use crate::{jwt, pkce};

// ============================================================================
// Constants
// ============================================================================

/// Authorization server base URL.
pub const DEFAULT_AUTH_BASE: &str = "https://ims.icagruppen.se";

/// Authorize endpoint.
const AUTHORIZE_PATH: &str = "oauth/v2/authorize";
/// Token endpoint.
const TOKEN_PATH: &str = "oauth/v2/token";
/// HTML form login endpoint.
const LOGIN_PATH: &str = "authn/authenticate/IcaCustomers";
/// Dynamic client registration endpoint.
const REGISTER_PATH: &str = "register";

/// Fixed registration credentials for the client-credentials grant.
const DCR_CLIENT_ID: &str = "ica-app-dcr-registration";
const DCR_CLIENT_SECRET: &str =
    "uxLHTBvZ-Z2fV-SbrHl1E-tz7vB3jQFrwAdSLlbVMMu1rxDdvJU0s8KGu9d1wLS4";
/// Software id sent with the registration payload.
const DCR_SOFTWARE_ID: &str = "dcr-ica-app-template";

/// App redirect URI registered with the authorization server.
const REDIRECT_URI: &str = "icacurity://app";
/// Authentication context class for the HTML form authenticator.
const ACR: &str = "urn:se:curity:authentication:html-form:IcaCustomers";

/// Bounded fallback retries: a 400 on the refresh chain drops the token and
/// retries as a full login at most this many times before raising fatally.
const MAX_REFRESH_RETRIES: u32 = 2;

// ============================================================================
// Authenticator
// ============================================================================

/// The login/refresh state machine for one account session.
pub struct IcaAuthenticator {
    http: HttpClient,
    base_url: Url,
    credentials: AuthCredentials,
    state: AuthState,
}

impl IcaAuthenticator {
    /// Creates an authenticator, resuming from a prior state when given one.
    pub fn new(
        credentials: AuthCredentials,
        state: Option<AuthState>,
    ) -> Result<Self, FetchError> {
        Self::with_base_url(credentials, state, DEFAULT_AUTH_BASE)
    }

    /// Creates an authenticator against a non-default authorization server.
    pub fn with_base_url(
        credentials: AuthCredentials,
        state: Option<AuthState>,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidResponse(format!("invalid base url: {e}")))?;
        Ok(Self {
            http: HttpClient::new()?,
            base_url,
            credentials,
            state: state.unwrap_or_default(),
        })
    }

    /// The current auth state.
    pub fn auth_state(&self) -> &AuthState {
        &self.state
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    // ========================================================================
    // Entry Point
    // ========================================================================

    /// Ensures a valid auth state is loaded, returning it.
    ///
    /// Registers a client and runs the full login chain when nothing usable
    /// is held (a just-registered client always forces a full login, since
    /// any held token belongs to a client the server no longer knows); runs
    /// the refresh chain when the token is expired, inside its refresh
    /// margin, or `force_refresh` is set. A 400 during refresh means
    /// the refresh token is dead: the token is dropped and a full login is
    /// retried, bounded, before the error becomes fatal.
    #[instrument(skip(self))]
    pub async fn ensure_login(&mut self, force_refresh: bool) -> Result<AuthState, FetchError> {
        let mut force = force_refresh;
        let mut retries: u32 = 0;

        loop {
            let mut new_client = false;
            if self.state.client.is_none() {
                let client = self.register_client().await?;
                debug!(client_id = %client.client_id, "Registered new OAuth client");
                self.state.client = Some(client);
                new_client = true;
            }

            // A token issued to an older client cannot be refreshed against
            // a freshly registered one; start over with a full login.
            if new_client || self.state.token.is_none() {
                self.full_login().await?;
            }

            let now = Utc::now();
            let due = force
                || self
                    .state
                    .token
                    .as_ref()
                    .is_some_and(|token| token.refresh_due(now));
            if !due {
                return Ok(self.state.clone());
            }

            match self.refresh_chain().await {
                Ok(()) => return Ok(self.state.clone()),
                Err(err) if err.is_bad_request() && retries < MAX_REFRESH_RETRIES => {
                    warn!(
                        attempt = retries + 1,
                        "Got 400 during token refresh, falling back to a full login"
                    );
                    retries += 1;
                    force = false;
                    self.state.token = None;
                    self.state.user = None;
                }
                Err(err) => {
                    if err.is_bad_request() {
                        warn!("Could not refresh a new token, retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }

    // ========================================================================
    // Client Registration
    // ========================================================================

    /// Obtains the short-lived bearer token for app registration.
    async fn registration_token(&self) -> Result<String, FetchError> {
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response: TokenResponse = self
            .http
            .post_form(
                &self.url(TOKEN_PATH),
                None,
                &[
                    ("client_id", DCR_CLIENT_ID),
                    ("client_secret", DCR_CLIENT_SECRET),
                    ("grant_type", "client_credentials"),
                    ("scope", "dcr"),
                    ("response_type", "token"),
                ],
            )
            .await?;
        Ok(response.access_token)
    }

    /// Registers a new OAuth client. Expensive; the result is cached in the
    /// state and reused until the server rejects it.
    #[instrument(skip(self))]
    async fn register_client(&self) -> Result<OAuthClient, FetchError> {
        let registration_token = self.registration_token().await?;
        let auth = format!("Bearer {registration_token}");
        let client: OAuthClient = self
            .http
            .post_json(
                &self.url(REGISTER_PATH),
                Some(&auth),
                &serde_json::json!({ "software_id": DCR_SOFTWARE_ID }),
            )
            .await?;
        Ok(client)
    }

    // ========================================================================
    // Full Login Chain
    // ========================================================================

    /// Runs the complete four-leg login chain, storing token and identity.
    #[instrument(skip(self))]
    async fn full_login(&mut self) -> Result<(), FetchError> {
        info!("Full login initiated");
        let client = self
            .state
            .client
            .clone()
            .ok_or_else(|| FetchError::InvalidResponse("no registered client".into()))?;

        let pkce = pkce::generate()?;
        let state = self.authorize(&client, &pkce.challenge).await?;
        let login_token = self.form_login(&state).await?;
        let mut token = self
            .exchange_code(&client, &state, &login_token, &pkce.verifier)
            .await?;

        let now = Utc::now();
        token.stamp_expiry(now);
        debug!(expiry = ?token.expiry, "Access token issued");

        self.state.user = match &token.id_token {
            Some(id_token) => user_info_from_id_token(id_token)?,
            None => None,
        };
        self.state.token = Some(token);
        Ok(())
    }

    /// Starts the authorization request, returning the server-issued state
    /// token carried in the redirect `Location`.
    async fn authorize(
        &self,
        client: &OAuthClient,
        code_challenge: &str,
    ) -> Result<String, FetchError> {
        let location = self
            .http
            .get_redirect(
                &self.url(AUTHORIZE_PATH),
                &[
                    ("client_id", client.client_id.as_str()),
                    ("scope", client.scope.as_str()),
                    ("redirect_uri", REDIRECT_URI),
                    ("response_type", "code"),
                    ("code_challenge", code_challenge),
                    ("code_challenge_method", "S256"),
                    ("prompt", "login"),
                    ("acr", ACR),
                ],
            )
            .await?;

        let state = capture(&location, r"[?&]state=([A-Za-z0-9_-]+)")
            .ok_or_else(|| FetchError::InvalidResponse("no state in redirect".into()))?;
        debug!(state = %state, "State (client)");
        Ok(state)
    }

    /// Submits the credentials to the HTML form login, returning the opaque
    /// login token echoed back in a hidden input field.
    async fn form_login(&self, state: &str) -> Result<String, FetchError> {
        let html = self
            .http
            .post_form_text(
                &self.url(LOGIN_PATH),
                &[
                    ("userName", self.credentials.username.as_str()),
                    ("password", self.credentials.password.as_str()),
                ],
            )
            .await
            .map_err(|err| {
                if err.is_bad_request() {
                    FetchError::InvalidCredentials
                } else {
                    err
                }
            })?;

        let server_state = capture_hidden_input(&html, "state")
            .ok_or_else(|| FetchError::InvalidResponse("no state field in login form".into()))?;
        let login_token = capture_hidden_input(&html, "token")
            .ok_or_else(|| FetchError::InvalidResponse("no token field in login form".into()))?;

        // The server's echoed state is advisory; a mismatch is tolerated.
        if server_state != state {
            warn!(client = %state, server = %server_state, "States are different");
        } else {
            debug!(state = %server_state, "State (server)");
        }
        Ok(login_token)
    }

    /// Exchanges the login token for an authorization code, then the code
    /// (plus the PKCE verifier) for an access/refresh token pair.
    async fn exchange_code(
        &self,
        client: &OAuthClient,
        state: &str,
        login_token: &str,
        code_verifier: &str,
    ) -> Result<OAuthToken, FetchError> {
        let location = self
            .http
            .post_form_redirect(
                &self.url(AUTHORIZE_PATH),
                &[
                    ("client_id", client.client_id.as_str()),
                    ("forceAuthN", "true"),
                    ("acr", ACR),
                ],
                &[("token", login_token), ("state", state)],
            )
            .await?;

        let code = capture(&location, r"[?&]code=([A-Za-z0-9_-]+)")
            .ok_or_else(|| FetchError::InvalidResponse("no code in redirect".into()))?;
        debug!("Authorization code obtained");

        self.http
            .post_form(
                &self.url(TOKEN_PATH),
                None,
                &[
                    ("code", code.as_str()),
                    ("client_id", client.client_id.as_str()),
                    ("client_secret", client.client_secret.as_str()),
                    ("grant_type", "authorization_code"),
                    ("scope", client.scope.as_str()),
                    ("response_type", "token"),
                    ("code_verifier", code_verifier),
                    ("redirect_uri", REDIRECT_URI),
                ],
            )
            .await
    }

    // ========================================================================
    // Refresh Chain
    // ========================================================================

    /// Requests a new access token via the refresh grant, merging the
    /// response into the held token.
    #[instrument(skip(self))]
    async fn refresh_chain(&mut self) -> Result<(), FetchError> {
        let client = self
            .state
            .client
            .as_ref()
            .ok_or_else(|| FetchError::InvalidResponse("no registered client".into()))?;
        let basic = basic_auth(client);
        let token_url = self.url(TOKEN_PATH);
        let token = self
            .state
            .token
            .as_mut()
            .ok_or_else(|| FetchError::InvalidResponse("no token to refresh".into()))?;
        let refreshed: OAuthToken = self
            .http
            .post_form(
                &token_url,
                Some(&basic),
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", token.refresh_token.as_str()),
                ],
            )
            .await?;

        token.merge_refresh(refreshed, Utc::now());
        debug!(expiry = ?token.expiry, "Token refreshed");
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds the Basic auth header value for `client_id:client_secret`.
fn basic_auth(client: &OAuthClient) -> String {
    let raw = format!("{}:{}", client.client_id, client.client_secret);
    format!("Basic {}", BASE64_STANDARD.encode(raw))
}

/// First capture group of `pattern` in `haystack`.
fn capture(haystack: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Value of a hidden `<input>` field in the login form HTML.
fn capture_hidden_input(html: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"<input type="hidden" name="{name}" value="(\w*)"#);
    capture(html, &pattern)
}

/// Decodes the id token payload into an identity summary.
///
/// Missing name claims degrade to no identity rather than failing the
/// login: the token itself is still valid.
fn user_info_from_id_token(id_token: &str) -> Result<Option<JwtUserInfo>, FetchError> {
    let claims = jwt::decode_payload(id_token)?;
    match (claims.given_name, claims.family_name) {
        (Some(given), Some(family)) => Ok(Some(JwtUserInfo::new(given, family))),
        _ => {
            warn!("Id token carried no name claims");
            Ok(None)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_encoding() {
        let client = OAuthClient {
            client_id: "id".into(),
            client_secret: "secret".into(),
            scope: "openid".into(),
        };
        assert_eq!(
            basic_auth(&client),
            format!("Basic {}", BASE64_STANDARD.encode("id:secret"))
        );
    }

    #[test]
    fn test_capture_state_from_location() {
        let location = "https://ims.example/authn/authenticate?foo=1&state=aB3_x-9";
        assert_eq!(
            capture(location, r"[?&]state=([A-Za-z0-9_-]+)").as_deref(),
            Some("aB3_x-9")
        );
    }

    #[test]
    fn test_capture_hidden_input() {
        let html = r#"
            <form method="post">
              <input type="hidden" name="state" value="srvstate123">
              <input type="hidden" name="token" value="logintok456">
            </form>"#;
        assert_eq!(
            capture_hidden_input(html, "state").as_deref(),
            Some("srvstate123")
        );
        assert_eq!(
            capture_hidden_input(html, "token").as_deref(),
            Some("logintok456")
        );
        assert!(capture_hidden_input(html, "missing").is_none());
    }
}
