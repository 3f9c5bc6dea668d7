//! Fetch error types.

use thiserror::Error;

/// Error type for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the server.
    #[error("HTTP status {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The form login rejected the supplied credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// An authorize leg did not return the expected redirect.
    #[error("Expected a Location redirect from {0}")]
    MissingRedirect(String),

    /// A response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JWT payload decoding error.
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] icasync_core::CoreError),

    /// Random generation failed (PKCE verifier).
    #[error("Could not generate random bytes")]
    Random,
}

impl FetchError {
    /// The HTTP status code, when this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for a 401, the session-invalidated signal.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// True for a 400, the dead-refresh-token signal on the token endpoint.
    pub fn is_bad_request(&self) -> bool {
        self.status() == Some(400)
    }
}
