//! JWT payload decoding.
//!
//! The id token is decoded WITHOUT signature verification: it was obtained
//! over a channel we just authenticated against, and verifying locally would
//! break on the vendor's key rotation. This is a documented trust boundary,
//! not an omission.

use base64::prelude::*;
use serde::Deserialize;
use tracing::trace;

use crate::error::FetchError;

/// Claims the integration reads from the id token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    /// Given name claim.
    pub given_name: Option<String>,
    /// Family name claim.
    pub family_name: Option<String>,
    /// Subject (user id).
    pub sub: Option<String>,
    /// Expiration timestamp (epoch seconds).
    pub exp: Option<i64>,
}

/// Decodes a JWT and extracts its payload claims.
pub fn decode_payload(token: &str) -> Result<IdTokenClaims, FetchError> {
    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(FetchError::Jwt(format!(
            "invalid JWT format: expected 3 parts, got {}",
            parts.len()
        )));
    }

    // JWT uses base64url without padding; fall back to standard base64 for
    // tolerant handling of non-conforming issuers.
    let decoded = BASE64_URL_SAFE_NO_PAD
        .decode(parts[1])
        .or_else(|_| BASE64_STANDARD.decode(parts[1]))
        .map_err(|e| FetchError::Jwt(format!("base64 decode error: {e}")))?;

    let payload = String::from_utf8(decoded)
        .map_err(|e| FetchError::Jwt(format!("utf-8 decode error: {e}")))?;
    trace!(payload = %payload, "Decoded JWT payload");

    serde_json::from_str(&payload).map_err(|e| FetchError::Jwt(format!("JSON parse error: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        let payload_b64 = BASE64_URL_SAFE_NO_PAD.encode(payload.as_bytes());
        format!("eyJhbGciOiJIUzI1NiJ9.{payload_b64}.signature")
    }

    #[test]
    fn test_decode_name_claims() {
        let token =
            token_with_payload(r#"{"given_name":"Anna","family_name":"Svensson","sub":"123"}"#);
        let claims = decode_payload(&token).unwrap();
        assert_eq!(claims.given_name.as_deref(), Some("Anna"));
        assert_eq!(claims.family_name.as_deref(), Some("Svensson"));
        assert_eq!(claims.sub.as_deref(), Some("123"));
    }

    #[test]
    fn test_decode_tolerates_missing_claims() {
        let token = token_with_payload(r#"{"sub":"123"}"#);
        let claims = decode_payload(&token).unwrap();
        assert!(claims.given_name.is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(decode_payload("not.a.valid.jwt").is_err());
        assert!(decode_payload("only_one_part").is_err());
        assert!(decode_payload("").is_err());
    }
}
