//! PKCE code verifier/challenge generation.
//!
//! The verifier is 40 random bytes, base64url encoded and stripped of
//! non-alphanumeric characters. The challenge is the base64url encoding of
//! the verifier's SHA-256 digest with padding stripped.

use base64::prelude::*;
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::FetchError;

/// Random bytes drawn for the code verifier.
const VERIFIER_RANDOM_BYTES: usize = 40;

/// A generated verifier/challenge pair for one authorization request.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// The locally kept secret, sent with the code exchange.
    pub verifier: String,
    /// The SHA-256-derived challenge, sent with the authorization request.
    pub challenge: String,
}

/// Generates a fresh PKCE pair.
pub fn generate() -> Result<PkcePair, FetchError> {
    let mut bytes = [0u8; VERIFIER_RANDOM_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| FetchError::Random)?;

    let verifier: String = BASE64_URL_SAFE
        .encode(bytes)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();

    let challenge = BASE64_URL_SAFE_NO_PAD.encode(digest(&SHA256, verifier.as_bytes()));

    Ok(PkcePair {
        verifier,
        challenge,
    })
}

// ============================================================================
// Tests
// ============================================================================
