//! Bearer-token verification for the websocket handshake and the legacy
//! chat-completions shim.
//!
//! The token is hashed once at startup (see `bootstrap::hash_token`) into
//! `AppState.api_token_hash`. Per-request verification hashes the
//! presented token and compares in constant time, so timing never leaks
//! how many leading bytes matched.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// `None` means no token is configured (dev mode): every request passes.
pub fn verify(expected_hash: &Option<Vec<u8>>, presented: &str) -> bool {
    let Some(expected) = expected_hash else {
        return true;
    };
    let presented_hash = Sha256::digest(presented.as_bytes());
    bool::from(presented_hash.ct_eq(expected.as_slice()))
}

/// Hashes a configured token for storage in `AppState`.
pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

/// Pulls the bearer token out of an `Authorization: Bearer <token>` header
/// value, or an empty string if the header is missing or malformed.
pub fn bearer_from_header(header: Option<&str>) -> &str {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mode_accepts_anything_when_no_token_configured() {
        assert!(verify(&None, ""));
        assert!(verify(&None, "whatever"));
    }

    #[test]
    fn matching_token_verifies() {
        let hash = hash_token("s3cret");
        assert!(verify(&Some(hash), "s3cret"));
    }

    #[test]
    fn mismatched_token_is_rejected() {
        let hash = hash_token("s3cret");
        assert!(!verify(&Some(hash), "wrong"));
        assert!(!verify(&Some(hash), ""));
    }

    #[test]
    fn bearer_from_header_strips_prefix() {
        assert_eq!(bearer_from_header(Some("Bearer abc123")), "abc123");
        assert_eq!(bearer_from_header(Some("abc123")), "");
        assert_eq!(bearer_from_header(None), "");
    }
}
