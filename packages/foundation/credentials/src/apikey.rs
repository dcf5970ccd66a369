//! Per-agent API key hashing and verification.
//!
//! Agents generate their own high-entropy secret at enrollment time; Core
//! never sees the plaintext again after the first registration call. The
//! first [`API_KEY_PREFIX_LEN`] characters are kept as an indexed,
//! non-secret lookup key so a registration/heartbeat request can find the
//! candidate row in O(1) before paying for the slow hash comparison.

use bcrypt::{hash, verify, DEFAULT_COST};

pub const API_KEY_PREFIX_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

/// First `API_KEY_PREFIX_LEN` characters of the key, or the whole key if
/// shorter (mirrors the reference system's lenient slicing rather than
/// rejecting short keys outright).
pub fn key_prefix(api_key: &str) -> &str {
    if api_key.len() >= API_KEY_PREFIX_LEN {
        &api_key[..API_KEY_PREFIX_LEN]
    } else {
        api_key
    }
}

pub fn hash_api_key(api_key: &str) -> Result<String, ApiKeyError> {
    Ok(hash(api_key, DEFAULT_COST)?)
}

/// Verifies `api_key` against a stored hash. A prefix match with a hash
/// mismatch must be rejected by the caller as a collision, not silently
/// treated as "not found" — this function only answers the hash question.
pub fn verify_api_key(api_key: &str, hash: &str) -> Result<bool, ApiKeyError> {
    Ok(verify(api_key, hash)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_of_long_key_is_truncated() {
        let key = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(key_prefix(key), &key[..16]);
    }

    #[test]
    fn prefix_of_short_key_is_whole_key() {
        assert_eq!(key_prefix("short"), "short");
    }

    #[test]
    fn hash_then_verify_roundtrips() {
        let hashed = hash_api_key("a-very-long-high-entropy-agent-secret").unwrap();
        assert!(verify_api_key("a-very-long-high-entropy-agent-secret", &hashed).unwrap());
        assert!(!verify_api_key("wrong-secret", &hashed).unwrap());
    }
}
