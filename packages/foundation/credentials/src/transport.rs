//! Per-agent transport encryption of configuration secrets.
//!
//! `K_agent = SHA-256(api_key)` and `K_core = SHA-256(master_secret)` are
//! derived identically on both sides, so Core can decrypt a field stored
//! under `K_core` and re-encrypt it under the requesting agent's `K_agent`
//! without either side ever exchanging the key material itself.
//!
//! The reference implementation's in-tree encryption helper candidly notes
//! it is not production-ready and recommends the `aes-gcm` crate; this is
//! that replacement.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed (wrong key or tampered ciphertext)")]
    Decrypt,
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// `base64url(SHA-256(secret))`, used identically for `K_agent` (from an
/// agent's API key) and `K_core` (from the process master secret).
pub fn derive_transport_key(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn key_from_derived(derived: &str) -> Result<Key<Aes256Gcm>, TransportError> {
    let raw = URL_SAFE_NO_PAD
        .decode(derived)
        .map_err(|e| TransportError::Malformed(e.to_string()))?;
    if raw.len() != 32 {
        return Err(TransportError::Malformed("derived key must be 32 bytes".into()));
    }
    Ok(*Key::<Aes256Gcm>::from_slice(&raw))
}

/// AES-256-GCM envelope encryption keyed by a base64url SHA-256 derivation.
pub struct TransportCrypto;

impl TransportCrypto {
    /// Encrypts `plaintext` under the key derived from `secret`, returning
    /// a `base64url(nonce || ciphertext)` string suitable for storage in a
    /// text column.
    pub fn encrypt(secret: &str, plaintext: &str) -> Result<String, TransportError> {
        let key = key_from_derived(&derive_transport_key(secret))?;
        let cipher = Aes256Gcm::new(&key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext.as_bytes()).map_err(|_| TransportError::Encrypt)?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    pub fn decrypt(secret: &str, envelope: &str) -> Result<String, TransportError> {
        let key = key_from_derived(&derive_transport_key(secret))?;
        let cipher = Aes256Gcm::new(&key);
        let raw = URL_SAFE_NO_PAD
            .decode(envelope)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        if raw.len() < 12 {
            return Err(TransportError::Malformed("envelope shorter than nonce".into()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| TransportError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Re-encrypts a value that is currently under `from_secret`'s key so
    /// it is instead readable only by whoever holds `to_secret` — used to
    /// move a config secret from storage encryption (`K_core`) to
    /// transport encryption (`K_agent`) without ever exposing plaintext
    /// outside this function.
    pub fn reencrypt(from_secret: &str, to_secret: &str, envelope: &str) -> Result<String, TransportError> {
        let plaintext = Self::decrypt(from_secret, envelope)?;
        Self::encrypt(to_secret, &plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(derive_transport_key("api-key-1"), derive_transport_key("api-key-1"));
        assert_ne!(derive_transport_key("api-key-1"), derive_transport_key("api-key-2"));
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let envelope = TransportCrypto::encrypt("master-secret", "nats://core:4222").unwrap();
        let plain = TransportCrypto::decrypt("master-secret", &envelope).unwrap();
        assert_eq!(plain, "nats://core:4222");
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let envelope = TransportCrypto::encrypt("master-secret", "nats://core:4222").unwrap();
        assert!(TransportCrypto::decrypt("other-secret", &envelope).is_err());
    }

    #[test]
    fn reencrypt_moves_envelope_between_keys() {
        let stored = TransportCrypto::encrypt("K_core", "https://core:8443").unwrap();
        let for_agent = TransportCrypto::reencrypt("K_core", "K_agent", &stored).unwrap();
        assert_eq!(TransportCrypto::decrypt("K_agent", &for_agent).unwrap(), "https://core:8443");
        assert!(TransportCrypto::decrypt("K_core", &for_agent).is_err());
    }
}
