//! Credential Service (C4): per-agent API keys, X.509 client certificate
//! issuance from an internal root, and per-agent transport encryption of
//! configuration secrets.

mod apikey;
mod ca;
mod transport;

pub use apikey::{hash_api_key, verify_api_key, ApiKeyError, API_KEY_PREFIX_LEN};
pub use ca::{IssuedCertificate, RootCa};
pub use transport::{derive_transport_key, TransportCrypto, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(transparent)]
    ApiKey(#[from] ApiKeyError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("certificate issuance failed: {0}")]
    Certificate(String),
}
