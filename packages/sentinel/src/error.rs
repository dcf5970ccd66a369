#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bus error: {0}")]
    Bus(#[from] aegis_bus::BusError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("credential error: {0}")]
    Credential(#[from] aegis_credentials::CredentialError),
}

pub type Result<T> = std::result::Result<T, SentinelError>;
