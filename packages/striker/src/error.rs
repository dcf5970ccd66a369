#[derive(Debug, thiserror::Error)]
pub enum StrikerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("registration rejected: {0}")]
    Registration(String),
    #[error("bus error: {0}")]
    Bus(#[from] aegis_bus::BusError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unknown action type: {0}")]
    UnknownActionType(String),
    #[error("invalid action parameters for {action_type}: {reason}")]
    InvalidParameters { action_type: String, reason: String },
    #[error("credential error: {0}")]
    Credential(#[from] aegis_credentials::CredentialError),
}

pub type Result<T> = std::result::Result<T, StrikerError>;
