#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] aegis_store::StoreError),
    #[error(transparent)]
    Cache(#[from] aegis_cache::CacheError),
    #[error(transparent)]
    Bus(#[from] aegis_bus::BusError),
    #[error(transparent)]
    Credential(#[from] aegis_credentials::CredentialError),
    #[error("agent not found: {0}")]
    AgentNotFound(uuid::Uuid),
    #[error("api key mismatch")]
    ApiKeyMismatch,
    #[error("config not provisioned for agent {0}")]
    ConfigNotProvisioned(uuid::Uuid),
    #[error("heartbeat identity mismatch: authenticated {authenticated} but payload claims {claimed}")]
    HeartbeatIdentityMismatch { authenticated: uuid::Uuid, claimed: uuid::Uuid },
}

pub type Result<T> = std::result::Result<T, CoreError>;
