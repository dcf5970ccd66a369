#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("agent config not found for agent {0}")]
    ConfigNotProvisioned(uuid::Uuid),
    #[error("agent not found: {0}")]
    AgentNotFound(uuid::Uuid),
}

pub type Result<T> = std::result::Result<T, StoreError>;
