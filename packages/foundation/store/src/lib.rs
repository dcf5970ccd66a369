//! Relational Store (C3): durable storage for agents, events, alerts,
//! actions and the hash-chained audit log, backed by `sqlx`.

mod actions;
mod agent_configs;
mod agents;
mod alerts;
mod audit;
mod error;
mod events;
mod infra_nodes;
pub mod models;
mod users;

pub use error::{Result, StoreError};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Handle shared by every Core subsystem that touches the database. Holds
/// a connection pool; all queries run as short-lived transactions or
/// single statements per the spec's shared-resource policy.
#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(20).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}
