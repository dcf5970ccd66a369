use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::AgentRow;
use crate::{Result, Store};

/// Agents whose last heartbeat is older than this are considered stale by
/// the registry's background sweep and by the listing endpoint.
pub const STALE_THRESHOLD_SECONDS: i64 = 90;

impl Store {
    pub async fn find_agent_by_prefix(&self, prefix: &str) -> Result<Option<AgentRow>> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE api_key_prefix = $1")
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_agent(&self, id: Uuid) -> Result<Option<AgentRow>> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRow>> {
        let rows = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Marks rows whose heartbeat has aged past [`STALE_THRESHOLD_SECONDS`]
    /// as `inactive` in the returned copies only — this is the listing
    /// endpoint's presentation rule, not a persisted transition.
    pub fn present_with_staleness(mut rows: Vec<AgentRow>) -> Vec<AgentRow> {
        let cutoff = Utc::now() - Duration::seconds(STALE_THRESHOLD_SECONDS);
        for row in &mut rows {
            if row.last_heartbeat < cutoff {
                row.status = "inactive".to_string();
            }
        }
        rows
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_agent(
        &self,
        agent_type: &str,
        agent_subtype: &str,
        zone: &str,
        capabilities: Value,
        metadata: Value,
        api_key_prefix: &str,
        api_key_hash: &str,
    ) -> Result<AgentRow> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"INSERT INTO agents
                (id, agent_type, agent_subtype, zone, capabilities, node_metadata,
                 api_key_prefix, api_key_hash, status, last_heartbeat)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', now())
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(agent_type)
        .bind(agent_subtype)
        .bind(zone)
        .bind(capabilities)
        .bind(metadata)
        .bind(api_key_prefix)
        .bind(api_key_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Re-registration path: the existing row's key already verified, so
    /// refresh liveness and the caller-supplied profile fields.
    pub async fn reactivate_agent(&self, id: Uuid, capabilities: Value, metadata: Value) -> Result<AgentRow> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"UPDATE agents SET status = 'active', last_heartbeat = now(),
                 capabilities = $2, node_metadata = $3
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(capabilities)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn record_heartbeat(&self, id: Uuid, status: &str, resource_usage: Value) -> Result<()> {
        sqlx::query("UPDATE agents SET last_heartbeat = now(), status = $2, resource_usage = $3 WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(resource_usage)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lazily creates a row for a heartbeat whose agent_id is unknown,
    /// matching the reference registry's "heartbeat as implicit
    /// registration" behavior for agents that never called `/register`
    /// over HTTP (e.g. during a bus-only bootstrap).
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_from_heartbeat(
        &self,
        id: Uuid,
        agent_type: &str,
        agent_subtype: &str,
        zone: &str,
        capabilities: Value,
        status: &str,
        resource_usage: Value,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO agents
                (id, agent_type, agent_subtype, zone, capabilities, status,
                 last_heartbeat, resource_usage, api_key_prefix, api_key_hash)
               VALUES ($1, $2, $3, $4, $5, $6, now(), $7, '', '')
               ON CONFLICT (id) DO UPDATE SET
                 status = EXCLUDED.status,
                 last_heartbeat = now(),
                 resource_usage = EXCLUDED.resource_usage"#,
        )
        .bind(id)
        .bind(agent_type)
        .bind(agent_subtype)
        .bind(zone)
        .bind(capabilities)
        .bind(status)
        .bind(resource_usage)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn store_node_metadata(&self, id: Uuid, metadata: Value) -> Result<bool> {
        let result = sqlx::query("UPDATE agents SET node_metadata = $2 WHERE id = $1")
            .bind(id)
            .bind(metadata)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_agent_profile(
        &self,
        id: Uuid,
        agent_subtype: Option<&str>,
        zone: Option<&str>,
        capabilities: Option<Value>,
    ) -> Result<Option<AgentRow>> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"UPDATE agents SET
                 agent_subtype = COALESCE($2, agent_subtype),
                 zone = COALESCE($3, zone),
                 capabilities = COALESCE($4, capabilities)
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(agent_subtype)
        .bind(zone)
        .bind(capabilities)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Background liveness sweep: persists `active -> unhealthy` for any
    /// agent whose heartbeat is older than [`STALE_THRESHOLD_SECONDS`].
    /// Distinct from [`Self::present_with_staleness`], which only affects
    /// the listing endpoint's response and never writes to the row.
    pub async fn sweep_unhealthy(&self) -> Result<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::seconds(STALE_THRESHOLD_SECONDS);
        let result = sqlx::query("UPDATE agents SET status = 'unhealthy' WHERE status = 'active' AND last_heartbeat < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
