use serde_json::Value;
use uuid::Uuid;

use crate::models::AgentConfigRow;
use crate::{Result, Store, StoreError};

impl Store {
    pub async fn get_agent_config(&self, agent_id: Uuid) -> Result<Option<AgentConfigRow>> {
        let row = sqlx::query_as::<_, AgentConfigRow>("SELECT * FROM agent_configs WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Insert-or-replace. `config_version` is reset to 1 on a fresh insert
    /// and bumped on every call against an existing row, matching the
    /// "provision always advances the version" contract.
    #[allow(clippy::too_many_arguments)]
    pub async fn provision_agent_config(
        &self,
        agent_id: Uuid,
        nats_url_enc: &str,
        core_api_url_enc: &str,
        zone: &str,
        log_level: &str,
        environment: &str,
        probe_interval_seconds: i32,
        capabilities: Value,
        detection_thresholds: Value,
    ) -> Result<AgentConfigRow> {
        let existing = self.get_agent_config(agent_id).await?;
        let next_version = existing.as_ref().map(|c| c.config_version + 1).unwrap_or(1);

        let row = sqlx::query_as::<_, AgentConfigRow>(
            r#"INSERT INTO agent_configs
                (id, agent_id, nats_url_enc, core_api_url_enc, zone, log_level,
                 environment, probe_interval_seconds, capabilities, detection_thresholds, config_version)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               ON CONFLICT (agent_id) DO UPDATE SET
                 nats_url_enc = EXCLUDED.nats_url_enc,
                 core_api_url_enc = EXCLUDED.core_api_url_enc,
                 zone = EXCLUDED.zone,
                 log_level = EXCLUDED.log_level,
                 environment = EXCLUDED.environment,
                 probe_interval_seconds = EXCLUDED.probe_interval_seconds,
                 capabilities = EXCLUDED.capabilities,
                 detection_thresholds = EXCLUDED.detection_thresholds,
                 config_version = EXCLUDED.config_version,
                 updated_at = now()
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(agent_id)
        .bind(nats_url_enc)
        .bind(core_api_url_enc)
        .bind(zone)
        .bind(log_level)
        .bind(environment)
        .bind(probe_interval_seconds)
        .bind(capabilities)
        .bind(detection_thresholds)
        .bind(next_version)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Partial update; errors if no row has been provisioned yet (the
    /// caller must `provision_agent_config` first). Always bumps
    /// `config_version`, even when every field happens to already match.
    pub async fn upsert_agent_config_fields(&self, agent_id: Uuid, fields: &UpdatableConfigFields) -> Result<AgentConfigRow> {
        let existing = self
            .get_agent_config(agent_id)
            .await?
            .ok_or(StoreError::ConfigNotProvisioned(agent_id))?;

        let row = sqlx::query_as::<_, AgentConfigRow>(
            r#"UPDATE agent_configs SET
                 nats_url_enc = COALESCE($2, nats_url_enc),
                 core_api_url_enc = COALESCE($3, core_api_url_enc),
                 log_level = COALESCE($4, log_level),
                 environment = COALESCE($5, environment),
                 zone = COALESCE($6, zone),
                 probe_interval_seconds = COALESCE($7, probe_interval_seconds),
                 detection_thresholds = COALESCE($8, detection_thresholds),
                 capabilities = COALESCE($9, capabilities),
                 allowed_actions = COALESCE($10, allowed_actions),
                 action_defaults = COALESCE($11, action_defaults),
                 max_concurrent_actions = COALESCE($12, max_concurrent_actions),
                 config_version = $13,
                 updated_at = now()
               WHERE agent_id = $1 RETURNING *"#,
        )
        .bind(agent_id)
        .bind(&fields.nats_url_enc)
        .bind(&fields.core_api_url_enc)
        .bind(&fields.log_level)
        .bind(&fields.environment)
        .bind(&fields.zone)
        .bind(fields.probe_interval_seconds)
        .bind(&fields.detection_thresholds)
        .bind(&fields.capabilities)
        .bind(&fields.allowed_actions)
        .bind(&fields.action_defaults)
        .bind(fields.max_concurrent_actions)
        .bind(existing.config_version + 1)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

/// Every field is optional; only the ones present are applied, matching
/// `upsert(agent_id, partial, type)` in the spec.
#[derive(Debug, Default)]
pub struct UpdatableConfigFields {
    pub nats_url_enc: Option<String>,
    pub core_api_url_enc: Option<String>,
    pub log_level: Option<String>,
    pub environment: Option<String>,
    pub zone: Option<String>,
    pub probe_interval_seconds: Option<i32>,
    pub detection_thresholds: Option<Value>,
    pub capabilities: Option<Value>,
    pub allowed_actions: Option<Value>,
    pub action_defaults: Option<Value>,
    pub max_concurrent_actions: Option<i32>,
}
