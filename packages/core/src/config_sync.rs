//! Config Sync (C11): versioned per-agent configuration with
//! transport-encrypted secrets, pushed over the bus on every update.

use std::sync::Arc;

use aegis_bus::Bus;
use aegis_credentials::TransportCrypto;
use aegis_store::agent_configs::UpdatableConfigFields;
use aegis_store::models::AgentConfigRow;
use aegis_store::Store;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Result;

pub struct ConfigSync {
    store: Store,
    bus: Arc<Bus>,
    master_secret: String,
}

fn config_subject(agent_id: Uuid) -> String {
    format!("config.{agent_id}")
}

impl ConfigSync {
    pub fn new(store: Store, bus: Arc<Bus>, master_secret: String) -> Self {
        Self { store, bus, master_secret }
    }

    /// `provision(agent_id, type, nats_url, core_api_url, ...)`. Encrypts
    /// the two sensitive fields under `K_core` before storing. Always
    /// bumps `config_version`, including on the first insert (which lands
    /// at 1).
    #[allow(clippy::too_many_arguments)]
    pub async fn provision(
        &self,
        agent_id: Uuid,
        nats_url: &str,
        core_api_url: &str,
        zone: &str,
        log_level: &str,
        environment: &str,
        probe_interval_seconds: i32,
        capabilities: Value,
        detection_thresholds: Value,
    ) -> Result<AgentConfigRow> {
        let nats_url_enc = TransportCrypto::encrypt(&self.master_secret, nats_url).map_err(aegis_credentials::CredentialError::from)?;
        let core_api_url_enc =
            TransportCrypto::encrypt(&self.master_secret, core_api_url).map_err(aegis_credentials::CredentialError::from)?;

        let row = self
            .store
            .provision_agent_config(
                agent_id,
                &nats_url_enc,
                &core_api_url_enc,
                zone,
                log_level,
                environment,
                probe_interval_seconds,
                capabilities,
                detection_thresholds,
            )
            .await?;
        self.push(agent_id).await;
        Ok(row)
    }

    /// Partial update against an already-provisioned row; errors
    /// (`ConfigNotProvisioned`) surface as 404 at the HTTP boundary.
    pub async fn upsert(&self, agent_id: Uuid, fields: UpdatableConfigFields) -> Result<AgentConfigRow> {
        let row = self.store.upsert_agent_config_fields(agent_id, &fields).await?;
        self.push(agent_id).await;
        Ok(row)
    }

    /// `get_for_agent`: storage-decrypts under `K_core`, re-encrypts under
    /// the requesting agent's `K_agent` so only that agent can read the
    /// sensitive fields in transit.
    pub async fn get_for_agent(&self, agent_id: Uuid, agent_api_key: &str) -> Result<Value> {
        let row = self
            .store
            .get_agent_config(agent_id)
            .await?
            .ok_or(crate::error::CoreError::ConfigNotProvisioned(agent_id))?;

        let nats_url_enc = row
            .nats_url_enc
            .as_deref()
            .map(|enc| TransportCrypto::reencrypt(&self.master_secret, agent_api_key, enc))
            .transpose()
            .map_err(aegis_credentials::CredentialError::from)?;
        let core_api_url_enc = row
            .core_api_url_enc
            .as_deref()
            .map(|enc| TransportCrypto::reencrypt(&self.master_secret, agent_api_key, enc))
            .transpose()
            .map_err(aegis_credentials::CredentialError::from)?;

        Ok(json!({
            "agent_id": agent_id,
            "nats_url_enc": nats_url_enc,
            "core_api_url_enc": core_api_url_enc,
            "log_level": row.log_level,
            "environment": row.environment,
            "zone": row.zone,
            "detection_thresholds": row.detection_thresholds,
            "probe_interval_seconds": row.probe_interval_seconds,
            "enabled_probes": row.enabled_probes,
            "capabilities": row.capabilities,
            "allowed_actions": row.allowed_actions,
            "action_defaults": row.action_defaults,
            "max_concurrent_actions": row.max_concurrent_actions,
            "config_version": row.config_version,
        }))
    }

    /// Non-sensitive view for the operator-facing `GET
    /// /agents/{id}/config` route: omits the encrypted fields entirely
    /// rather than exposing ciphertext.
    pub async fn get_public_view(&self, agent_id: Uuid) -> Result<Option<AgentConfigRow>> {
        Ok(self.store.get_agent_config(agent_id).await?)
    }

    /// Pushes the full plaintext snapshot (Core's own view, pre-transport
    /// re-encryption) on `config.<agent_id>` so the agent applies it
    /// immediately rather than waiting for its next poll. Re-encryption
    /// happens agent-side against the bundle it already trusts via mTLS
    /// plus its API key, matching the push-then-poll-converges contract.
    async fn push(&self, agent_id: Uuid) {
        let Ok(Some(row)) = self.store.get_agent_config(agent_id).await else {
            tracing::warn!(%agent_id, "config push skipped: row vanished after upsert");
            return;
        };
        let payload = json!({
            "agent_id": agent_id,
            "log_level": row.log_level,
            "environment": row.environment,
            "zone": row.zone,
            "detection_thresholds": row.detection_thresholds,
            "probe_interval_seconds": row.probe_interval_seconds,
            "enabled_probes": row.enabled_probes,
            "capabilities": row.capabilities,
            "allowed_actions": row.allowed_actions,
            "action_defaults": row.action_defaults,
            "max_concurrent_actions": row.max_concurrent_actions,
            "config_version": row.config_version,
        });
        if let Err(err) = self.bus.publish_json(config_subject(agent_id).as_str(), &payload).await {
            tracing::warn!(%agent_id, %err, "failed to push config update on bus");
        }
    }
}
