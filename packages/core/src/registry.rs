//! Agent Registry & Heartbeat (C10): registration, liveness tracking, node
//! metadata storage.

use std::sync::Arc;
use std::time::Duration;

use aegis_credentials::{hash_api_key, key_prefix, verify_api_key, IssuedCertificate, RootCa};
use aegis_proto::{AgentHeartbeat, AgentRegister, NodeMetadata};
use aegis_store::models::AgentRow;
use aegis_store::Store;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub struct Registration {
    pub agent: AgentRow,
    pub certificate: IssuedCertificate,
}

pub struct Registry {
    store: Store,
    ca: Arc<RootCa>,
}

impl Registry {
    pub fn new(store: Store, ca: Arc<RootCa>) -> Self {
        Self { store, ca }
    }

    /// `POST /agents/register`. No auth: this is the cert-issuance point
    /// itself. Re-registration with the same key refreshes liveness and
    /// re-issues a cert rather than erroring.
    pub async fn register(&self, req: &AgentRegister) -> Result<Registration> {
        let prefix = key_prefix(&req.api_key);

        if let Some(existing) = self.store.find_agent_by_prefix(prefix).await? {
            if !verify_api_key(&req.api_key, &existing.api_key_hash).map_err(aegis_credentials::CredentialError::from)? {
                return Err(CoreError::ApiKeyMismatch);
            }
            let agent = self
                .store
                .reactivate_agent(
                    existing.id,
                    serde_json::to_value(&req.capabilities).unwrap_or_default(),
                    req.metadata.clone(),
                )
                .await?;
            let certificate = self
                .ca
                .issue_leaf(agent.id)
                .map_err(|e| aegis_credentials::CredentialError::Certificate(e.to_string()))?;
            self.audit_registration(agent.id, &req.agent_type.to_string(), &req.agent_subtype, "reactivate").await;
            return Ok(Registration { agent, certificate });
        }

        let hash = hash_api_key(&req.api_key).map_err(aegis_credentials::CredentialError::from)?;
        let agent = self
            .store
            .insert_agent(
                req.agent_type.to_string().as_str(),
                &req.agent_subtype,
                if req.zone.is_empty() { "default" } else { &req.zone },
                serde_json::to_value(&req.capabilities).unwrap_or_default(),
                req.metadata.clone(),
                prefix,
                &hash,
            )
            .await?;
        let certificate = self
            .ca
            .issue_leaf(agent.id)
            .map_err(|e| aegis_credentials::CredentialError::Certificate(e.to_string()))?;
        self.audit_registration(agent.id, &req.agent_type.to_string(), &req.agent_subtype, "register").await;
        Ok(Registration { agent, certificate })
    }

    async fn audit_registration(&self, agent_id: Uuid, agent_type: &str, agent_subtype: &str, action: &str) {
        let details = serde_json::json!({ "agent_type": agent_type, "agent_subtype": agent_subtype });
        if let Err(err) = self.store.append_audit_entry("system", action, Some(&agent_id.to_string()), details).await {
            tracing::warn!(%err, %agent_id, "failed to append audit log entry");
        }
    }

    /// Heartbeat arriving over the bus (`heartbeat.<agent_type>.<agent_id>`,
    /// queue group `agent_manager`). Lazily creates the row if unknown.
    pub async fn apply_bus_heartbeat(&self, hb: &AgentHeartbeat) -> Result<()> {
        match self.store.get_agent(hb.agent_id).await? {
            Some(_) => {
                self.store.record_heartbeat(hb.agent_id, &hb.status, hb.resource_usage.clone()).await?;
            }
            None => {
                self.store
                    .upsert_from_heartbeat(
                        hb.agent_id,
                        hb.agent_type.map(|t| t.to_string()).unwrap_or_else(|| "sentinel".to_string()).as_str(),
                        hb.agent_subtype.as_deref().unwrap_or("unknown"),
                        hb.zone.as_deref().unwrap_or("default"),
                        serde_json::to_value(hb.capabilities.clone().unwrap_or_default()).unwrap_or_default(),
                        &hb.status,
                        hb.resource_usage.clone(),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// HTTP heartbeat fallback. The authenticated agent's id is
    /// authoritative; a payload claiming a different id is rejected.
    pub async fn apply_http_heartbeat(&self, authenticated_agent_id: Uuid, hb: &AgentHeartbeat) -> Result<()> {
        if hb.agent_id != authenticated_agent_id {
            return Err(CoreError::HeartbeatIdentityMismatch {
                authenticated: authenticated_agent_id,
                claimed: hb.agent_id,
            });
        }
        self.store.record_heartbeat(authenticated_agent_id, &hb.status, hb.resource_usage.clone()).await?;
        Ok(())
    }

    /// `node.metadata.<agent_id>`. An unregistered agent is logged and
    /// discarded — metadata never implicitly creates a row.
    pub async fn apply_node_metadata(&self, meta: &NodeMetadata) -> Result<()> {
        let value: Value = serde_json::to_value(meta).unwrap_or_default();
        let stored = self.store.store_node_metadata(meta.agent_id, value).await?;
        if !stored {
            tracing::warn!(agent_id = %meta.agent_id, "discarding node metadata for unregistered agent");
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<AgentRow>> {
        let rows = self.store.list_agents().await?;
        Ok(Store::present_with_staleness(rows))
    }

    pub async fn get(&self, id: Uuid) -> Result<AgentRow> {
        self.store.get_agent(id).await?.ok_or(CoreError::AgentNotFound(id))
    }

    /// Background liveness sweep: `active -> unhealthy` after 90 s of
    /// silence. Runs every 30 s for the lifetime of the process.
    pub fn spawn_liveness_sweep(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                let span = tracing::info_span!("liveness_sweep");
                let _enter = span.enter();
                match self.store.sweep_unhealthy().await {
                    Ok(count) if count > 0 => tracing::info!(count, "marked agents unhealthy"),
                    Ok(_) => {}
                    Err(err) => tracing::warn!(%err, "liveness sweep failed"),
                }
            }
        })
    }
}
