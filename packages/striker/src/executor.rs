//! Action Executor (C12): decode -> allowlist check -> merge defaults ->
//! pre-evidence -> execute -> post-evidence -> rollback registration ->
//! status publish. Grounded in `action_executor/service.py`, generalized
//! from its fixed three-action map to the typed registry in `actions/`.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use aegis_bus::Bus;
use aegis_proto::EvidenceBundle;

use crate::actions::{self, ActionOutcome, ActionParams};
use crate::evidence;
use crate::rollback::RollbackManager;
use crate::runtime_config::SharedRuntimeConfig;

const ACTIONS_STATUS_SUBJECT: &str = "actions.status";
const SEEN_CAPACITY: usize = 2048;

/// Loosely-typed wire shape for an incoming dispatch: mirrors the
/// reference `_ActionDict` duck-typing, accepting either `action_type`
/// or the older `type` key and either `parameters` or `params`.
#[derive(Debug, Deserialize)]
pub struct IncomingAction {
    #[serde(default)]
    action_id: Option<Uuid>,
    #[serde(default)]
    incident_id: Option<Uuid>,
    #[serde(default, alias = "type")]
    action_type: String,
    #[serde(default, alias = "params")]
    parameters: Value,
    #[serde(default)]
    is_rollback: bool,
    #[serde(default)]
    original_action_id: Option<String>,
}

pub struct ActionExecutor {
    agent_id: Uuid,
    bus: Arc<Bus>,
    runtime_config: SharedRuntimeConfig,
    rollback: RollbackManager,
    semaphore: Option<Arc<Semaphore>>,
    seen: Mutex<VecDeque<Uuid>>,
}

impl ActionExecutor {
    pub fn new(agent_id: Uuid, bus: Arc<Bus>, runtime_config: SharedRuntimeConfig, rollback: RollbackManager) -> Self {
        Self { agent_id, bus, runtime_config, rollback, semaphore: None, seen: Mutex::new(VecDeque::new()) }
    }

    pub async fn handle_incoming(self: &Arc<Self>, incoming: IncomingAction) {
        let action_id = incoming.action_id.unwrap_or_else(Uuid::new_v4);

        if !self.mark_seen(action_id).await {
            tracing::debug!(%action_id, "duplicate action delivery, ignoring");
            return;
        }

        if incoming.action_type.is_empty() {
            tracing::warn!(%action_id, "action payload missing action_type, dropping");
            return;
        }

        let config = self.runtime_config.read().await.clone();

        if actions::descriptor_for(&incoming.action_type).is_none() {
            tracing::error!(%action_id, action_type = %incoming.action_type, "unknown action type");
            return;
        }

        if !config.allows(&incoming.action_type) {
            tracing::warn!(%action_id, action_type = %incoming.action_type, "action rejected by allowlist");
            self.publish_status(action_id, incoming.incident_id, &incoming.action_type, "rejected", Value::Null, None).await;
            return;
        }

        let merged = actions::merge_params(config.defaults_for(&incoming.action_type), incoming.parameters);
        let params = match actions::parse_params(&incoming.action_type, merged) {
            Ok(p) => p,
            Err(err) => {
                tracing::error!(%action_id, %err, "invalid action parameters");
                self.publish_status(action_id, incoming.incident_id, &incoming.action_type, "error", serde_json::json!({"error": err.to_string()}), None).await;
                return;
            }
        };

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.run(action_id, incoming.incident_id, incoming.action_type, params, incoming.is_rollback, incoming.original_action_id).await;
        });
    }

    async fn run(
        self: Arc<Self>,
        action_id: Uuid,
        incident_id: Option<Uuid>,
        action_type: String,
        params: ActionParams,
        is_rollback: bool,
        original_action_id: Option<String>,
    ) {
        let _permit = match &self.semaphore {
            Some(sem) => Some(sem.clone().acquire_owned().await.ok()).flatten(),
            None => None,
        };

        let pre = evidence::capture_snapshot().await;
        let outcome: ActionOutcome = actions::execute(&params).await;
        let post = evidence::capture_snapshot().await;

        tracing::info!(%action_id, action_type, succeeded = outcome.succeeded, "action executed");

        if outcome.succeeded && !is_rollback {
            if let Some(reg) = actions::rollback_for(action_id, &params) {
                self.rollback.register(action_id, action_type.clone(), reg.rollback_action_type, reg.rollback_params, reg.auto_rollback_after).await;
            }
        }

        let status = if outcome.succeeded { "completed" } else { "failed" };
        let mut result_data = outcome.result_data;
        if let Some(original) = original_action_id {
            if let Value::Object(map) = &mut result_data {
                map.insert("original_action_id".to_string(), Value::String(original));
            }
        }

        let evidence = EvidenceBundle { pre: Some(pre), post: Some(post) };
        self.publish_status(action_id, incident_id, &action_type, status, result_data, Some(evidence)).await;
    }

    async fn publish_status(&self, action_id: Uuid, incident_id: Option<Uuid>, action_type: &str, status: &str, result_data: Value, evidence: Option<EvidenceBundle>) {
        let payload = serde_json::json!({
            "action_id": action_id,
            "incident_id": incident_id,
            "striker_id": self.agent_id,
            "action_type": action_type,
            "status": status,
            "result_data": result_data,
            "evidence": evidence,
        });
        if let Err(err) = self.bus.publish_json(ACTIONS_STATUS_SUBJECT, &payload).await {
            tracing::error!(%err, %action_id, "failed to publish action status");
        }
    }

    /// Bounded FIFO de-dup: Core can dispatch the same action on both
    /// `actions.broadcast` and `actions.<action_type>`, and this agent
    /// subscribes to both, so the same `action_id` may arrive twice.
    async fn mark_seen(&self, action_id: Uuid) -> bool {
        let mut seen = self.seen.lock().await;
        if seen.contains(&action_id) {
            return false;
        }
        seen.push_back(action_id);
        if seen.len() > SEEN_CAPACITY {
            seen.pop_front();
        }
        true
    }

    pub fn with_concurrency_cap(mut self, max_concurrent: Option<u32>) -> Self {
        self.semaphore = max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1) as usize)));
        self
    }
}
