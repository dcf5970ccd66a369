//! Action registry (C12): one strongly-typed params variant per
//! `action_type`, looked up by name, so the allowlist check and rollback
//! wiring are exhaustive at the type level instead of a name -> handler
//! map with loosely-typed parameters.

mod isolate;
mod network;
mod process;

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, StrikerError};

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct NetworkBlockParams {
    pub target: String,
    #[serde(default = "default_block_duration")]
    pub duration: u64,
}

fn default_block_duration() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct NetworkUnblockParams {
    pub target: String,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct IsolateHostParams {
    #[serde(default = "default_isolate_reason")]
    pub reason: String,
    #[serde(default)]
    pub alert_id: String,
}

fn default_isolate_reason() -> String {
    "automated_isolation".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct UnisolateHostParams {
    #[serde(default)]
    pub original_action_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct KillProcessParams {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub process_name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ActionParams {
    NetworkBlock(NetworkBlockParams),
    NetworkUnblock(NetworkUnblockParams),
    IsolateHost(IsolateHostParams),
    UnisolateHost(UnisolateHostParams),
    KillProcess(KillProcessParams),
}

/// Lookup metadata for one action type: whether `actions.broadcast`
/// (queue-group, shared across every capable Striker) may carry it versus
/// requiring direct `actions.<striker_id>` dispatch, and whether it
/// reverses. Execution and rollback wiring themselves happen in the
/// exhaustive matches below, not through this table.
pub struct ActionDescriptor {
    pub action_type: &'static str,
    pub allow_broadcast: bool,
}

const REGISTRY: &[ActionDescriptor] = &[
    ActionDescriptor { action_type: "network_block", allow_broadcast: true },
    ActionDescriptor { action_type: "network_unblock", allow_broadcast: false },
    ActionDescriptor { action_type: "isolate_host", allow_broadcast: true },
    ActionDescriptor { action_type: "unisolate_host", allow_broadcast: false },
    ActionDescriptor { action_type: "kill_process", allow_broadcast: true },
];

pub fn descriptor_for(action_type: &str) -> Option<&'static ActionDescriptor> {
    REGISTRY.iter().find(|d| d.action_type == action_type)
}

/// Shallow object merge: keys from `incoming` win over `defaults`.
pub fn merge_params(defaults: Value, incoming: Value) -> Value {
    let (Value::Object(mut merged), Value::Object(over)) = (defaults, incoming.clone()) else {
        return incoming;
    };
    for (k, v) in over {
        merged.insert(k, v);
    }
    Value::Object(merged)
}

pub fn parse_params(action_type: &str, merged: Value) -> Result<ActionParams> {
    let map_err = |e: serde_json::Error| StrikerError::InvalidParameters { action_type: action_type.to_string(), reason: e.to_string() };
    match action_type {
        "network_block" => Ok(ActionParams::NetworkBlock(serde_json::from_value(merged).map_err(map_err)?)),
        "network_unblock" => Ok(ActionParams::NetworkUnblock(serde_json::from_value(merged).map_err(map_err)?)),
        "isolate_host" => Ok(ActionParams::IsolateHost(serde_json::from_value(merged).map_err(map_err)?)),
        "unisolate_host" => Ok(ActionParams::UnisolateHost(serde_json::from_value(merged).map_err(map_err)?)),
        "kill_process" => Ok(ActionParams::KillProcess(serde_json::from_value(merged).map_err(map_err)?)),
        other => Err(StrikerError::UnknownActionType(other.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub succeeded: bool,
    pub result_data: Value,
}

pub async fn execute(params: &ActionParams) -> ActionOutcome {
    match params {
        ActionParams::NetworkBlock(p) => network::block(p).await,
        ActionParams::NetworkUnblock(p) => network::unblock(p).await,
        ActionParams::IsolateHost(p) => isolate::isolate_host(p).await,
        ActionParams::UnisolateHost(p) => isolate::unisolate_host(p).await,
        ActionParams::KillProcess(p) => process::kill_process(p).await,
    }
}

/// A rollback entry to register in the in-memory ledger, or `None` when
/// the action type isn't reversible. `network_block` auto-reverses after
/// an hour; `isolate_host` requires an operator-issued `unisolate_host`.
pub struct RollbackRegistration {
    pub rollback_action_type: &'static str,
    pub rollback_params: Value,
    pub auto_rollback_after: Option<Duration>,
}

pub fn rollback_for(action_id: Uuid, params: &ActionParams) -> Option<RollbackRegistration> {
    match params {
        ActionParams::NetworkBlock(p) => Some(RollbackRegistration {
            rollback_action_type: "network_unblock",
            rollback_params: serde_json::to_value(NetworkUnblockParams { target: p.target.clone() }).unwrap_or_default(),
            auto_rollback_after: Some(Duration::from_secs(p.duration.max(1))),
        }),
        ActionParams::IsolateHost(_) => Some(RollbackRegistration {
            rollback_action_type: "unisolate_host",
            rollback_params: serde_json::to_value(UnisolateHostParams { original_action_id: action_id.to_string() }).unwrap_or_default(),
            auto_rollback_after: None,
        }),
        ActionParams::NetworkUnblock(_) | ActionParams::UnisolateHost(_) | ActionParams::KillProcess(_) => None,
    }
}
