//! The portion of `AgentConfig` Core can push or the agent can poll at
//! runtime: zone, log level, allowlist, per-type default parameters and
//! the concurrency cap. Held behind a lock so the bus-push handler and
//! the executor both see the latest values without a restart.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub log_level: String,
    #[serde(default)]
    pub allowed_actions: Option<Vec<String>>,
    #[serde(default)]
    pub action_defaults: Value,
    #[serde(default)]
    pub max_concurrent_actions: Option<u32>,
    #[serde(default)]
    pub config_version: i64,
}

impl RuntimeConfig {
    /// An action type passes the allowlist when none is configured, or
    /// when it appears in the configured list.
    pub fn allows(&self, action_type: &str) -> bool {
        match &self.allowed_actions {
            None => true,
            Some(allowed) => allowed.iter().any(|a| a == action_type),
        }
    }

    pub fn defaults_for(&self, action_type: &str) -> Value {
        self.action_defaults.get(action_type).cloned().unwrap_or(Value::Object(Default::default()))
    }
}

pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

pub fn shared(initial: RuntimeConfig) -> SharedRuntimeConfig {
    Arc::new(RwLock::new(initial))
}
