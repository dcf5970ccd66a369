//! The portion of agent config Core can push or the agent can poll:
//! zone, log level, detection thresholds, probe cadence and the set of
//! enabled probes. Mirrors `config_loader.py`'s merge of local defaults
//! with the remote config document, held live behind a lock.

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
    pub detection_thresholds: Value,
    #[serde(default)]
    pub probe_interval_seconds: Option<u64>,
    #[serde(default)]
    pub enabled_probes: Option<Vec<String>>,
    #[serde(default)]
    pub config_version: i64,
}

impl RuntimeConfig {
    pub fn probe_enabled(&self, probe_name: &str) -> bool {
        match &self.enabled_probes {
            None => true,
            Some(enabled) => enabled.iter().any(|p| p == probe_name),
        }
    }
}

pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

pub fn shared(initial: RuntimeConfig) -> SharedRuntimeConfig {
    Arc::new(RwLock::new(initial))
}
