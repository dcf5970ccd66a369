use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Sentinel,
    Striker,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sentinel => write!(f, "sentinel"),
            Self::Striker => write!(f, "striker"),
        }
    }
}

/// Registration payload sent to `POST /agents/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegister {
    pub api_key: String,
    pub agent_type: AgentType,
    pub agent_subtype: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// Heartbeat payload, sent either over `heartbeat.<agent_type>.<agent_id>`
/// or as the body of `POST /agents/heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHeartbeat {
    pub agent_id: Uuid,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub resource_usage: Value,
    #[serde(default)]
    pub agent_type: Option<AgentType>,
    #[serde(default)]
    pub agent_subtype: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
}

fn default_status() -> String {
    "active".to_string()
}

/// Restart-time hardware/OS identity published on `node.metadata.<agent_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub agent_id: Uuid,
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_model: Option<String>,
    pub cpu_cores: Option<u32>,
    pub ram_total_mb: Option<u64>,
    pub mac_address: Option<String>,
    pub agent_version: Option<String>,
}
