use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Queued,
    Executing,
    Completed,
    Succeeded,
    Failed,
    Rejected,
    RolledBack,
    Error,
}

/// A single captured process at the time of a pre/post action snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
    pub username: Option<String>,
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConnectionInfo {
    pub local_addr: Option<String>,
    pub remote_addr: Option<String>,
    pub protocol: String,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentFile {
    pub path: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_available_mb: f64,
    pub disk_percent: f32,
    pub disk_free_gb: f64,
}

/// Forensic snapshot of host state, taken immediately before or after a
/// Striker action executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub captured_at: DateTime<Utc>,
    pub processes: Vec<ProcessInfo>,
    pub network_connections: Vec<NetworkConnectionInfo>,
    pub recent_files: Vec<RecentFile>,
    pub system_metrics: SystemMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub pre: Option<HostSnapshot>,
    pub post: Option<HostSnapshot>,
}

/// A dispatched or reported response action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: Uuid,
    pub incident_id: Option<Uuid>,
    pub striker_id: Option<Uuid>,
    pub action_type: String,
    #[serde(default)]
    pub parameters: Value,
    pub status: ActionStatus,
    pub initiated_by: String,
    #[serde(default)]
    pub result_data: Value,
    pub timestamp: DateTime<Utc>,
}
