use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub bearer_token: Option<String>,
    pub bearer_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    pub id: Uuid,
    pub agent_type: String,
    pub agent_subtype: String,
    pub status: String,
    pub capabilities: Value,
    pub zone: String,
    pub last_heartbeat: DateTime<Utc>,
    pub config_version: i32,
    pub resource_usage: Value,
    pub node_metadata: Value,
    pub api_key_prefix: String,
    pub api_key_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentConfigRow {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub nats_url_enc: Option<String>,
    pub core_api_url_enc: Option<String>,
    pub log_level: Option<String>,
    pub environment: Option<String>,
    pub zone: Option<String>,
    pub detection_thresholds: Option<Value>,
    pub probe_interval_seconds: Option<i32>,
    pub enabled_probes: Option<Value>,
    pub capabilities: Option<Value>,
    pub allowed_actions: Option<Value>,
    pub action_defaults: Option<Value>,
    pub max_concurrent_actions: Option<i32>,
    pub config_version: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sentinel_id: Uuid,
    pub event_class: String,
    pub severity: String,
    pub raw_data: Value,
    pub enrichments: Value,
    pub mitre_techniques: Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub event_ids: Value,
    pub threat_score: i32,
    pub severity: String,
    pub status: String,
    pub verdict: Option<String>,
    pub affected_assets: Value,
    pub reasoning: Value,
    pub llm_narrative: Option<String>,
    pub llm_mitre_tactic: Option<String>,
    pub llm_mitre_technique: Option<String>,
    pub llm_remediation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActionRow {
    pub id: Uuid,
    pub incident_id: Option<Uuid>,
    pub striker_id: Option<Uuid>,
    pub action_type: String,
    pub parameters: Value,
    pub status: String,
    pub initiated_by: String,
    pub evidence: Value,
    pub rollback_entry: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InfraNodeRow {
    pub id: Uuid,
    pub hostname: String,
    pub address: String,
    pub discovered_at: DateTime<Utc>,
    pub deployed: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditLogRow {
    pub log_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub resource: Option<String>,
    pub details: Value,
    pub previous_hash: Option<String>,
    pub current_hash: String,
}
