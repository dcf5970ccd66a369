use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Severity;

/// The rule-match context recorded on an alert, describing why it fired.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reasoning {
    pub rule: String,
    pub description: String,
    pub count: u32,
    pub source: String,
    pub mitre_tactics: Vec<String>,
    pub mitre_techniques: Vec<String>,
    pub is_multi_stage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertVerdict {
    Pending,
    AutoRespond,
    Escalate,
    Dismiss,
}

/// An alert minted by the correlation engine, enriched by the LLM step and
/// given a verdict by the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub event_ids: Vec<Uuid>,
    pub threat_score: u8,
    pub severity: Severity,
    pub status: String,
    pub verdict: AlertVerdict,
    pub affected_assets: Vec<String>,
    pub reasoning: Reasoning,
    pub narrative: Option<String>,
    pub mitre_tactic: Option<String>,
    pub mitre_technique: Option<String>,
    pub remediation: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Abbreviated event snapshot carried in an [`AlertBundle`] for LLM context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: Uuid,
    pub event_class: String,
    pub summary: String,
}

/// Published on `llm.analyze` by the correlation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertBundle {
    pub alert_id: Uuid,
    pub reasoning: Reasoning,
    pub threat_score: u8,
    pub severity: Severity,
    pub event_ids: Vec<Uuid>,
    pub affected_assets: Vec<String>,
    pub event_summaries: Vec<EventSummary>,
}
