//! Decision Engine (C9): alert policy (verdict assignment + action
//! dispatch) and action-status reconciliation.

use std::sync::Arc;

use aegis_bus::Bus;
use aegis_proto::{Alert, AlertVerdict};
use aegis_store::Store;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

const ACTIONS_BROADCAST_SUBJECT: &str = "actions.broadcast";
const NETWORK_BLOCK_DEFAULT_DURATION_SECONDS: u64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionStatusReport {
    pub action_id: Uuid,
    pub striker_id: Option<Uuid>,
    pub action_type: String,
    pub status: String,
    #[serde(default)]
    pub result_data: Value,
    #[serde(default)]
    pub evidence: Value,
}

pub struct DecisionEngine {
    store: Store,
    bus: Arc<Bus>,
}

fn action_subject(action_type: &str) -> String {
    format!("actions.{action_type}")
}

impl DecisionEngine {
    pub fn new(store: Store, bus: Arc<Bus>) -> Self {
        Self { store, bus }
    }

    /// Computes a verdict from severity and reasoning, persists it, and
    /// dispatches an action when the verdict is `auto_respond`.
    pub async fn decide(&self, mut alert: Alert) {
        let verdict = compute_verdict(&alert);
        alert.verdict = verdict;

        if let Err(err) = self.store.set_alert_verdict(alert.alert_id, verdict_str(verdict)).await {
            tracing::warn!(%err, alert_id = %alert.alert_id, "failed to persist verdict");
        }
        self.audit(
            "system",
            "decide",
            &alert.alert_id.to_string(),
            json!({ "verdict": verdict_str(verdict), "severity": alert.severity.as_str(), "threat_score": alert.threat_score }),
        )
        .await;

        match verdict {
            AlertVerdict::AutoRespond => self.dispatch_auto_response(&alert).await,
            AlertVerdict::Escalate => tracing::info!(alert_id = %alert.alert_id, "alert escalated for operator review"),
            AlertVerdict::Dismiss => tracing::info!(alert_id = %alert.alert_id, "alert dismissed by policy"),
            AlertVerdict::Pending => {}
        }
    }

    async fn dispatch_auto_response(&self, alert: &Alert) {
        let (action_type, parameters) = if alert.severity == aegis_proto::Severity::Critical && alert.reasoning.is_multi_stage {
            ("isolate_host", json!({ "target": alert.reasoning.source }))
        } else {
            (
                "network_block",
                json!({ "target": alert.reasoning.source, "duration": NETWORK_BLOCK_DEFAULT_DURATION_SECONDS }),
            )
        };

        let action_id = Uuid::new_v4();
        if let Err(err) = self.store.insert_action(action_id, None, action_type, parameters.clone(), "auto").await {
            tracing::warn!(%err, %action_id, "failed to record dispatched action");
        }

        let payload = json!({
            "action_id": action_id,
            "alert_id": alert.alert_id,
            "action_type": action_type,
            "parameters": parameters,
            "timestamp": chrono::Utc::now(),
        });

        if let Err(err) = self.bus.publish_json(ACTIONS_BROADCAST_SUBJECT, &payload).await {
            tracing::warn!(%err, %action_id, "failed to dispatch auto-response action");
        }
        if let Err(err) = self.bus.publish_json(action_subject(action_type).as_str(), &payload).await {
            tracing::warn!(%err, %action_id, "failed to dispatch on type-specific subject");
        }
        self.audit("system", "dispatch_auto_response", &action_id.to_string(), payload).await;
    }

    /// Reconciles a status report from a Striker. Idempotent: replaying
    /// the same `action_id`/status converges on the same row rather than
    /// duplicating writes.
    pub async fn apply_status(&self, report: ActionStatusReport) {
        if self.store.get_action(report.action_id).await.ok().flatten().is_none() {
            if let Err(err) = self.store.insert_action_from_status(report.action_id, &report.action_type, &report.status).await {
                tracing::warn!(%err, action_id = %report.action_id, "failed to backfill action row from status report");
            }
        }

        if let Err(err) = self
            .store
            .apply_status_report(report.action_id, &report.status, report.evidence.clone(), report.result_data.clone())
            .await
        {
            tracing::warn!(%err, action_id = %report.action_id, "failed to apply status report");
        }

        let actor = report.striker_id.map(|id| id.to_string()).unwrap_or_else(|| "striker".to_string());
        self.audit(
            &actor,
            "action_status",
            &report.action_id.to_string(),
            json!({ "action_type": report.action_type, "status": report.status, "result_data": report.result_data }),
        )
        .await;
    }

    async fn audit(&self, actor: &str, action: &str, resource: &str, details: Value) {
        if let Err(err) = self.store.append_audit_entry(actor, action, Some(resource), details).await {
            tracing::warn!(%err, actor, action, "failed to append audit log entry");
        }
    }
}

fn verdict_str(verdict: AlertVerdict) -> &'static str {
    match verdict {
        AlertVerdict::Pending => "pending",
        AlertVerdict::AutoRespond => "auto_respond",
        AlertVerdict::Escalate => "escalate",
        AlertVerdict::Dismiss => "dismiss",
    }
}

/// `critical` + multi-stage + a known source -> isolate the host.
/// `high` + score > 70 + a brute-force rule with an IP-shaped source ->
/// block the source network-side. `critical`/`medium` otherwise ->
/// escalate to an operator. Everything else is dismissed.
fn compute_verdict(alert: &Alert) -> AlertVerdict {
    use aegis_proto::Severity::*;

    let is_brute_force_with_source_ip =
        alert.reasoning.rule.contains("Brute Force") && alert.reasoning.source.chars().next().is_some_and(|c| c.is_ascii_digit());

    if alert.severity == Critical && alert.reasoning.is_multi_stage && !alert.reasoning.source.is_empty() {
        return AlertVerdict::AutoRespond;
    }
    if alert.severity == High && alert.threat_score > 70 && is_brute_force_with_source_ip {
        return AlertVerdict::AutoRespond;
    }
    if matches!(alert.severity, Critical | Medium) {
        return AlertVerdict::Escalate;
    }
    AlertVerdict::Dismiss
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_proto::{Reasoning, Severity};

    fn alert(severity: Severity, score: u8, multi_stage: bool, rule: &str, source: &str) -> Alert {
        Alert {
            alert_id: Uuid::new_v4(),
            event_ids: vec![],
            threat_score: score,
            severity,
            status: "new".to_string(),
            verdict: AlertVerdict::Pending,
            affected_assets: vec![source.to_string()],
            reasoning: Reasoning {
                rule: rule.to_string(),
                description: rule.to_string(),
                count: 1,
                source: source.to_string(),
                mitre_tactics: vec![],
                mitre_techniques: vec![],
                is_multi_stage: multi_stage,
            },
            narrative: None,
            mitre_tactic: None,
            mitre_technique: None,
            remediation: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn critical_multi_stage_auto_responds() {
        let a = alert(Severity::Critical, 95, true, "Lateral Movement Detected", "10.0.0.5");
        assert_eq!(compute_verdict(&a), AlertVerdict::AutoRespond);
    }

    #[test]
    fn brute_force_high_above_70_auto_responds() {
        let a = alert(Severity::High, 75, false, "Brute Force Attack Detected", "203.0.113.7");
        assert_eq!(compute_verdict(&a), AlertVerdict::AutoRespond);
    }

    #[test]
    fn medium_without_auto_branch_escalates() {
        let a = alert(Severity::Medium, 50, false, "Suspicious Login", "host-1");
        assert_eq!(compute_verdict(&a), AlertVerdict::Escalate);
    }

    #[test]
    fn low_severity_dismisses() {
        let a = alert(Severity::Low, 20, false, "Minor Anomaly", "host-1");
        assert_eq!(compute_verdict(&a), AlertVerdict::Dismiss);
    }
}
