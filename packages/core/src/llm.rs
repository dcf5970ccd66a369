//! LLM Enricher (C8): turns an alert bundle into a narrative, MITRE tags
//! and a remediation plan via a local Ollama-style inference endpoint,
//! with a deterministic fallback when that endpoint is unreachable.

use std::sync::Arc;
use std::time::Duration;

use aegis_bus::Bus;
use aegis_cache::Cache;
use aegis_proto::{Alert, AlertBundle, AlertVerdict};
use aegis_store::Store;
use serde::{Deserialize, Serialize};
use serde_json::json;

const NARRATIVE_CACHE_TTL: Duration = Duration::from_secs(3600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);
const ALERTS_SUBJECT: &str = "alerts";

const REMEDIATION_STEPS: &str = "1. Isolate or contain the affected asset pending investigation. \
2. Preserve forensic evidence (process, network, and file snapshots) before remediation. \
3. Rotate credentials reachable from the affected asset. \
4. Review the asset's recent authentication and process history for lateral movement. \
5. Confirm containment and document the incident in the audit trail.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmFields {
    pub narrative: String,
    pub mitre_tactic: String,
    pub mitre_technique: String,
    pub remediation: String,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    format: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}

pub struct LlmEnricher {
    cache: Arc<dyn Cache>,
    store: Store,
    bus: Arc<Bus>,
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

fn narrative_cache_key(alert_id: uuid::Uuid) -> String {
    format!("llm:narrative:{alert_id}")
}

impl LlmEnricher {
    pub fn new(cache: Arc<dyn Cache>, store: Store, bus: Arc<Bus>, endpoint: String, model: String) -> Self {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default();
        Self { cache, store, bus, http, endpoint, model }
    }

    /// Hits the endpoint's tag-listing path once at startup and logs
    /// whether the configured model is present. Never returns an error —
    /// callers (including the health endpoint) always get a usable
    /// reachability signal.
    pub async fn check_llm_health(&self) -> serde_json::Value {
        let url = format!("{}/api/tags", self.endpoint.trim_end_matches('/'));
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<OllamaTagsResponse>().await {
                Ok(tags) => {
                    let has_model = tags.models.iter().any(|m| m.name.starts_with(&self.model));
                    json!({ "reachable": true, "model_present": has_model, "model": self.model })
                }
                Err(_) => json!({ "reachable": true, "model_present": false, "model": self.model }),
            },
            _ => json!({ "reachable": false, "model": self.model }),
        }
    }

    /// Processes one bundle end to end: cache check, inference call (with
    /// deterministic fallback), alert row update, publish on `alerts`.
    pub async fn enrich(&self, bundle: AlertBundle) {
        let fields = match self.cache.get(&narrative_cache_key(bundle.alert_id)).await {
            Ok(Some(cached)) => serde_json::from_value(cached).unwrap_or_else(|_| self.deterministic_fallback(&bundle)),
            _ => self.generate_fields(&bundle).await,
        };

        if let Err(err) = self
            .store
            .set_alert_llm_fields(bundle.alert_id, &fields.narrative, &fields.mitre_tactic, &fields.mitre_technique, &fields.remediation)
            .await
        {
            tracing::warn!(%err, alert_id = %bundle.alert_id, "failed to persist LLM fields");
        }

        let alert = Alert {
            alert_id: bundle.alert_id,
            event_ids: bundle.event_ids.clone(),
            threat_score: bundle.threat_score,
            severity: bundle.severity,
            status: "new".to_string(),
            verdict: AlertVerdict::Pending,
            affected_assets: bundle.affected_assets.clone(),
            reasoning: bundle.reasoning.clone(),
            narrative: Some(fields.narrative),
            mitre_tactic: Some(fields.mitre_tactic),
            mitre_technique: Some(fields.mitre_technique),
            remediation: Some(fields.remediation),
            created_at: chrono::Utc::now(),
        };

        if let Err(err) = self.bus.publish_json(ALERTS_SUBJECT, &alert).await {
            tracing::warn!(%err, alert_id = %bundle.alert_id, "failed to publish enriched alert");
        }
    }

    async fn generate_fields(&self, bundle: &AlertBundle) -> LlmFields {
        match self.call_inference(bundle).await {
            Ok(fields) => {
                if let Ok(value) = serde_json::to_value(&fields) {
                    let _ = self.cache.set(&narrative_cache_key(bundle.alert_id), value, NARRATIVE_CACHE_TTL).await;
                }
                fields
            }
            Err(err) => {
                tracing::warn!(%err, alert_id = %bundle.alert_id, "LLM inference failed, using deterministic fallback");
                self.deterministic_fallback(bundle)
            }
        }
    }

    async fn call_inference(&self, bundle: &AlertBundle) -> anyhow::Result<LlmFields> {
        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        let prompt = format!(
            "You are a security analyst. Given this correlation rule match, respond with JSON only: \
             {{\"narrative\": string, \"mitre_tactic\": string, \"mitre_technique\": string, \"remediation\": string}}.\n\
             Rule: {}\nSeverity: {}\nThreat score: {}\nAffected assets: {:?}\nEvent count: {}",
            bundle.reasoning.rule, bundle.severity, bundle.threat_score, bundle.affected_assets, bundle.reasoning.count
        );

        let request = OllamaGenerateRequest { model: &self.model, prompt, format: "json", stream: false };
        let resp = self.http.post(&url).json(&request).send().await?.error_for_status()?;
        let body: OllamaGenerateResponse = resp.json().await?;
        let fields: LlmFields = serde_json::from_str(&body.response)?;
        Ok(fields)
    }

    fn deterministic_fallback(&self, bundle: &AlertBundle) -> LlmFields {
        LlmFields {
            narrative: format!(
                "{} matched on source {} with {} contributing event(s); threat score {}.",
                bundle.reasoning.description, bundle.reasoning.source, bundle.reasoning.count, bundle.threat_score
            ),
            mitre_tactic: bundle.reasoning.mitre_tactics.first().cloned().unwrap_or_default(),
            mitre_technique: bundle.reasoning.mitre_techniques.first().cloned().unwrap_or_default(),
            remediation: REMEDIATION_STEPS.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_has_five_numbered_steps() {
        assert!(REMEDIATION_STEPS.starts_with("1. Isolate"));
        assert!(REMEDIATION_STEPS.contains("5. Confirm containment"));
    }
}
