//! Correlation Engine (C7): simple and multi-stage rule evaluation over a
//! per-source in-memory event buffer, alert minting and cooldown.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use aegis_bus::Bus;
use aegis_cache::Cache;
use aegis_proto::{AlertBundle, Event, EventSummary, Reasoning, Severity};
use aegis_store::Store;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

const SOURCE_BUFFER_RETENTION: chrono::Duration = chrono::Duration::hours(1);
const COOLDOWN_TTL: Duration = Duration::from_secs(300);
const LLM_ANALYZE_SUBJECT: &str = "llm.analyze";
const MAX_EVENT_SUMMARIES: usize = 5;

#[derive(Clone)]
pub enum FieldMatcher {
    Equals(Value),
    Regex(Regex),
    Threshold(f64),
    Contains(Vec<&'static str>),
}

impl FieldMatcher {
    fn matches(&self, raw_data: &Value, field: &str) -> bool {
        match self {
            FieldMatcher::Equals(expected) => raw_data.get(field) == Some(expected),
            FieldMatcher::Regex(re) => raw_data.get(field).and_then(Value::as_str).is_some_and(|v| re.is_match(v)),
            FieldMatcher::Threshold(min) => raw_data.get(field).and_then(Value::as_f64).is_some_and(|v| v >= *min),
            FieldMatcher::Contains(needles) => raw_data
                .get(field)
                .and_then(Value::as_str)
                .map(|v| v.to_ascii_lowercase())
                .is_some_and(|v| needles.iter().any(|n| v.contains(n))),
        }
    }
}

#[derive(Clone)]
pub struct Pattern {
    pub event_class: Option<&'static str>,
    pub fields: Vec<(&'static str, FieldMatcher)>,
    /// Special case for `ioc_match`: matches any event with a non-empty
    /// `enrichments.threat_intel_matches`, bypassing the raw_data matchers.
    pub requires_ioc_match: bool,
}

impl Pattern {
    fn matches(&self, event: &Event) -> bool {
        if self.requires_ioc_match {
            return event
                .enrichments
                .get("threat_intel_matches")
                .and_then(Value::as_array)
                .is_some_and(|arr| !arr.is_empty());
        }
        if let Some(class) = self.event_class {
            if event.event_class != class {
                return false;
            }
        }
        self.fields.iter().all(|(field, matcher)| matcher.matches(&event.raw_data, field))
    }
}

#[derive(Clone)]
pub struct SimpleRule {
    pub name: &'static str,
    pub description: &'static str,
    pub pattern: Pattern,
    pub threshold: i64,
    pub window: Duration,
    pub severity: Severity,
    pub mitre_tactics: Vec<&'static str>,
    pub mitre_techniques: Vec<&'static str>,
    pub fixed_score: Option<u8>,
}

#[derive(Clone)]
pub struct Stage {
    pub pattern: Pattern,
    pub min_occurrences: usize,
    pub within: chrono::Duration,
}

#[derive(Clone)]
pub struct MultiStageRule {
    pub name: &'static str,
    pub description: &'static str,
    pub stages: Vec<Stage>,
    pub severity: Severity,
    pub mitre_tactics: Vec<&'static str>,
    pub mitre_techniques: Vec<&'static str>,
}

#[derive(Clone)]
pub enum Rule {
    Simple(SimpleRule),
    MultiStage(MultiStageRule),
}

impl Rule {
    fn name(&self) -> &'static str {
        match self {
            Rule::Simple(r) => r.name,
            Rule::MultiStage(r) => r.name,
        }
    }
}

fn eq_str(field: &'static str, value: &str) -> (&'static str, FieldMatcher) {
    (field, FieldMatcher::Equals(Value::String(value.to_string())))
}

fn threshold(field: &'static str, min: f64) -> (&'static str, FieldMatcher) {
    (field, FieldMatcher::Threshold(min))
}

fn regex(field: &'static str, pattern: &str) -> (&'static str, FieldMatcher) {
    let compiled = Regex::new(&format!("(?i){pattern}")).expect("static regex is valid");
    (field, FieldMatcher::Regex(compiled))
}

fn contains(field: &'static str, needles: &[&'static str]) -> (&'static str, FieldMatcher) {
    (field, FieldMatcher::Contains(needles.to_vec()))
}

/// The built-in rule set described in the component spec, overridable by
/// configuration (loading overrides is left to a future config surface;
/// these are the defaults every fresh Core ships with).
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::Simple(SimpleRule {
            name: "brute_force",
            description: "Brute Force Attack Detected",
            pattern: Pattern {
                event_class: Some("authentication"),
                fields: vec![eq_str("outcome", "failure")],
                requires_ioc_match: false,
            },
            threshold: 5,
            window: Duration::from_secs(60),
            severity: Severity::High,
            mitre_tactics: vec!["TA0001"],
            mitre_techniques: vec!["T1110"],
            fixed_score: None,
        }),
        Rule::MultiStage(MultiStageRule {
            name: "lateral_movement",
            description: "Lateral Movement Detected",
            stages: vec![
                Stage {
                    pattern: Pattern {
                        event_class: Some("authentication"),
                        fields: vec![eq_str("outcome", "success")],
                        requires_ioc_match: false,
                    },
                    min_occurrences: 1,
                    within: chrono::Duration::seconds(300),
                },
                Stage {
                    pattern: Pattern {
                        event_class: Some("process"),
                        fields: vec![contains("process_name", &["psexec", "wmic", "powershell"])],
                        requires_ioc_match: false,
                    },
                    min_occurrences: 1,
                    within: chrono::Duration::seconds(300),
                },
            ],
            severity: Severity::Critical,
            mitre_tactics: vec!["TA0008"],
            mitre_techniques: vec!["T1021"],
        }),
        Rule::Simple(SimpleRule {
            name: "data_exfiltration",
            description: "Data Exfiltration Detected",
            pattern: Pattern {
                event_class: Some("network"),
                fields: vec![eq_str("direction", "outbound"), threshold("bytes", 1_048_576.0)],
                requires_ioc_match: false,
            },
            threshold: 3,
            window: Duration::from_secs(120),
            severity: Severity::Critical,
            mitre_tactics: vec!["TA0010"],
            mitre_techniques: vec!["T1041"],
            fixed_score: None,
        }),
        Rule::Simple(SimpleRule {
            name: "credential_dumping",
            description: "Credential Dumping Detected",
            pattern: Pattern {
                event_class: Some("process"),
                fields: vec![regex("process_name", "(mimikatz|procdump|lsass|pwdump)")],
                requires_ioc_match: false,
            },
            threshold: 1,
            window: Duration::from_secs(60),
            severity: Severity::Critical,
            mitre_tactics: vec!["TA0006"],
            mitre_techniques: vec!["T1003"],
            fixed_score: None,
        }),
        Rule::MultiStage(MultiStageRule {
            name: "ransomware_behavior",
            description: "Ransomware Behavior Detected",
            stages: vec![
                Stage {
                    pattern: Pattern {
                        event_class: Some("file"),
                        fields: vec![contains("action", &["modify", "rename"])],
                        requires_ioc_match: false,
                    },
                    min_occurrences: 10,
                    within: chrono::Duration::seconds(60),
                },
                Stage {
                    pattern: Pattern {
                        event_class: Some("process"),
                        fields: vec![
                            contains("process_name", &["vssadmin", "wbadmin", "bcdedit"]),
                            contains("action", &["delete", "shadows"]),
                        ],
                        requires_ioc_match: false,
                    },
                    min_occurrences: 1,
                    within: chrono::Duration::seconds(120),
                },
            ],
            severity: Severity::Critical,
            mitre_tactics: vec!["TA0040"],
            mitre_techniques: vec!["T1486"],
        }),
        Rule::Simple(SimpleRule {
            name: "honeytoken_access",
            description: "Honeytoken Access Detected",
            pattern: Pattern {
                event_class: Some("honeytoken_access"),
                fields: vec![],
                requires_ioc_match: false,
            },
            threshold: 1,
            window: Duration::from_secs(60),
            severity: Severity::Critical,
            mitre_tactics: vec![],
            mitre_techniques: vec![],
            fixed_score: Some(100),
        }),
        Rule::Simple(SimpleRule {
            name: "ioc_match",
            description: "Known Indicator of Compromise Matched",
            pattern: Pattern { event_class: None, fields: vec![], requires_ioc_match: true },
            threshold: 1,
            window: Duration::from_secs(60),
            severity: Severity::Critical,
            mitre_tactics: vec![],
            mitre_techniques: vec![],
            fixed_score: None,
        }),
    ]
}

struct BufferedEvent {
    event: Event,
    received_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct SourceBuffer {
    entries: VecDeque<BufferedEvent>,
}

impl SourceBuffer {
    fn push_and_trim(&mut self, event: Event) {
        let now = chrono::Utc::now();
        self.entries.push_back(BufferedEvent { event, received_at: now });
        let cutoff = now - SOURCE_BUFFER_RETENTION;
        while self.entries.front().is_some_and(|e| e.received_at < cutoff) {
            self.entries.pop_front();
        }
    }

    fn matching_within(&self, pattern: &Pattern, within: chrono::Duration) -> Vec<&Event> {
        let cutoff = chrono::Utc::now() - within;
        self.entries
            .iter()
            .filter(|e| e.received_at >= cutoff && pattern.matches(&e.event))
            .map(|e| &e.event)
            .collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

fn source_id(event: &Event) -> String {
    event.raw_data.get("source_ip").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| event.sentinel_id.to_string())
}

pub struct CorrelationEngine {
    cache: Arc<dyn Cache>,
    store: Store,
    bus: Arc<Bus>,
    rules: Vec<Rule>,
    buffers: Mutex<HashMap<String, SourceBuffer>>,
}

impl CorrelationEngine {
    pub fn new(cache: Arc<dyn Cache>, store: Store, bus: Arc<Bus>, rules: Vec<Rule>) -> Self {
        Self { cache, store, bus, rules, buffers: Mutex::new(HashMap::new()) }
    }

    pub async fn process(&self, event: Event) {
        let source = source_id(&event);
        let rules = self.rules.clone();

        {
            let mut buffers = self.buffers.lock().await;
            buffers.entry(source.clone()).or_default().push_and_trim(event.clone());
        }

        for rule in &rules {
            match rule {
                Rule::Simple(simple) => self.evaluate_simple(simple, &event, &source).await,
                Rule::MultiStage(multi) => self.evaluate_multi_stage(multi, &source).await,
            }
        }
    }

    async fn evaluate_simple(&self, rule: &SimpleRule, event: &Event, source: &str) {
        if !rule.pattern.matches(event) {
            return;
        }
        let counter_key = format!("corr:{}:{source}", rule.name);
        let count = match self.cache.incr(&counter_key, rule.window).await {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(%err, rule = rule.name, "correlation counter unavailable, firing open");
                rule.threshold
            }
        };
        if count < rule.threshold {
            return;
        }
        let _ = self.cache.delete(&counter_key).await;

        let event_ids = {
            let buffers = self.buffers.lock().await;
            buffers
                .get(source)
                .map(|b| b.matching_within(&rule.pattern, chrono::Duration::from_std(rule.window).unwrap_or(chrono::Duration::seconds(60))))
                .unwrap_or_default()
                .into_iter()
                .map(|e| e.event_id)
                .collect::<Vec<_>>()
        };

        let score = rule.fixed_score.unwrap_or_else(|| rule.severity.base_score());
        let reasoning = Reasoning {
            rule: rule.description.to_string(),
            description: rule.description.to_string(),
            count: count as u32,
            source: source.to_string(),
            mitre_tactics: rule.mitre_tactics.iter().map(|s| s.to_string()).collect(),
            mitre_techniques: rule.mitre_techniques.iter().map(|s| s.to_string()).collect(),
            is_multi_stage: false,
        };

        self.mint_alert(rule.name, source, event_ids, score, rule.severity, reasoning).await;
    }

    async fn evaluate_multi_stage(&self, rule: &MultiStageRule, source: &str) {
        let buffers = self.buffers.lock().await;
        let Some(buffer) = buffers.get(source) else { return };

        let mut representative = Vec::with_capacity(rule.stages.len());
        for stage in &rule.stages {
            let matched = buffer.matching_within(&stage.pattern, stage.within);
            if matched.len() < stage.min_occurrences {
                return;
            }
            representative.extend(matched.iter().take(stage.min_occurrences).map(|e| e.event_id));
        }
        drop(buffers);

        {
            let mut buffers = self.buffers.lock().await;
            if let Some(buffer) = buffers.get_mut(source) {
                buffer.clear();
            }
        }

        let score = (rule.severity.base_score() as u16 + 10).min(100) as u8;
        let reasoning = Reasoning {
            rule: rule.description.to_string(),
            description: rule.description.to_string(),
            count: representative.len() as u32,
            source: source.to_string(),
            mitre_tactics: rule.mitre_tactics.iter().map(|s| s.to_string()).collect(),
            mitre_techniques: rule.mitre_techniques.iter().map(|s| s.to_string()).collect(),
            is_multi_stage: true,
        };

        self.mint_alert(rule.name, source, representative, score, rule.severity, reasoning).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn mint_alert(&self, rule_name: &str, source: &str, event_ids: Vec<Uuid>, score: u8, severity: Severity, reasoning: Reasoning) {
        let alert_id = Uuid::new_v4();
        let affected_assets = vec![source.to_string()];

        let event_ids_json = serde_json::to_value(&event_ids).unwrap_or_default();
        let reasoning_json = serde_json::to_value(&reasoning).unwrap_or_default();
        let affected_assets_json = serde_json::to_value(&affected_assets).unwrap_or_default();

        if let Err(err) = self
            .store
            .insert_alert(alert_id, event_ids_json, score as i32, severity.as_str(), affected_assets_json, reasoning_json)
            .await
        {
            tracing::warn!(%err, %alert_id, rule = rule_name, "failed to persist minted alert");
        }

        let cooldown_key = format!("alert_cooldown:{rule_name}:{source}");
        let on_cooldown = self.cache.exists(&cooldown_key).await.unwrap_or(false);
        if on_cooldown {
            tracing::info!(rule = rule_name, source, "alert persisted but LLM dispatch suppressed by cooldown");
            return;
        }
        let _ = self.cache.set(&cooldown_key, Value::Bool(true), COOLDOWN_TTL).await;

        let event_summaries = self.build_event_summaries(source, &event_ids).await;
        let bundle = AlertBundle {
            alert_id,
            reasoning,
            threat_score: score,
            severity,
            event_ids,
            affected_assets,
            event_summaries,
        };

        if let Err(err) = self.bus.publish_json(LLM_ANALYZE_SUBJECT, &bundle).await {
            tracing::warn!(%err, %alert_id, "failed to publish alert bundle to LLM enricher");
        }
    }

    async fn build_event_summaries(&self, source: &str, event_ids: &[Uuid]) -> Vec<EventSummary> {
        let buffers = self.buffers.lock().await;
        let Some(buffer) = buffers.get(source) else { return Vec::new() };
        buffer
            .entries
            .iter()
            .filter(|e| event_ids.contains(&e.event.event_id))
            .take(MAX_EVENT_SUMMARIES)
            .map(|e| EventSummary {
                event_id: e.event.event_id,
                event_class: e.event.event_class.clone(),
                summary: e.event.canonical_raw_data(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn auth_failure_event(source_ip: &str) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sentinel_id: Uuid::new_v4(),
            event_class: "authentication".to_string(),
            severity: Severity::Medium,
            raw_data: serde_json::json!({"outcome": "failure", "source_ip": source_ip}),
            enrichments: serde_json::json!({}),
            mitre_techniques: vec![],
        }
    }

    #[test]
    fn brute_force_pattern_matches_failure_only() {
        let rules = default_rules();
        let Rule::Simple(rule) = &rules[0] else { panic!("expected simple rule") };
        assert!(rule.pattern.matches(&auth_failure_event("1.2.3.4")));

        let mut success = auth_failure_event("1.2.3.4");
        success.raw_data = serde_json::json!({"outcome": "success"});
        assert!(!rule.pattern.matches(&success));
    }

    #[test]
    fn ioc_match_pattern_requires_non_empty_enrichment() {
        let rules = default_rules();
        let rule = rules.iter().find(|r| r.name() == "ioc_match").unwrap();
        let Rule::Simple(rule) = rule else { panic!() };

        let mut event = auth_failure_event("1.2.3.4");
        assert!(!rule.pattern.matches(&event));
        event.enrichments = serde_json::json!({"threat_intel_matches": [{"value": "1.2.3.4"}]});
        assert!(rule.pattern.matches(&event));
    }
}
