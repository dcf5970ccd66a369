use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::Severity;

/// Immutable telemetry record published by a Sentinel.
///
/// `event_id` and `sentinel_id` are repaired rather than rejected when
/// malformed: ingest always generates a fresh UUID for a missing/invalid
/// `event_id`, and falls back to `Uuid::nil()` for `sentinel_id` so the row
/// still persists instead of being dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sentinel_id: Uuid,
    pub event_class: String,
    pub severity: Severity,
    #[serde(default)]
    pub raw_data: Value,
    #[serde(default)]
    pub enrichments: Value,
    #[serde(default)]
    pub mitre_techniques: Vec<String>,
}

impl Event {
    /// Best-effort decode that repairs a malformed/missing identity instead
    /// of rejecting the message, mirroring the ingest pipeline's contract.
    pub fn from_wire(mut raw: Value) -> Self {
        let event_id = raw
            .get("event_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);
        let sentinel_id = raw
            .get("sentinel_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or(Uuid::nil());
        let event_class = raw
            .get("event_class")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let severity = raw
            .get("severity")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Severity::Informational);
        let raw_data = raw.get_mut("raw_data").map(Value::take).unwrap_or(Value::Object(Default::default()));
        let enrichments = raw.get_mut("enrichments").map(Value::take).unwrap_or(Value::Object(Default::default()));
        let mitre_techniques = raw
            .get("mitre_techniques")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let timestamp = raw
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Self {
            event_id,
            timestamp,
            sentinel_id,
            event_class,
            severity,
            raw_data,
            enrichments,
            mitre_techniques,
        }
    }

    /// Canonical JSON of `raw_data` for dedup fingerprinting: object keys sorted.
    pub fn canonical_raw_data(&self) -> String {
        canonical_json(&self.raw_data)
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let entries: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        Value::Array(items) => {
            let entries: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", entries.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_missing_event_id() {
        let raw = serde_json::json!({"event_class": "authentication", "severity": "high"});
        let event = Event::from_wire(raw);
        assert_ne!(event.event_id, Uuid::nil());
        assert_eq!(event.sentinel_id, Uuid::nil());
    }

    #[test]
    fn canonical_json_is_stable_under_key_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }
}
