//! Ingest Pipeline (C5): dedup, IOC enrichment, batched persistence,
//! fan-out to the correlator.

use std::sync::Arc;
use std::time::Duration;

use aegis_bus::Bus;
use aegis_cache::Cache;
use aegis_proto::{Event, Severity};
use aegis_store::Store;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::threat_intel::{IocType, ThreatIntelStore};

const DEDUP_TTL: Duration = Duration::from_secs(60);
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const FLUSH_BATCH_SIZE: usize = 500;
const INTERNAL_EVENTS_SUBJECT: &str = "internal.events";

/// Small bounded buffer with explicit flush triggers (size, interval,
/// shutdown), shared by the ingest pipeline and, in spirit, by anything
/// else that needs "batch then flush" semantics over a fallible sink.
pub struct BatchingStore {
    store: Store,
    buffer: Mutex<Vec<Event>>,
}

impl BatchingStore {
    pub fn new(store: Store) -> Self {
        Self { store, buffer: Mutex::new(Vec::with_capacity(FLUSH_BATCH_SIZE)) }
    }

    /// Buffers one event; flushes immediately if the buffer just reached
    /// capacity. A failed flush leaves the events in the buffer for the
    /// next tick rather than dropping them.
    async fn push(&self, event: Event) {
        let mut buffer = self.buffer.lock().await;
        buffer.push(event);
        if buffer.len() >= FLUSH_BATCH_SIZE {
            self.flush_locked(&mut buffer).await;
        }
    }

    pub async fn flush(&self) {
        let mut buffer = self.buffer.lock().await;
        self.flush_locked(&mut buffer).await;
    }

    async fn flush_locked(&self, buffer: &mut Vec<Event>) {
        if buffer.is_empty() {
            return;
        }
        match self.store.insert_events_batch(buffer).await {
            Ok(()) => buffer.clear(),
            Err(err) => tracing::warn!(%err, count = buffer.len(), "event batch flush failed, retrying next tick"),
        }
    }

    pub fn spawn_flush_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                ticker.tick().await;
                self.flush().await;
            }
        })
    }
}

pub struct IngestPipeline {
    cache: Arc<dyn Cache>,
    batching_store: Arc<BatchingStore>,
    threat_intel: Arc<ThreatIntelStore>,
    bus: Arc<Bus>,
}

fn dedup_fingerprint(event: &Event) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.sentinel_id.to_string());
    hasher.update(&event.event_class);
    hasher.update(event.canonical_raw_data());
    format!("dedup:{:x}", hasher.finalize())
}

impl IngestPipeline {
    pub fn new(cache: Arc<dyn Cache>, batching_store: Arc<BatchingStore>, threat_intel: Arc<ThreatIntelStore>, bus: Arc<Bus>) -> Self {
        Self { cache, batching_store, threat_intel, bus }
    }

    /// Runs one message through the pipeline: dedup, IOC enrich, buffer
    /// for persistence, fan out to the correlator. Never propagates an
    /// error out of the caller's subscription loop — failures are logged
    /// and the message is dropped at worst.
    pub async fn process(&self, mut event: Event) {
        let fingerprint = dedup_fingerprint(&event);
        // Fail-open: if the cache is unreachable, treat it as a miss
        // rather than blocking ingestion.
        let already_seen = self.cache.exists(&fingerprint).await.unwrap_or(false);
        if already_seen {
            return;
        }
        let _ = self.cache.set(&fingerprint, serde_json::Value::Bool(true), DEDUP_TTL).await;

        self.enrich(&mut event).await;

        self.batching_store.push(event.clone()).await;

        if let Err(err) = self.bus.publish_json(INTERNAL_EVENTS_SUBJECT, &event).await {
            tracing::warn!(%err, event_id = %event.event_id, "failed to fan out event to correlator");
        }
    }

    /// Extracts candidate IOCs from well-known fields and promotes
    /// severity to critical on any match.
    async fn enrich(&self, event: &mut Event) {
        let mut matches = Vec::new();

        let candidates: &[(IocType, &str)] =
            &[(IocType::Ip, "source_ip"), (IocType::Ip, "destination_ip"), (IocType::Domain, "domain"), (IocType::Url, "url"), (IocType::Hash, "file_hash")];

        for (ioc_type, field) in candidates {
            let Some(value) = event.raw_data.get(field).and_then(serde_json::Value::as_str) else {
                continue;
            };
            if let Some(entry) = self.threat_intel.lookup(*ioc_type, value).await {
                matches.push(serde_json::json!({
                    "field": field,
                    "value": value,
                    "ioc_type": ioc_type.as_str(),
                    "confidence": entry.confidence,
                    "source": entry.source,
                }));
            }
        }

        if !matches.is_empty() {
            if let Some(obj) = event.enrichments.as_object_mut() {
                obj.insert("threat_intel_matches".to_string(), serde_json::Value::Array(matches));
            } else {
                event.enrichments = serde_json::json!({ "threat_intel_matches": matches });
            }
            event.severity = Severity::Critical;
            if let Some(obj) = event.raw_data.as_object_mut() {
                obj.insert("ioc_matched".to_string(), serde_json::Value::Bool(true));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_proto::Event;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_event(raw: serde_json::Value) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sentinel_id: Uuid::new_v4(),
            event_class: "network".to_string(),
            severity: Severity::Low,
            raw_data: raw,
            enrichments: serde_json::json!({}),
            mitre_techniques: vec![],
        }
    }

    #[test]
    fn fingerprint_is_stable_under_key_order() {
        let a = sample_event(serde_json::json!({"b": 1, "a": 2}));
        let mut b = sample_event(serde_json::json!({"a": 2, "b": 1}));
        b.event_id = a.event_id;
        b.sentinel_id = a.sentinel_id;
        assert_eq!(dedup_fingerprint(&a), dedup_fingerprint(&b));
    }
}
