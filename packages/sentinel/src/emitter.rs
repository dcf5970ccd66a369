//! Event emission onto `events.sentinel.*`, grounded in
//! `event_emitter/event_emitter.py`: a buffered publisher so a bus outage
//! degrades to queuing telemetry rather than dropping it.

use std::sync::Arc;
use std::time::Duration;

use aegis_bus::{Bus, BufferedPublisher};
use aegis_proto::{Event, Severity};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

const BUFFER_CAPACITY: usize = 4096;
const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

pub struct EventEmitter {
    sentinel_id: Uuid,
    publisher: BufferedPublisher<Event>,
}

impl EventEmitter {
    pub fn new(bus: Bus, sentinel_id: Uuid, subtype: &str) -> Self {
        let subject = format!("events.sentinel.{subtype}");
        Self { sentinel_id, publisher: BufferedPublisher::new(bus, subject, BUFFER_CAPACITY) }
    }

    pub async fn emit(&self, event_class: &str, severity: Severity, raw_data: Value) {
        let event = Event {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sentinel_id: self.sentinel_id,
            event_class: event_class.to_string(),
            severity,
            raw_data,
            enrichments: Value::Object(Default::default()),
            mitre_techniques: Vec::new(),
        };
        self.publisher.publish(event).await;
    }

    pub async fn flush(&self) -> aegis_bus::Result<usize> {
        self.publisher.flush().await
    }

    /// Periodic flush so a buffered backlog drains as soon as the bus is
    /// reachable again rather than waiting for graceful shutdown.
    /// Mirrors `BatchingStore::spawn_flush_loop`'s ticker.
    pub fn spawn_flush_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                ticker.tick().await;
                if self.publisher.buffered_len().await == 0 {
                    continue;
                }
                match self.flush().await {
                    Ok(0) => {}
                    Ok(sent) => tracing::info!(sent, "flushed buffered events"),
                    Err(err) => tracing::debug!(%err, "buffered event flush still failing"),
                }
            }
        })
    }
}
