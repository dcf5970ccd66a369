//! Rollback Manager (C13): an in-memory ledger of reversible actions and
//! a 30s scheduler that auto-publishes the reversing action once its
//! `auto_rollback_at` passes. Grounded in `rollback_manager/service.py`;
//! the self-published rollback action goes out on the agent's own direct
//! subject (`actions.<agent_id>`), same as a Striker subscribes to for
//! its own loop-back traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use aegis_bus::Bus;

const SCHEDULER_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RollbackEntry {
    pub action_id: Uuid,
    pub action_type: String,
    pub rollback_action_type: &'static str,
    pub rollback_params: serde_json::Value,
    pub registered_at: DateTime<Utc>,
    pub auto_rollback_at: Option<DateTime<Utc>>,
    pub rolled_back: bool,
}

#[derive(Default)]
struct Ledger {
    entries: HashMap<Uuid, RollbackEntry>,
}

#[derive(Clone)]
pub struct RollbackManager {
    ledger: Arc<Mutex<Ledger>>,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self { ledger: Arc::new(Mutex::new(Ledger::default())) }
    }

    pub async fn register(
        &self,
        action_id: Uuid,
        action_type: String,
        rollback_action_type: &'static str,
        rollback_params: serde_json::Value,
        auto_rollback_after: Option<Duration>,
    ) {
        let auto_rollback_at = auto_rollback_after.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        let entry = RollbackEntry {
            action_id,
            action_type,
            rollback_action_type,
            rollback_params,
            registered_at: Utc::now(),
            auto_rollback_at,
            rolled_back: false,
        };
        tracing::info!(%action_id, rollback_action_type, auto_rollback_at = ?auto_rollback_at, "rollback registered");
        self.ledger.lock().await.entries.insert(action_id, entry);
    }

    /// Spawns the 30s scheduler loop. Runs until the bus connection drops
    /// for good; callers hold the returned handle only to await shutdown.
    pub fn spawn_scheduler(&self, bus: Arc<Bus>, own_subject: String) -> tokio::task::JoinHandle<()> {
        let ledger = Arc::clone(&self.ledger);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SCHEDULER_INTERVAL).await;
                let due: Vec<RollbackEntry> = {
                    let guard = ledger.lock().await;
                    guard
                        .entries
                        .values()
                        .filter(|e| !e.rolled_back && e.auto_rollback_at.is_some_and(|at| Utc::now() >= at))
                        .cloned()
                        .collect()
                };
                for entry in due {
                    publish_rollback(&bus, &own_subject, &entry).await;
                    let mut guard = ledger.lock().await;
                    if let Some(stored) = guard.entries.get_mut(&entry.action_id) {
                        stored.rolled_back = true;
                    }
                }
            }
        })
    }
}

async fn publish_rollback(bus: &Bus, own_subject: &str, entry: &RollbackEntry) {
    let payload = serde_json::json!({
        "action_id": Uuid::new_v4(),
        "action_type": entry.rollback_action_type,
        "parameters": entry.rollback_params,
        "timestamp": Utc::now(),
        "is_rollback": true,
        "original_action_id": entry.action_id.to_string(),
    });
    match bus.publish_json(own_subject, &payload).await {
        Ok(()) => tracing::info!(action_id = %entry.action_id, "auto-rollback published"),
        Err(err) => tracing::error!(%err, action_id = %entry.action_id, "failed to publish auto-rollback"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_and_marks_entries_due() {
        let manager = RollbackManager::new();
        let action_id = Uuid::new_v4();
        manager
            .register(action_id, "network_block".to_string(), "network_unblock", serde_json::json!({"target": "10.0.0.1"}), Some(Duration::from_secs(0)))
            .await;
        let guard = manager.ledger.lock().await;
        let entry = guard.entries.get(&action_id).unwrap();
        assert!(!entry.rolled_back);
        assert!(entry.auto_rollback_at.is_some());
    }
}
