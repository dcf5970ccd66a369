use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::AuditLogRow;
use crate::{Result, Store};

/// `current_hash = SHA-256(log_id || timestamp || actor || action || resource || details_json || previous_hash)`,
/// matching the reference audit log's field concatenation order exactly
/// (empty string stands in for an absent resource/previous_hash).
fn calculate_hash(log_id: Uuid, timestamp: &str, actor: &str, action: &str, resource: &str, details_json: &str, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(log_id.to_string());
    hasher.update(timestamp);
    hasher.update(actor);
    hasher.update(action);
    hasher.update(resource);
    hasher.update(details_json);
    hasher.update(previous_hash);
    hex::encode(hasher.finalize())
}

impl Store {
    /// Appends one entry to the hash-chained audit log, reading the most
    /// recent row's `current_hash` to chain from under the same
    /// connection the insert uses.
    pub async fn append_audit_entry(&self, actor: &str, action: &str, resource: Option<&str>, details: Value) -> Result<AuditLogRow> {
        let mut tx = self.pool.begin().await?;
        let previous: Option<(String,)> = sqlx::query_as("SELECT current_hash FROM audit_log ORDER BY timestamp DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
        let previous_hash = previous.map(|(h,)| h);

        let log_id = Uuid::new_v4();
        let timestamp = chrono::Utc::now();
        let details_json = serde_json::to_string(&sort_keys(&details)).unwrap_or_default();
        let current_hash = calculate_hash(
            log_id,
            &timestamp.to_rfc3339(),
            actor,
            action,
            resource.unwrap_or(""),
            &details_json,
            previous_hash.as_deref().unwrap_or(""),
        );

        let row = sqlx::query_as::<_, AuditLogRow>(
            r#"INSERT INTO audit_log (log_id, timestamp, actor, action, resource, details, previous_hash, current_hash)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(log_id)
        .bind(timestamp)
        .bind(actor)
        .bind(action)
        .bind(resource)
        .bind(&details)
        .bind(&previous_hash)
        .bind(&current_hash)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Walks the entire chain in timestamp order, recomputing each hash
    /// and checking the `previous_hash` link. Returns `false` at the
    /// first mismatch (tamper or corruption) without needing to inspect
    /// every remaining row.
    pub async fn verify_audit_chain(&self) -> Result<bool> {
        let rows = sqlx::query_as::<_, AuditLogRow>("SELECT * FROM audit_log ORDER BY timestamp ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut running_previous: Option<String> = None;
        for row in &rows {
            let details_json = serde_json::to_string(&sort_keys(&row.details)).unwrap_or_default();
            let expected = calculate_hash(
                row.log_id,
                &row.timestamp.to_rfc3339(),
                &row.actor,
                &row.action,
                row.resource.as_deref().unwrap_or(""),
                &details_json,
                row.previous_hash.as_deref().unwrap_or(""),
            );
            if expected != row.current_hash {
                tracing::error!(log_id = %row.log_id, "audit chain hash mismatch");
                return Ok(false);
            }
            if row.previous_hash != running_previous {
                tracing::error!(log_id = %row.log_id, "audit chain broken");
                return Ok(false);
            }
            running_previous = Some(row.current_hash.clone());
        }
        Ok(true)
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_for_same_fields() {
        let a = calculate_hash(Uuid::nil(), "t", "actor", "action", "", "{}", "");
        let b = calculate_hash(Uuid::nil(), "t", "actor", "action", "", "{}", "");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_changes_when_previous_hash_changes() {
        let a = calculate_hash(Uuid::nil(), "t", "actor", "action", "", "{}", "");
        let b = calculate_hash(Uuid::nil(), "t", "actor", "action", "", "{}", "abc");
        assert_ne!(a, b);
    }
}
