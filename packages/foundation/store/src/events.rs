use aegis_proto::Event;
use uuid::Uuid;

use crate::models::EventRow;
use crate::{Result, Store};

impl Store {
    pub async fn list_events(&self) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>("SELECT * FROM events ORDER BY timestamp DESC LIMIT 500")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Option<EventRow>> {
        let row = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Transactionally inserts a batch of events. Used by the ingest
    /// pipeline's `BatchingStore` flush — either the whole batch lands or
    /// none of it does, so a failed flush can safely be retried with the
    /// same in-memory buffer.
    pub async fn insert_events_batch(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"INSERT INTO events
                    (event_id, timestamp, sentinel_id, event_class, severity, raw_data, enrichments, mitre_techniques)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                   ON CONFLICT (event_id) DO NOTHING"#,
            )
            .bind(event.event_id)
            .bind(event.timestamp)
            .bind(event.sentinel_id)
            .bind(&event.event_class)
            .bind(event.severity.as_str())
            .bind(&event.raw_data)
            .bind(&event.enrichments)
            .bind(serde_json::to_value(&event.mitre_techniques).unwrap_or_default())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
