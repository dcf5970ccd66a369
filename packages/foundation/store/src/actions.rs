use serde_json::Value;
use uuid::Uuid;

use crate::models::ActionRow;
use crate::{Result, Store};

impl Store {
    pub async fn insert_action(
        &self,
        action_id: Uuid,
        striker_id: Option<Uuid>,
        action_type: &str,
        parameters: Value,
        initiated_by: &str,
    ) -> Result<ActionRow> {
        let row = sqlx::query_as::<_, ActionRow>(
            r#"INSERT INTO actions (id, striker_id, action_type, parameters, status, initiated_by)
               VALUES ($1, $2, $3, $4, 'queued', $5)
               RETURNING *"#,
        )
        .bind(action_id)
        .bind(striker_id)
        .bind(action_type)
        .bind(parameters)
        .bind(initiated_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_action(&self, action_id: Uuid) -> Result<Option<ActionRow>> {
        let row = sqlx::query_as::<_, ActionRow>("SELECT * FROM actions WHERE id = $1")
            .bind(action_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Applied when a status report arrives for an `action_id` with no
    /// prior row (the decision engine auto-dispatched it without creating
    /// one up front).
    pub async fn insert_action_from_status(&self, action_id: Uuid, action_type: &str, status: &str) -> Result<ActionRow> {
        let row = sqlx::query_as::<_, ActionRow>(
            r#"INSERT INTO actions (id, action_type, status, initiated_by)
               VALUES ($1, $2, $3, 'auto')
               ON CONFLICT (id) DO NOTHING
               RETURNING *"#,
        )
        .bind(action_id)
        .bind(action_type)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Merges the reported evidence/result into the existing row rather
    /// than overwriting it outright, so at-least-once redelivery of the
    /// same status converges on the same final row (writing the same
    /// `action_id` twice is a no-op past the first write).
    pub async fn apply_status_report(&self, action_id: Uuid, status: &str, evidence: Value, result_data: Value) -> Result<()> {
        sqlx::query(
            r#"UPDATE actions SET
                 status = $2,
                 evidence = evidence || $3,
                 rollback_entry = CASE
                   WHEN rollback_entry IS NULL THEN jsonb_build_object('execution_result', $4)
                   ELSE jsonb_set(rollback_entry, '{execution_result}', $4)
                 END,
                 updated_at = now()
               WHERE id = $1"#,
        )
        .bind(action_id)
        .bind(status)
        .bind(evidence)
        .bind(result_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
