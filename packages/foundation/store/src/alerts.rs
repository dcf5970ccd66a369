use serde_json::Value;
use uuid::Uuid;

use crate::models::AlertRow;
use crate::{Result, Store};

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_alert(
        &self,
        alert_id: Uuid,
        event_ids: Value,
        threat_score: i32,
        severity: &str,
        affected_assets: Value,
        reasoning: Value,
    ) -> Result<AlertRow> {
        let row = sqlx::query_as::<_, AlertRow>(
            r#"INSERT INTO alerts (id, alert_id, event_ids, threat_score, severity, status, affected_assets, reasoning)
               VALUES ($1, $2, $3, $4, $5, 'new', $6, $7)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(alert_id)
        .bind(event_ids)
        .bind(threat_score)
        .bind(severity)
        .bind(affected_assets)
        .bind(reasoning)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_alert(&self, alert_id: Uuid) -> Result<Option<AlertRow>> {
        let row = sqlx::query_as::<_, AlertRow>("SELECT * FROM alerts WHERE alert_id = $1")
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_alerts(&self) -> Result<Vec<AlertRow>> {
        let rows = sqlx::query_as::<_, AlertRow>("SELECT * FROM alerts ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn set_alert_verdict(&self, alert_id: Uuid, verdict: &str) -> Result<()> {
        sqlx::query("UPDATE alerts SET verdict = $2, updated_at = now() WHERE alert_id = $1")
            .bind(alert_id)
            .bind(verdict)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Writes the four LLM-enrichment fields. Idempotent: replaying the
    /// same bundle overwrites with identical values rather than
    /// duplicating anything, satisfying the alert/LLM idempotence
    /// invariant.
    pub async fn set_alert_llm_fields(
        &self,
        alert_id: Uuid,
        narrative: &str,
        mitre_tactic: &str,
        mitre_technique: &str,
        remediation: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE alerts SET
                 llm_narrative = $2, llm_mitre_tactic = $3,
                 llm_mitre_technique = $4, llm_remediation = $5,
                 updated_at = now()
               WHERE alert_id = $1"#,
        )
        .bind(alert_id)
        .bind(narrative)
        .bind(mitre_tactic)
        .bind(mitre_technique)
        .bind(remediation)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
