use uuid::Uuid;

use crate::models::InfraNodeRow;
use crate::{Result, Store};

impl Store {
    pub async fn insert_infra_node(&self, hostname: &str, address: &str) -> Result<InfraNodeRow> {
        let row = sqlx::query_as::<_, InfraNodeRow>(
            r#"INSERT INTO infra_nodes (id, hostname, address) VALUES ($1, $2, $3) RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(hostname)
        .bind(address)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_infra_nodes(&self) -> Result<Vec<InfraNodeRow>> {
        let rows = sqlx::query_as::<_, InfraNodeRow>("SELECT * FROM infra_nodes ORDER BY discovered_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_infra_node(&self, id: Uuid) -> Result<Option<InfraNodeRow>> {
        let row = sqlx::query_as::<_, InfraNodeRow>("SELECT * FROM infra_nodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn mark_infra_node_deployed(&self, id: Uuid) -> Result<Option<InfraNodeRow>> {
        let row = sqlx::query_as::<_, InfraNodeRow>("UPDATE infra_nodes SET deployed = true WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
