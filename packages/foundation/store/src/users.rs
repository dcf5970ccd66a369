use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::UserRow;
use crate::{Result, Store};

impl Store {
    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"INSERT INTO users (id, username, password_hash)
               VALUES ($1, $2, $3)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn set_bearer_token(&self, user_id: Uuid, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET bearer_token = $2, bearer_token_expires_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Candidates for bearer-token auth: every user with a live,
    /// unexpired token. Callers must still compare each candidate's token
    /// to the presented one in constant time — this query narrows the
    /// search, it does not itself authenticate.
    pub async fn active_bearer_token_candidates(&self) -> Result<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE bearer_token IS NOT NULL AND bearer_token_expires_at > now()")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
