//! API token database operations

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Token repository
pub struct TokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TokenRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue a new bearer token for a user
    pub async fn issue(&self, user_id: i64) -> Result<String> {
        let token = Uuid::new_v4().simple().to_string();

        sqlx::query("INSERT INTO api_tokens (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(Utc::now().to_rfc3339())
            .execute(self.pool)
            .await?;

        Ok(token)
    }

    /// Resolve a token to the user it was issued for
    pub async fn resolve(&self, token: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM api_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(|r| r.0))
    }

    /// Revoke a token
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE token = ?")
            .bind(token)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
