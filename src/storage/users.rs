use anyhow::{bail, Result};

use super::schema::Database;
use super::types::User;
use crate::util::strip_control_chars;

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user together with its root category, returning the user.
    ///
    /// Both rows are written in one transaction so a user never exists
    /// without the root category the importer files unfiled feeds under.
    pub async fn create_user(&self, username: &str) -> Result<User> {
        let clean = strip_control_chars(username);
        let clean = clean.trim();
        if clean.is_empty() {
            bail!("Username cannot be empty or whitespace-only");
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let user: User = sqlx::query_as(
            "INSERT INTO users (username, created_at) VALUES (?, ?) RETURNING id, username, created_at",
        )
        .bind(clean)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO categories (user_id, parent_id, name, sort_order, created_at) VALUES (?, NULL, NULL, 0, ?)",
        )
        .bind(user.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(user_id = user.id, username = %user.username, "Created user");
        Ok(user)
    }

    pub async fn get_user_by_name(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("SELECT id, username, created_at FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }
}
