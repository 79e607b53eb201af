use anyhow::{anyhow, bail, Result};

use super::schema::Database;
use super::types::{Category, NewCategory};
use crate::util::strip_control_chars;

impl Database {
    // ========================================================================
    // Category Operations
    // ========================================================================

    /// Maximum nesting depth for categories.
    /// Root = depth 0, child = depth 1, grandchild = depth 2.
    /// A category at depth 3 is rejected.
    const MAX_CATEGORY_DEPTH: i64 = 3;

    /// SEC-014: Sanitize and validate a category name.
    ///
    /// Strips control characters (ANSI escape injection prevention), trims
    /// whitespace, and rejects empty/whitespace-only names.
    fn sanitize_category_name(name: &str) -> Result<String> {
        let sanitized = strip_control_chars(name);
        let trimmed = sanitized.trim();
        if trimmed.is_empty() {
            bail!("Category name cannot be empty or whitespace-only");
        }
        Ok(trimmed.to_owned())
    }

    /// Create a named category under `parent_id` and return the stored row.
    ///
    /// The parent chain depth is validated against [`Self::MAX_CATEGORY_DEPTH`].
    /// SEC-014: the name is sanitized before insertion.
    pub async fn create_category(&self, category: &NewCategory) -> Result<Category> {
        let clean_name = Self::sanitize_category_name(&category.name)?;

        if let Some(pid) = category.parent_id {
            let depth = self.ancestor_depth(pid).await?;
            if depth + 1 >= Self::MAX_CATEGORY_DEPTH {
                bail!(
                    "Cannot create category: maximum nesting depth ({}) would be exceeded",
                    Self::MAX_CATEGORY_DEPTH
                );
            }
        }

        let created: Category = sqlx::query_as(
            r#"
            INSERT INTO categories (user_id, parent_id, name, sort_order, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, user_id, parent_id, name, sort_order, folded
            "#,
        )
        .bind(category.user_id)
        .bind(category.parent_id)
        .bind(&clean_name)
        .bind(category.sort_order)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// All live categories of a user, root included, as a flat list.
    ///
    /// Ordered by parent then `sort_order`; callers build the tree from
    /// `parent_id` links.
    pub async fn get_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, user_id, parent_id, name, sort_order, folded
            FROM categories
            WHERE user_id = ? AND deleted_at IS NULL
            ORDER BY parent_id IS NOT NULL, parent_id, sort_order, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The root category of a user.
    pub async fn get_root_category(&self, user_id: i64) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, user_id, parent_id, name, sort_order, folded
            FROM categories
            WHERE user_id = ? AND parent_id IS NULL AND deleted_at IS NULL
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("Root category not found for user {}", user_id))
    }

    /// Number of subscriptions a user has filed in a category.
    pub async fn count_category_subscriptions(&self, category_id: i64, user_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM feed_subscriptions WHERE category_id = ? AND user_id = ?",
        )
        .bind(category_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Compute the depth of a category by walking its ancestor chain.
    /// Root categories have depth 0.
    ///
    /// LIMIT 50 on the recursive CTE bounds the walk if corrupted data
    /// contains a cycle.
    async fn ancestor_depth(&self, category_id: i64) -> Result<i64> {
        let row: (Option<i64>,) = sqlx::query_as(
            r#"
            WITH RECURSIVE ancestors(id, parent_id, depth) AS (
                SELECT id, parent_id, 0 FROM categories WHERE id = ?
                UNION ALL
                SELECT c.id, c.parent_id, a.depth + 1
                FROM categories c
                JOIN ancestors a ON c.id = a.parent_id
                LIMIT 50
            )
            SELECT MAX(depth) FROM ancestors
            "#,
        )
        .bind(category_id)
        .fetch_one(&self.pool)
        .await?;

        row.0
            .ok_or_else(|| anyhow!("Parent category {} does not exist", category_id))
    }
}
