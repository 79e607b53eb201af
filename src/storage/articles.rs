use anyhow::Result;

use super::schema::Database;
use super::types::{Article, NewArticle, ParsedArticle, UserArticle};

const ARTICLE_COLUMNS: &str =
    "id, feed_id, url, guid, title, creator, description, published, deleted_at";
const USER_ARTICLE_COLUMNS: &str = "id, user_id, article_id, read_date, starred_date";

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Find a live article of a feed by exact title and URL.
    ///
    /// `url` is compared with `IS` so a missing URL matches a missing URL.
    pub async fn find_article(
        &self,
        feed_id: i64,
        title: &str,
        url: Option<&str>,
    ) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {}
            FROM articles
            WHERE feed_id = ? AND title = ? AND url IS ? AND deleted_at IS NULL
            ORDER BY created_at, id
            LIMIT 1
            "#,
            ARTICLE_COLUMNS
        ))
        .bind(feed_id)
        .bind(title)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    pub async fn create_article(&self, article: &NewArticle) -> Result<Article> {
        let created = sqlx::query_as::<_, Article>(&format!(
            r#"
            INSERT INTO articles
                (feed_id, url, guid, title, creator, description, published, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            ARTICLE_COLUMNS
        ))
        .bind(article.feed_id)
        .bind(&article.url)
        .bind(&article.guid)
        .bind(&article.title)
        .bind(&article.creator)
        .bind(&article.description)
        .bind(article.published)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Insert parsed articles whose guid is not yet known for the feed.
    ///
    /// Returns the number of new rows. Existing articles are left as they are.
    pub async fn insert_new_articles(
        &self,
        feed_id: i64,
        articles: &[ParsedArticle],
    ) -> Result<usize> {
        if articles.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;

        for article in articles {
            let result = sqlx::query(
                r#"
                INSERT INTO articles
                    (feed_id, url, guid, title, creator, description, published, created_at)
                SELECT ?, ?, ?, ?, ?, ?, ?, ?
                WHERE NOT EXISTS (
                    SELECT 1 FROM articles WHERE feed_id = ? AND guid = ?
                )
                "#,
            )
            .bind(feed_id)
            .bind(&article.url)
            .bind(&article.guid)
            .bind(&article.title)
            .bind(&article.creator)
            .bind(&article.summary)
            .bind(article.published)
            .bind(now)
            .bind(feed_id)
            .bind(&article.guid)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Live articles of a feed, newest first.
    pub async fn get_articles_for_feed(
        &self,
        feed_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Article>> {
        let limit: i64 = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let articles = sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {}
            FROM articles
            WHERE feed_id = ? AND deleted_at IS NULL
            ORDER BY published DESC, id DESC
            LIMIT ?
            "#,
            ARTICLE_COLUMNS
        ))
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    // ========================================================================
    // User Article Operations
    // ========================================================================

    pub async fn get_user_article(
        &self,
        user_id: i64,
        article_id: i64,
    ) -> Result<Option<UserArticle>> {
        let row = sqlx::query_as::<_, UserArticle>(&format!(
            "SELECT {} FROM user_articles WHERE user_id = ? AND article_id = ?",
            USER_ARTICLE_COLUMNS
        ))
        .bind(user_id)
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Create a user article state; fails if one already exists for the pair.
    pub async fn create_user_article(
        &self,
        user_id: i64,
        article_id: i64,
        read_date: Option<i64>,
        starred_date: Option<i64>,
    ) -> Result<UserArticle> {
        let created = sqlx::query_as::<_, UserArticle>(&format!(
            r#"
            INSERT INTO user_articles (user_id, article_id, read_date, starred_date, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            USER_ARTICLE_COLUMNS
        ))
        .bind(user_id)
        .bind(article_id)
        .bind(read_date)
        .bind(starred_date)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Star an unstarred user article, marking it read at the same date.
    ///
    /// Guarded by `starred_date IS NULL`: an existing star is never replaced.
    /// Returns whether the row changed.
    pub async fn star_user_article(&self, user_article_id: i64, date: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_articles
            SET starred_date = ?, read_date = ?
            WHERE id = ? AND starred_date IS NULL
            "#,
        )
        .bind(date)
        .bind(date)
        .bind(user_article_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_user_articles(&self, user_id: i64) -> Result<Vec<UserArticle>> {
        let rows = sqlx::query_as::<_, UserArticle>(&format!(
            "SELECT {} FROM user_articles WHERE user_id = ? ORDER BY id",
            USER_ARTICLE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Give a user an unread state on the `limit` newest articles of a feed.
    ///
    /// Articles the user already has a state for are skipped. Returns the
    /// number of states created.
    pub async fn create_initial_user_articles(
        &self,
        user_id: i64,
        feed_id: i64,
        limit: usize,
    ) -> Result<u64> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_articles (user_id, article_id, created_at)
            SELECT ?, a.id, ?
            FROM articles a
            WHERE a.feed_id = ? AND a.deleted_at IS NULL
            ORDER BY a.published DESC, a.id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(chrono::Utc::now().timestamp())
        .bind(feed_id)
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
