use anyhow::Result;

use super::schema::Database;
use super::types::{Feed, FeedSubscription, NewFeed, NewSubscription};

const FEED_COLUMNS: &str = "id, url, rss_url, title, description, last_fetched";
const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, feed_id, category_id, sort_order, unread_count, title";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Look up a feed by the URL of its RSS/Atom document.
    pub async fn get_feed_by_rss_url(&self, rss_url: &str) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {} FROM feeds WHERE rss_url = ?",
            FEED_COLUMNS
        ))
        .bind(rss_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Insert a feed row that was never fetched (`last_fetched` stays NULL).
    ///
    /// Fails on a duplicate `rss_url`.
    pub async fn create_feed(&self, feed: &NewFeed) -> Result<Feed> {
        let created = sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (url, rss_url, title, description, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            FEED_COLUMNS
        ))
        .bind(&feed.url)
        .bind(&feed.rss_url)
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Insert or refresh a feed after a successful fetch (ON CONFLICT on rss_url).
    ///
    /// Stamps `last_fetched` with the current time.
    pub async fn upsert_fetched_feed(&self, feed: &NewFeed) -> Result<Feed> {
        let now = chrono::Utc::now().timestamp();
        let stored = sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (url, rss_url, title, description, last_fetched, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(rss_url) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                description = excluded.description,
                last_fetched = excluded.last_fetched
            RETURNING {}
            "#,
            FEED_COLUMNS
        ))
        .bind(&feed.url)
        .bind(&feed.rss_url)
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// True if the user already follows a feed whose `rss_url` matches.
    pub async fn is_subscribed(&self, user_id: i64, rss_url: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM feed_subscriptions s
            JOIN feeds f ON f.id = s.feed_id
            WHERE s.user_id = ? AND f.rss_url = ?
            "#,
        )
        .bind(user_id)
        .bind(rss_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Create a subscription with an unread count of zero.
    pub async fn create_subscription(&self, sub: &NewSubscription) -> Result<FeedSubscription> {
        let created = sqlx::query_as::<_, FeedSubscription>(&format!(
            r#"
            INSERT INTO feed_subscriptions
                (user_id, feed_id, category_id, sort_order, unread_count, title, created_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(sub.user_id)
        .bind(sub.feed_id)
        .bind(sub.category_id)
        .bind(sub.sort_order)
        .bind(&sub.title)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// All subscriptions of a user, ordered by category then display order.
    pub async fn get_subscriptions(&self, user_id: i64) -> Result<Vec<FeedSubscription>> {
        let rows = sqlx::query_as::<_, FeedSubscription>(&format!(
            "SELECT {} FROM feed_subscriptions WHERE user_id = ? ORDER BY category_id, sort_order, id",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Recompute a subscription's unread count from the user's article states.
    pub async fn refresh_unread_count(&self, subscription_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            UPDATE feed_subscriptions
            SET unread_count = (
                SELECT COUNT(*)
                FROM user_articles ua
                JOIN articles a ON a.id = ua.article_id
                WHERE ua.user_id = feed_subscriptions.user_id
                  AND a.feed_id = feed_subscriptions.feed_id
                  AND a.deleted_at IS NULL
                  AND ua.read_date IS NULL
            )
            WHERE id = ?
            RETURNING unread_count
            "#,
        )
        .bind(subscription_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewFeed, NewSubscription};

    async fn test_db() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("tester").await.unwrap();
        (db, user.id)
    }

    fn test_feed(id: i64) -> NewFeed {
        NewFeed {
            url: format!("https://feed{}.example.com", id),
            rss_url: format!("https://feed{}.example.com/rss", id),
            title: format!("Test Feed {}", id),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_feed() {
        let (db, _) = test_db().await;

        let created = db.create_feed(&test_feed(1)).await.unwrap();
        assert!(created.last_fetched.is_none());

        let found = db
            .get_feed_by_rss_url("https://feed1.example.com/rss")
            .await
            .unwrap();
        assert_eq!(found, Some(created));
        assert!(db
            .get_feed_by_rss_url("https://missing.example.com/rss")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_feed_duplicate_rss_url_fails() {
        let (db, _) = test_db().await;
        db.create_feed(&test_feed(1)).await.unwrap();
        assert!(db.create_feed(&test_feed(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_fetched_feed_keeps_id() {
        let (db, _) = test_db().await;
        let placeholder = db.create_feed(&test_feed(1)).await.unwrap();

        let mut refreshed = test_feed(1);
        refreshed.title = "Real Title".to_string();
        let stored = db.upsert_fetched_feed(&refreshed).await.unwrap();

        assert_eq!(stored.id, placeholder.id);
        assert_eq!(stored.title, "Real Title");
        assert!(stored.last_fetched.is_some());
    }

    #[tokio::test]
    async fn test_is_subscribed_matches_rss_url() {
        let (db, user_id) = test_db().await;
        let root = db.get_root_category(user_id).await.unwrap();
        let feed = db.create_feed(&test_feed(1)).await.unwrap();

        assert!(!db
            .is_subscribed(user_id, "https://feed1.example.com/rss")
            .await
            .unwrap());

        let sub = db
            .create_subscription(&NewSubscription {
                user_id,
                feed_id: feed.id,
                category_id: root.id,
                sort_order: 0,
                title: Some("Mine".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(sub.unread_count, 0);

        assert!(db
            .is_subscribed(user_id, "https://feed1.example.com/rss")
            .await
            .unwrap());
        assert_eq!(
            db.count_category_subscriptions(root.id, user_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_is_subscribed_is_per_user() {
        let (db, alice) = test_db().await;
        let bob = db.create_user("bob").await.unwrap().id;
        let root = db.get_root_category(alice).await.unwrap();
        let feed = db.create_feed(&test_feed(1)).await.unwrap();

        db.create_subscription(&NewSubscription {
            user_id: alice,
            feed_id: feed.id,
            category_id: root.id,
            sort_order: 0,
            title: None,
        })
        .await
        .unwrap();

        assert!(!db
            .is_subscribed(bob, "https://feed1.example.com/rss")
            .await
            .unwrap());
    }
}
