use anyhow::Result;
use async_trait::async_trait;

use crate::storage::{
    Article, Category, Database, Feed, FeedSubscription, Job, JobEventType, JobType, NewArticle,
    NewCategory, NewFeed, NewSubscription, UserArticle,
};

/// Persistence operations the importer performs.
///
/// Every call commits on its own; nothing the importer does spans a
/// transaction across items.
#[async_trait]
pub trait ImportStore: Send + Sync {
    // Job log
    async fn create_job(&self, user_id: i64) -> Result<Job>;
    async fn append_job_event(&self, job_id: i64, event_type: JobEventType, message: &str)
        -> Result<()>;
    async fn finish_job(&self, job_id: i64) -> Result<()>;

    // Categories and subscriptions
    async fn get_categories(&self, user_id: i64) -> Result<Vec<Category>>;
    async fn create_category(&self, category: &NewCategory) -> Result<Category>;
    async fn count_category_subscriptions(&self, category_id: i64, user_id: i64) -> Result<i64>;
    async fn is_subscribed(&self, user_id: i64, rss_url: &str) -> Result<bool>;
    async fn create_subscription(&self, subscription: &NewSubscription)
        -> Result<FeedSubscription>;

    // Feeds and articles
    async fn get_feed_by_rss_url(&self, rss_url: &str) -> Result<Option<Feed>>;
    async fn create_feed(&self, feed: &NewFeed) -> Result<Feed>;
    async fn find_article(
        &self,
        feed_id: i64,
        title: &str,
        url: Option<&str>,
    ) -> Result<Option<Article>>;
    async fn create_article(&self, article: &NewArticle) -> Result<Article>;

    // Per-user article state
    async fn get_user_article(&self, user_id: i64, article_id: i64)
        -> Result<Option<UserArticle>>;
    async fn create_user_article(
        &self,
        user_id: i64,
        article_id: i64,
        read_date: Option<i64>,
        starred_date: Option<i64>,
    ) -> Result<UserArticle>;
    async fn star_user_article(&self, user_article_id: i64, date: i64) -> Result<bool>;
}

#[async_trait]
impl ImportStore for Database {
    async fn create_job(&self, user_id: i64) -> Result<Job> {
        Database::create_job(self, user_id, JobType::Import).await
    }

    async fn append_job_event(
        &self,
        job_id: i64,
        event_type: JobEventType,
        message: &str,
    ) -> Result<()> {
        Database::append_job_event(self, job_id, event_type, message).await?;
        Ok(())
    }

    async fn finish_job(&self, job_id: i64) -> Result<()> {
        Database::finish_job(self, job_id).await
    }

    async fn get_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        Database::get_categories(self, user_id).await
    }

    async fn create_category(&self, category: &NewCategory) -> Result<Category> {
        Database::create_category(self, category).await
    }

    async fn count_category_subscriptions(&self, category_id: i64, user_id: i64) -> Result<i64> {
        Database::count_category_subscriptions(self, category_id, user_id).await
    }

    async fn is_subscribed(&self, user_id: i64, rss_url: &str) -> Result<bool> {
        Database::is_subscribed(self, user_id, rss_url).await
    }

    async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<FeedSubscription> {
        Database::create_subscription(self, subscription).await
    }

    async fn get_feed_by_rss_url(&self, rss_url: &str) -> Result<Option<Feed>> {
        Database::get_feed_by_rss_url(self, rss_url).await
    }

    async fn create_feed(&self, feed: &NewFeed) -> Result<Feed> {
        Database::create_feed(self, feed).await
    }

    async fn find_article(
        &self,
        feed_id: i64,
        title: &str,
        url: Option<&str>,
    ) -> Result<Option<Article>> {
        Database::find_article(self, feed_id, title, url).await
    }

    async fn create_article(&self, article: &NewArticle) -> Result<Article> {
        Database::create_article(self, article).await
    }

    async fn get_user_article(
        &self,
        user_id: i64,
        article_id: i64,
    ) -> Result<Option<UserArticle>> {
        Database::get_user_article(self, user_id, article_id).await
    }

    async fn create_user_article(
        &self,
        user_id: i64,
        article_id: i64,
        read_date: Option<i64>,
        starred_date: Option<i64>,
    ) -> Result<UserArticle> {
        Database::create_user_article(self, user_id, article_id, read_date, starred_date).await
    }

    async fn star_user_article(&self, user_article_id: i64, date: i64) -> Result<bool> {
        Database::star_user_article(self, user_article_id, date).await
    }
}
