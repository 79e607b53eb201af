//! Test doubles for the importer's injected dependencies.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::store::ImportStore;
use crate::feed::{FeedSynchronizer, FetchError, SyncError};
use crate::storage::{
    Article, Category, Database, Feed, FeedSubscription, Job, JobEventType, NewArticle,
    NewCategory, NewFeed, NewSubscription, UserArticle,
};

/// Synchronizer that "fetches" only a fixed set of URLs, storing each as an
/// empty feed titled after its URL. Every other URL fails with HTTP 404.
pub struct FakeSynchronizer {
    db: Database,
    reachable: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeSynchronizer {
    pub fn reachable(db: &Database, urls: &[&str]) -> Self {
        Self {
            db: db.clone(),
            reachable: urls.iter().map(|u| u.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// URLs passed to `synchronize`, in call order.
    pub fn synchronized(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSynchronizer for FakeSynchronizer {
    async fn synchronize(&self, url: &str) -> Result<Feed, SyncError> {
        self.calls.lock().unwrap().push(url.to_string());
        if !self.reachable.contains(url) {
            return Err(SyncError::Fetch(FetchError::HttpStatus(404)));
        }
        self.db
            .upsert_fetched_feed(&NewFeed {
                url: url.to_string(),
                rss_url: url.to_string(),
                title: url.to_string(),
                description: None,
            })
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))
    }

    async fn seed_initial_unread(
        &self,
        user_id: i64,
        subscription: &FeedSubscription,
    ) -> Result<()> {
        self.db
            .create_initial_user_articles(user_id, subscription.feed_id, 10)
            .await?;
        self.db.refresh_unread_count(subscription.id).await?;
        Ok(())
    }
}

/// Database-backed store that refuses to subscribe to one chosen feed.
pub struct FailingStore {
    db: Database,
    refused_feed: Option<String>,
}

impl FailingStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            refused_feed: None,
        }
    }

    pub fn fail_subscription(mut self, rss_url: &str) -> Self {
        self.refused_feed = Some(rss_url.to_string());
        self
    }
}

#[async_trait]
impl ImportStore for FailingStore {
    async fn create_job(&self, user_id: i64) -> Result<Job> {
        ImportStore::create_job(&self.db, user_id).await
    }

    async fn append_job_event(
        &self,
        job_id: i64,
        event_type: JobEventType,
        message: &str,
    ) -> Result<()> {
        ImportStore::append_job_event(&self.db, job_id, event_type, message).await
    }

    async fn finish_job(&self, job_id: i64) -> Result<()> {
        self.db.finish_job(job_id).await
    }

    async fn get_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        self.db.get_categories(user_id).await
    }

    async fn create_category(&self, category: &NewCategory) -> Result<Category> {
        self.db.create_category(category).await
    }

    async fn count_category_subscriptions(&self, category_id: i64, user_id: i64) -> Result<i64> {
        self.db.count_category_subscriptions(category_id, user_id).await
    }

    async fn is_subscribed(&self, user_id: i64, rss_url: &str) -> Result<bool> {
        self.db.is_subscribed(user_id, rss_url).await
    }

    async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<FeedSubscription> {
        if let Some(refused) = &self.refused_feed {
            let feed = self.db.get_feed_by_rss_url(refused).await?;
            if feed.is_some_and(|f| f.id == subscription.feed_id) {
                bail!("disk I/O error");
            }
        }
        self.db.create_subscription(subscription).await
    }

    async fn get_feed_by_rss_url(&self, rss_url: &str) -> Result<Option<Feed>> {
        self.db.get_feed_by_rss_url(rss_url).await
    }

    async fn create_feed(&self, feed: &NewFeed) -> Result<Feed> {
        self.db.create_feed(feed).await
    }

    async fn find_article(
        &self,
        feed_id: i64,
        title: &str,
        url: Option<&str>,
    ) -> Result<Option<Article>> {
        self.db.find_article(feed_id, title, url).await
    }

    async fn create_article(&self, article: &NewArticle) -> Result<Article> {
        self.db.create_article(article).await
    }

    async fn get_user_article(
        &self,
        user_id: i64,
        article_id: i64,
    ) -> Result<Option<UserArticle>> {
        self.db.get_user_article(user_id, article_id).await
    }

    async fn create_user_article(
        &self,
        user_id: i64,
        article_id: i64,
        read_date: Option<i64>,
        starred_date: Option<i64>,
    ) -> Result<UserArticle> {
        self.db
            .create_user_article(user_id, article_id, read_date, starred_date)
            .await
    }

    async fn star_user_article(&self, user_article_id: i64, date: i64) -> Result<bool> {
        self.db.star_user_article(user_article_id, date).await
    }
}
