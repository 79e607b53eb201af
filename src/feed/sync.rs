use anyhow::Result;
use async_trait::async_trait;
use reqwest::redirect::Policy;
use thiserror::Error;

use super::fetcher::{fetch_feed_bytes, FetchError, FetchPolicy};
use super::parser::parse_feed;
use crate::storage::{Database, Feed, FeedSubscription, NewFeed};
use crate::util::{validate_url, HostPolicy, UrlValidationError};

/// Why a feed could not be synchronized. Always isolated to one item.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Storage(String),
}

/// Fetches feeds on behalf of the importer.
///
/// `synchronize` returns the canonical stored [`Feed`] for a URL, creating or
/// refreshing it. `seed_initial_unread` gives a brand new subscription its
/// first batch of unread articles.
#[async_trait]
pub trait FeedSynchronizer: Send + Sync {
    async fn synchronize(&self, url: &str) -> Result<Feed, SyncError>;

    async fn seed_initial_unread(
        &self,
        user_id: i64,
        subscription: &FeedSubscription,
    ) -> Result<()>;
}

/// Knobs for [`HttpFeedSynchronizer`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub fetch: FetchPolicy,
    pub hosts: HostPolicy,
    /// Articles marked unread for the user when a subscription is created.
    pub initial_unread_articles: usize,
    pub user_agent: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch: FetchPolicy::default(),
            hosts: HostPolicy::PublicOnly,
            initial_unread_articles: 10,
            user_agent: concat!("reader-import/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Redirects are capped at 3, loops are refused and every hop is checked
/// against the host policy.
fn redirect_policy(hosts: HostPolicy) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }
        if let Err(e) = validate_url(url.as_str(), hosts) {
            return attempt.error(e);
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// [`FeedSynchronizer`] that downloads feeds over HTTP and stores them.
#[derive(Clone)]
pub struct HttpFeedSynchronizer {
    db: Database,
    client: reqwest::Client,
    settings: SyncSettings,
}

impl HttpFeedSynchronizer {
    pub fn new(db: Database, settings: SyncSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(redirect_policy(settings.hosts))
            .user_agent(settings.user_agent.clone())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .timeout(settings.fetch.timeout)
            .build()?;
        Ok(Self {
            db,
            client,
            settings,
        })
    }
}

#[async_trait]
impl FeedSynchronizer for HttpFeedSynchronizer {
    async fn synchronize(&self, url: &str) -> Result<Feed, SyncError> {
        let validated = validate_url(url, self.settings.hosts)?;
        let bytes = fetch_feed_bytes(&self.client, validated.as_str(), &self.settings.fetch).await?;
        let parsed = parse_feed(&bytes).map_err(|e| SyncError::Parse(e.to_string()))?;

        let feed = self
            .db
            .upsert_fetched_feed(&NewFeed {
                url: parsed.link.clone().unwrap_or_else(|| url.to_string()),
                rss_url: url.to_string(),
                title: parsed.title.clone().unwrap_or_else(|| url.to_string()),
                description: parsed.description.clone(),
            })
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let inserted = self
            .db
            .insert_new_articles(feed.id, &parsed.articles)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        tracing::debug!(
            feed_id = feed.id,
            url = %url,
            entries = parsed.articles.len(),
            inserted,
            "Synchronized feed"
        );
        Ok(feed)
    }

    async fn seed_initial_unread(
        &self,
        user_id: i64,
        subscription: &FeedSubscription,
    ) -> Result<()> {
        let seeded = self
            .db
            .create_initial_user_articles(
                user_id,
                subscription.feed_id,
                self.settings.initial_unread_articles,
            )
            .await?;
        let unread = self.db.refresh_unread_count(subscription.id).await?;
        tracing::debug!(
            subscription_id = subscription.id,
            seeded,
            unread,
            "Seeded initial unread articles"
        );
        Ok(())
    }
}
