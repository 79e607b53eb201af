use anyhow::Result;

use super::outcome::{ItemKind, ItemOutcome};
use super::store::ImportStore;
use super::tracker::ImportJobTracker;
use crate::feed::{
    repair_guid, FeedSynchronizer, StarredError, StarredItem, StarredRecord, StarredStream,
};
use crate::storage::{Article, Feed, NewArticle, NewFeed};
use crate::util::abbreviate;

/// Longest title given to a placeholder feed.
const PLACEHOLDER_TITLE_CHARS: usize = 100;

/// What happened to the user's star on an imported article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarMerge {
    Created,
    Starred,
    AlreadyStarred,
}

/// Merges starred items into the shared feed/article tables and the user's
/// article state.
pub struct ArticleReconciler<'a> {
    store: &'a dyn ImportStore,
    sync: &'a dyn FeedSynchronizer,
    user_id: i64,
}

impl<'a> ArticleReconciler<'a> {
    pub fn new(store: &'a dyn ImportStore, sync: &'a dyn FeedSynchronizer, user_id: i64) -> Self {
        Self {
            store,
            sync,
            user_id,
        }
    }

    /// Consume the stream to its end, recording one event per record.
    ///
    /// Returns `Err` only when the export itself turns out to be malformed.
    pub async fn import_stream(
        &self,
        stream: &mut StarredStream,
        tracker: &mut ImportJobTracker<'_>,
    ) -> Result<(), StarredError> {
        while let Some(record) = stream.next().await {
            let outcome = match record? {
                StarredRecord::Item(item) => match self.reconcile(&item).await {
                    Ok(merge) => {
                        tracing::debug!(
                            title = %item.article.title,
                            ?merge,
                            "Imported starred article"
                        );
                        ItemOutcome::success(ItemKind::StarredArticle, item.article.title)
                    }
                    Err(e) => {
                        ItemOutcome::failure(ItemKind::StarredArticle, item.article.title, e)
                    }
                },
                StarredRecord::Invalid(invalid) => ItemOutcome::failure(
                    ItemKind::StarredArticle,
                    invalid.identity,
                    invalid.reason,
                ),
            };
            tracker.record(outcome).await;
        }
        Ok(())
    }

    pub async fn reconcile(&self, item: &StarredItem) -> Result<StarMerge> {
        let feed = self.resolve_feed(&item.feed.rss_url).await?;
        let article = self.resolve_article(&feed, item).await?;

        let date = item
            .article
            .published
            .unwrap_or_else(|| chrono::Utc::now().timestamp());

        match self.store.get_user_article(self.user_id, article.id).await? {
            None => {
                self.store
                    .create_user_article(self.user_id, article.id, Some(date), Some(date))
                    .await?;
                Ok(StarMerge::Created)
            }
            Some(state) if state.is_starred() => Ok(StarMerge::AlreadyStarred),
            Some(state) => {
                self.store.star_user_article(state.id, date).await?;
                Ok(StarMerge::Starred)
            }
        }
    }

    /// Stored feed for `rss_url`, fetching it when unknown. A feed that cannot
    /// be fetched is stored as a placeholder so the article still has a home.
    async fn resolve_feed(&self, rss_url: &str) -> Result<Feed> {
        if let Some(feed) = self.store.get_feed_by_rss_url(rss_url).await? {
            return Ok(feed);
        }

        match self.sync.synchronize(rss_url).await {
            Ok(feed) => Ok(feed),
            Err(e) => {
                tracing::warn!(url = rss_url, error = %e, "Feed unreachable, storing placeholder");
                self.store
                    .create_feed(&NewFeed {
                        url: rss_url.to_string(),
                        rss_url: rss_url.to_string(),
                        title: abbreviate(rss_url, PLACEHOLDER_TITLE_CHARS).into_owned(),
                        description: None,
                    })
                    .await
            }
        }
    }

    async fn resolve_article(&self, feed: &Feed, item: &StarredItem) -> Result<Article> {
        let source = &item.article;
        if let Some(existing) = self
            .store
            .find_article(feed.id, &source.title, source.url.as_deref())
            .await?
        {
            return Ok(existing);
        }

        self.store
            .create_article(&NewArticle {
                feed_id: feed.id,
                url: source.url.clone(),
                guid: repair_guid(
                    source.guid.as_deref(),
                    source.url.as_deref(),
                    &source.title,
                    source.published,
                ),
                title: source.title.clone(),
                creator: source.creator.clone(),
                description: source.description.clone(),
                published: source.published,
            })
            .await
    }
}
