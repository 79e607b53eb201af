use std::collections::HashMap;

use anyhow::Result;

use super::category_tree::CategoryTree;
use super::outcome::{ItemKind, ItemOutcome};
use super::store::ImportStore;
use super::tracker::ImportJobTracker;
use crate::feed::{FeedSynchronizer, FlatOutlines, Outline};
use crate::storage::{Category, NewCategory, NewSubscription};
use crate::util::clean_label;

/// Identity recorded for an outline that names no feed URL at all.
const MISSING_URL: &str = "(no feed URL)";

/// Turns flattened feed outlines into categories and subscriptions.
pub struct SubscriptionReconciler<'a> {
    store: &'a dyn ImportStore,
    sync: &'a dyn FeedSynchronizer,
    user_id: i64,
}

impl<'a> SubscriptionReconciler<'a> {
    pub fn new(store: &'a dyn ImportStore, sync: &'a dyn FeedSynchronizer, user_id: i64) -> Self {
        Self {
            store,
            sync,
            user_id,
        }
    }

    /// Import every group, recording one event per outline.
    ///
    /// Fails only when the user's categories cannot be loaded; anything that
    /// goes wrong with a single outline is recorded and skipped.
    pub async fn reconcile(
        &self,
        outlines: FlatOutlines,
        tracker: &mut ImportJobTracker<'_>,
    ) -> Result<()> {
        let tree = CategoryTree::build(self.store.get_categories(self.user_id).await?)?;
        let root_id = tree.root().id;
        let mut categories = tree.name_map();

        let total = outlines.feed_count();
        let mut position = 0;

        for group in outlines.into_groups() {
            let key = group.label.as_deref().and_then(clean_label);
            let resolved = self.resolve_category(&mut categories, key, root_id).await;

            let (category, mut order) = match resolved {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(
                        label = ?group.label,
                        error = %e,
                        "Failed to resolve category"
                    );
                    for outline in &group.outlines {
                        position += 1;
                        let identity = outline_identity(outline);
                        tracker
                            .record(ItemOutcome::failure(ItemKind::Feed, identity, &e))
                            .await;
                    }
                    continue;
                }
            };

            for outline in &group.outlines {
                position += 1;
                tracing::info!(
                    category = ?category.name,
                    "Importing outline {}/{}",
                    position,
                    total
                );
                let outcome = self.import_outline(outline, &category, &mut order).await;
                tracker.record(outcome).await;
            }
        }

        Ok(())
    }

    /// Find or create the category for a group key and return it with the
    /// next free display order inside it.
    async fn resolve_category(
        &self,
        categories: &mut HashMap<Option<String>, Category>,
        key: Option<String>,
        root_id: i64,
    ) -> Result<(Category, i64)> {
        if let Some(existing) = categories.get(&key) {
            let order = self
                .store
                .count_category_subscriptions(existing.id, self.user_id)
                .await?;
            return Ok((existing.clone(), order));
        }

        // `None` always resolves to the root, so the key carries a name here
        let name = key.clone().unwrap_or_default();
        let created = self
            .store
            .create_category(&NewCategory {
                user_id: self.user_id,
                parent_id: Some(root_id),
                name,
                sort_order: categories.len() as i64 - 1,
            })
            .await?;
        tracing::debug!(
            category_id = created.id,
            name = ?created.name,
            "Created category"
        );

        categories.insert(key, created.clone());
        Ok((created, 0))
    }

    async fn import_outline(
        &self,
        outline: &Outline,
        category: &Category,
        order: &mut i64,
    ) -> ItemOutcome {
        let url = match outline.xml_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => {
                let identity = outline_identity(outline);
                return ItemOutcome::failure(
                    ItemKind::Feed,
                    identity,
                    "Outline has an empty feed URL",
                );
            }
        };

        match self.store.is_subscribed(self.user_id, url).await {
            Ok(true) => {
                tracing::debug!(url, "Already subscribed");
                return ItemOutcome::success(ItemKind::Feed, url);
            }
            Ok(false) => {}
            Err(e) => return ItemOutcome::failure(ItemKind::Feed, url, e),
        }

        let feed = match self.sync.synchronize(url).await {
            Ok(feed) => feed,
            Err(e) => return ItemOutcome::failure(ItemKind::Feed, url, e),
        };

        let subscription = match self
            .store
            .create_subscription(&NewSubscription {
                user_id: self.user_id,
                feed_id: feed.id,
                category_id: category.id,
                sort_order: *order,
                title: outline.label().and_then(clean_label),
            })
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => return ItemOutcome::failure(ItemKind::Feed, feed.rss_url, e),
        };
        *order += 1;

        if let Err(e) = self.sync.seed_initial_unread(self.user_id, &subscription).await {
            return ItemOutcome::failure(ItemKind::Feed, feed.rss_url, e);
        }

        ItemOutcome::success(ItemKind::Feed, feed.rss_url)
    }
}

fn outline_identity(outline: &Outline) -> String {
    match outline.xml_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => outline.label().unwrap_or(MISSING_URL).to_string(),
    }
}
