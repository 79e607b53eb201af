use std::path::Path;

use anyhow::Result;

use super::bundle::BundleWalker;
use super::outcome::{BatchOutcome, ImportOutcome, ItemKind, ItemOutcome};
use super::store::ImportStore;
use super::ImportError;
use crate::archive::MemberKind;
use crate::feed::{count_starred, flatten, parse_file};
use crate::storage::{Job, JobEventType};

/// Totals found by the counting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleCounts {
    pub feeds: usize,
    pub starred: usize,
}

/// Pass 1: parse every member of the bundle and count its work items.
///
/// Nothing is written. When a zip holds several subscription lists only the
/// last one is imported, so only the last one is counted.
pub async fn count_bundle(
    path: &Path,
    temp_dir: Option<&Path>,
) -> Result<BundleCounts, ImportError> {
    let mut counts = BundleCounts::default();
    let mut walker = BundleWalker::open(path, temp_dir).await?;

    while let Some(member) = walker.next_member().await? {
        match member.kind() {
            MemberKind::Subscriptions => {
                let outlines = parse_file(member.path()).await?;
                counts.feeds = flatten(&outlines).feed_count();
            }
            MemberKind::Starred => {
                counts.starred += count_starred(member.path()).await?;
            }
        }
    }

    Ok(counts)
}

/// Writes the job log of one import: the job row, its two summary events and
/// one event per processed item.
pub struct ImportJobTracker<'a> {
    store: &'a dyn ImportStore,
    job: Job,
    counts: BundleCounts,
    feeds: BatchOutcome,
    starred: BatchOutcome,
}

impl<'a> ImportJobTracker<'a> {
    /// Create the job and its feed-count and starred-count events, in that order.
    pub async fn start(
        store: &'a dyn ImportStore,
        user_id: i64,
        counts: BundleCounts,
    ) -> Result<ImportJobTracker<'a>> {
        let job = store.create_job(user_id).await?;

        let summary = async {
            store
                .append_job_event(job.id, JobEventType::FeedCount, &counts.feeds.to_string())
                .await?;
            store
                .append_job_event(
                    job.id,
                    JobEventType::StarredArticleCount,
                    &counts.starred.to_string(),
                )
                .await
        };
        if let Err(e) = summary.await {
            // Leave no job open that will never receive item events
            if let Err(close) = store.finish_job(job.id).await {
                tracing::warn!(job_id = job.id, error = %close, "Failed to close job");
            }
            return Err(e);
        }

        tracing::info!(
            job_id = job.id,
            user_id,
            feeds = counts.feeds,
            starred = counts.starred,
            "Import job started"
        );
        Ok(Self {
            store,
            job,
            counts,
            feeds: BatchOutcome::default(),
            starred: BatchOutcome::default(),
        })
    }

    pub fn job_id(&self) -> i64 {
        self.job.id
    }

    pub fn counts(&self) -> BundleCounts {
        self.counts
    }

    /// Append the item's event. A failed append is logged and otherwise ignored.
    pub async fn record(&mut self, outcome: ItemOutcome) {
        if let Err(reason) = &outcome.result {
            tracing::warn!(
                job_id = self.job.id,
                kind = ?outcome.kind,
                item = %outcome.identity,
                reason = %reason,
                "Import item failed"
            );
        }

        if let Err(e) = self
            .store
            .append_job_event(self.job.id, outcome.event_type(), &outcome.identity)
            .await
        {
            tracing::warn!(
                job_id = self.job.id,
                item = %outcome.identity,
                error = %e,
                "Failed to record import event"
            );
        }

        match outcome.kind {
            ItemKind::Feed => self.feeds.add(&outcome),
            ItemKind::StarredArticle => self.starred.add(&outcome),
        }
    }

    /// Set the job's end date and return the aggregated outcome.
    pub async fn finish(self, aborted: Option<String>) -> ImportOutcome {
        if let Err(e) = self.store.finish_job(self.job.id).await {
            tracing::error!(job_id = self.job.id, error = %e, "Failed to close import job");
        }

        tracing::info!(
            job_id = self.job.id,
            feeds_ok = self.feeds.succeeded,
            feeds_failed = self.feeds.failed,
            starred_ok = self.starred.succeeded,
            starred_failed = self.starred.failed,
            aborted = aborted.is_some(),
            "Import job finished"
        );

        ImportOutcome {
            job_id: self.job.id,
            feeds: self.feeds,
            starred: self.starred,
            aborted,
        }
    }
}
