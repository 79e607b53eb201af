//! Background import of subscription lists and starred-article exports.
//!
//! An import runs in two passes over the bundle. The first only counts work
//! items and fails the whole attempt on a malformed document, before any job
//! exists. The second creates the job, reconciles every item against storage
//! and records one job event per item; individual failures are logged as
//! events and never stop the job.

pub mod articles;
pub mod bundle;
pub mod category_tree;
pub mod outcome;
pub mod store;
pub mod subscriptions;
pub mod tracker;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::archive::{ArchiveError, MemberKind};
use crate::feed::{
    flatten, parse_file, FeedSynchronizer, FlatOutlines, OpmlError, StarredError, StarredStream,
};

pub use articles::{ArticleReconciler, StarMerge};
pub use bundle::BundleWalker;
pub use category_tree::CategoryTree;
pub use outcome::{BatchOutcome, ImportOutcome, ItemFailure, ItemKind, ItemOutcome};
pub use store::ImportStore;
pub use subscriptions::SubscriptionReconciler;
pub use tracker::{count_bundle, BundleCounts, ImportJobTracker};
pub use worker::{ImportQueue, ImportRequest, ImportTicket, ImportWorker, QueueClosed};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Invalid subscription list: {0}")]
    Opml(#[from] OpmlError),

    #[error("Invalid starred export: {0}")]
    Starred(#[from] StarredError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("Import worker stopped before reporting a result")]
    WorkerStopped,
}

/// Runs import requests against an injected store and synchronizer.
#[derive(Clone)]
pub struct Importer {
    store: Arc<dyn ImportStore>,
    sync: Arc<dyn FeedSynchronizer>,
    temp_dir: Option<PathBuf>,
}

impl Importer {
    pub fn new(store: Arc<dyn ImportStore>, sync: Arc<dyn FeedSynchronizer>) -> Self {
        Self {
            store,
            sync,
            temp_dir: None,
        }
    }

    /// Directory for members extracted from zip bundles (system temp by default).
    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Import one bundle to completion.
    ///
    /// `Err` means the bundle was rejected by the counting pass and no job was
    /// created. Once the job exists the result is always `Ok`, with per-item
    /// failures and a possible mid-way abort reported in the outcome.
    pub async fn run(&self, request: &ImportRequest) -> Result<ImportOutcome, ImportError> {
        let result = self.import(request).await;

        if request.remove_when_done {
            if let Err(e) = tokio::fs::remove_file(&request.path).await {
                tracing::debug!(
                    path = %request.path.display(),
                    error = %e,
                    "Failed to remove import file"
                );
            }
        }

        result
    }

    async fn import(&self, request: &ImportRequest) -> Result<ImportOutcome, ImportError> {
        let counts = match count_bundle(&request.path, self.temp_dir.as_deref()).await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::error!(
                    user_id = request.user_id,
                    path = %request.path.display(),
                    error = %e,
                    "Import rejected"
                );
                return Err(e);
            }
        };

        let mut tracker =
            ImportJobTracker::start(self.store.as_ref(), request.user_id, counts).await?;

        let aborted = match self.process(request, &mut tracker).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(job_id = tracker.job_id(), error = %e, "Import aborted");
                Some(e.to_string())
            }
        };

        Ok(tracker.finish(aborted).await)
    }

    /// Pass 2. Starred exports are imported as they are met; the subscription
    /// list (the last one, when a zip holds several) is imported at the end.
    async fn process(
        &self,
        request: &ImportRequest,
        tracker: &mut ImportJobTracker<'_>,
    ) -> Result<(), ImportError> {
        let store = self.store.as_ref();
        let sync = self.sync.as_ref();
        let articles = ArticleReconciler::new(store, sync, request.user_id);
        let mut subscriptions: Option<FlatOutlines> = None;

        let mut walker = BundleWalker::open(&request.path, self.temp_dir.as_deref()).await?;
        while let Some(member) = walker.next_member().await? {
            tracing::debug!(
                entry = member.entry_name(),
                kind = ?member.kind(),
                "Processing member"
            );
            match member.kind() {
                MemberKind::Subscriptions => {
                    let outlines = parse_file(member.path()).await?;
                    subscriptions = Some(flatten(&outlines));
                }
                MemberKind::Starred => {
                    let mut stream = StarredStream::open(member.path())?;
                    articles.import_stream(&mut stream, tracker).await?;
                }
            }
        }

        if let Some(outlines) = subscriptions {
            SubscriptionReconciler::new(store, sync, request.user_id)
                .reconcile(outlines, tracker)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeSynchronizer;
    use super::*;
    use crate::storage::Database;
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    const SCENARIO: &str = r#"<?xml version="1.0"?>
<opml version="1.0"><head><title>Subscriptions</title></head><body>
    <outline text="Tech" title="Tech">
        <outline text="A" type="rss" xmlUrl="https://a.example.com/rss"/>
        <outline text="B" type="rss" xmlUrl="https://b.example.com/rss"/>
    </outline>
    <outline text="News" title="News">
        <outline text="C" type="rss" xmlUrl="https://c.example.com/rss"/>
    </outline>
</body></opml>"#;

    const FEEDS: [&str; 3] = [
        "https://a.example.com/rss",
        "https://b.example.com/rss",
        "https://c.example.com/rss",
    ];

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, body) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    async fn setup(reachable: &[&str]) -> (Database, i64, Importer) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("reader").await.unwrap();
        let sync = FakeSynchronizer::reachable(&db, reachable);
        let importer = Importer::new(Arc::new(db.clone()), Arc::new(sync));
        (db, user.id, importer)
    }

    fn request(user_id: i64, path: &Path) -> ImportRequest {
        ImportRequest {
            user_id,
            path: path.to_path_buf(),
            remove_when_done: false,
        }
    }

    #[tokio::test]
    async fn test_opml_scenario() {
        let (db, user_id, importer) = setup(&FEEDS).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions.opml");
        std::fs::write(&path, SCENARIO).unwrap();

        let outcome = importer.run(&request(user_id, &path)).await.unwrap();
        assert_eq!(outcome.feeds.succeeded, 3);
        assert_eq!(outcome.aborted, None);

        let categories = db.get_categories(user_id).await.unwrap();
        assert_eq!(categories.len(), 3);
        assert_eq!(db.get_subscriptions(user_id).await.unwrap().len(), 3);

        let progress = db.job_progress(outcome.job_id).await.unwrap();
        assert_eq!(progress.feed_count, 3);
        assert_eq!(progress.starred_count, 0);
        assert_eq!(progress.processed, 3);
        assert!(progress.finished);
        assert_eq!(progress.fraction(), 1.0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_malformed_bundle_creates_no_job() {
        let (db, user_id, importer) = setup(&[]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.opml");
        std::fs::write(&path, "<opml><body><outline text=\"x\">").unwrap();

        let err = importer.run(&request(user_id, &path)).await.unwrap_err();
        assert!(matches!(err, ImportError::Opml(_)));
        assert!(db.get_jobs(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_starred_only_zip() {
        let (db, user_id, importer) = setup(&[]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("takeout.zip");
        write_zip(
            &path,
            &[(
                "Takeout/Reader/starred.json",
                r#"{"items": [
                    {"title": "One", "published": 100,
                     "alternate": [{"href": "https://x.example.com/1"}],
                     "origin": {"streamId": "feed/https://x.example.com/rss"}},
                    {"title": "Two", "published": 200,
                     "alternate": [{"href": "https://x.example.com/2"}],
                     "origin": {"streamId": "feed/https://x.example.com/rss"}}
                ]}"#,
            )],
        );

        let outcome = importer.run(&request(user_id, &path)).await.unwrap();
        assert_eq!(outcome.starred.succeeded, 2);

        let events = db.get_job_events(outcome.job_id).await.unwrap();
        assert_eq!(events[0].event_type, "feed_count");
        assert_eq!(events[0].message, "0");
        assert_eq!(events[1].event_type, "starred_article_count");
        assert_eq!(events[1].message, "2");

        // Unreachable feed stored as a placeholder, both articles starred
        let feed = db
            .get_feed_by_rss_url("https://x.example.com/rss")
            .await
            .unwrap()
            .unwrap();
        assert!(feed.last_fetched.is_none());
        let states = db.get_user_articles(user_id).await.unwrap();
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|s| s.is_starred()));
    }

    #[tokio::test]
    async fn test_invalid_starred_item_recorded_as_failure() {
        let (db, user_id, importer) = setup(&[]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        write_zip(
            &path,
            &[(
                "starred.json",
                r#"[{"title": "No origin"}, {"feed": {"rss_url": "https://y.example.com/rss"},
                    "article": {"title": "Fine"}}]"#,
            )],
        );

        let outcome = importer.run(&request(user_id, &path)).await.unwrap();
        assert_eq!(outcome.starred.succeeded, 1);
        assert_eq!(outcome.starred.failed, 1);
        assert_eq!(outcome.starred.failures[0].identity, "No origin");

        let progress = db.job_progress(outcome.job_id).await.unwrap();
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.failed, 1);
    }

    #[tokio::test]
    async fn test_remove_when_done() {
        let (_db, user_id, importer) = setup(&FEEDS).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions.opml");
        std::fs::write(&path, SCENARIO).unwrap();

        let mut req = request(user_id, &path);
        req.remove_when_done = true;
        importer.run(&req).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rejected_file_still_removed() {
        let (_db, user_id, importer) = setup(&[]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.opml");
        std::fs::write(&path, "not xml at all <<<").unwrap();

        let mut req = request(user_id, &path);
        req.remove_when_done = true;
        assert!(importer.run(&req).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_extracted_members_cleaned_up() {
        let (_db, user_id, importer) = setup(&FEEDS).await;
        let bundle_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let path = bundle_dir.path().join("takeout.zip");
        write_zip(&path, &[("Reader/subscriptions.xml", SCENARIO)]);

        let importer = importer.with_temp_dir(Some(scratch.path().to_path_buf()));
        importer.run(&request(user_id, &path)).await.unwrap();

        let leftovers = std::fs::read_dir(scratch.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
