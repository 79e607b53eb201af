use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{ImportError, ImportOutcome, Importer};

/// One import to run: which user, which file, and whether to delete the file
/// once the import has ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub user_id: i64,
    pub path: PathBuf,
    pub remove_when_done: bool,
}

#[derive(Debug, Error)]
#[error("Import worker has shut down")]
pub struct QueueClosed(pub ImportRequest);

struct QueuedImport {
    request: ImportRequest,
    reply: oneshot::Sender<Result<ImportOutcome, ImportError>>,
}

/// Sending side of the import queue. Cheap to clone.
#[derive(Clone)]
pub struct ImportQueue {
    tx: mpsc::Sender<QueuedImport>,
}

impl ImportQueue {
    /// Queue a request. Waits only while the queue is full.
    pub async fn enqueue(&self, request: ImportRequest) -> Result<ImportTicket, QueueClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueuedImport { request, reply })
            .await
            .map_err(|e| QueueClosed(e.0.request))?;
        Ok(ImportTicket { rx })
    }
}

/// Handle on the result of a queued import.
pub struct ImportTicket {
    rx: oneshot::Receiver<Result<ImportOutcome, ImportError>>,
}

impl ImportTicket {
    pub async fn outcome(self) -> Result<ImportOutcome, ImportError> {
        self.rx.await.unwrap_or(Err(ImportError::WorkerStopped))
    }
}

/// Single background task that runs queued imports one after another.
pub struct ImportWorker;

impl ImportWorker {
    /// Start the worker. It exits once every [`ImportQueue`] clone is dropped
    /// and the queue is drained.
    pub fn spawn(importer: Importer, capacity: usize) -> (ImportQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<QueuedImport>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(queued) = rx.recv().await {
                tracing::info!(
                    user_id = queued.request.user_id,
                    path = %queued.request.path.display(),
                    "Starting import"
                );
                let result = importer.run(&queued.request).await;
                // The submitter may have stopped waiting
                let _ = queued.reply.send(result);
            }
            tracing::debug!("Import queue closed, worker exiting");
        });

        (ImportQueue { tx }, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::testing::FakeSynchronizer;
    use crate::storage::Database;
    use std::sync::Arc;

    const OPML: &str = r#"<opml version="2.0"><body>
        <outline text="Tech">
            <outline text="A" xmlUrl="https://a.example.com/rss"/>
        </outline>
    </body></opml>"#;

    #[tokio::test]
    async fn test_queued_imports_run_in_order() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("reader").await.unwrap();
        let sync = FakeSynchronizer::reachable(&db, &["https://a.example.com/rss"]);
        let importer = Importer::new(Arc::new(db.clone()), Arc::new(sync));
        let (queue, handle) = ImportWorker::spawn(importer, 4);

        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.opml");
        let bad = dir.path().join("bad.opml");
        std::fs::write(&good, OPML).unwrap();
        std::fs::write(&bad, "<html/>").unwrap();

        let first = queue
            .enqueue(ImportRequest {
                user_id: user.id,
                path: good.clone(),
                remove_when_done: false,
            })
            .await
            .unwrap();
        let second = queue
            .enqueue(ImportRequest {
                user_id: user.id,
                path: bad,
                remove_when_done: false,
            })
            .await
            .unwrap();
        let third = queue
            .enqueue(ImportRequest {
                user_id: user.id,
                path: good,
                remove_when_done: false,
            })
            .await
            .unwrap();

        let first = first.outcome().await.unwrap();
        assert!(second.outcome().await.is_err());
        let third = third.outcome().await.unwrap();
        assert!(third.job_id > first.job_id);

        drop(queue);
        handle.await.unwrap();

        assert_eq!(db.get_jobs(user.id).await.unwrap().len(), 2);
        assert_eq!(db.get_subscriptions(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown() {
        let db = Database::open(":memory:").await.unwrap();
        let sync = FakeSynchronizer::reachable(&db, &[]);
        let importer = Importer::new(Arc::new(db), Arc::new(sync));
        let (queue, handle) = ImportWorker::spawn(importer, 1);

        handle.abort();
        let _ = handle.await;

        let request = ImportRequest {
            user_id: 1,
            path: PathBuf::from("/tmp/never-read.opml"),
            remove_when_done: false,
        };
        let err = queue.enqueue(request.clone()).await.err().unwrap();
        assert_eq!(err.0, request);
    }
}
