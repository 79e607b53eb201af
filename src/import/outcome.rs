use crate::storage::JobEventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Feed,
    StarredArticle,
}

/// Result of importing one unit of work.
///
/// `identity` is the feed URL for feeds and the article title for starred
/// articles; it becomes the message of the item's job event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub kind: ItemKind,
    pub identity: String,
    pub result: Result<(), String>,
}

impl ItemOutcome {
    pub fn success(kind: ItemKind, identity: impl Into<String>) -> Self {
        Self {
            kind,
            identity: identity.into(),
            result: Ok(()),
        }
    }

    pub fn failure(kind: ItemKind, identity: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            kind,
            identity: identity.into(),
            result: Err(reason.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn event_type(&self) -> JobEventType {
        match (self.kind, self.is_success()) {
            (ItemKind::Feed, true) => JobEventType::FeedImportSuccess,
            (ItemKind::Feed, false) => JobEventType::FeedImportFailure,
            (ItemKind::StarredArticle, true) => JobEventType::StarredArticleImportSuccess,
            (ItemKind::StarredArticle, false) => JobEventType::StarredArticleImportFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub identity: String,
    pub reason: String,
}

/// Aggregate of the outcomes of one item kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn add(&mut self, outcome: &ItemOutcome) {
        match &outcome.result {
            Ok(()) => self.succeeded += 1,
            Err(reason) => {
                self.failed += 1;
                self.failures.push(ItemFailure {
                    identity: outcome.identity.clone(),
                    reason: reason.clone(),
                });
            }
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Summary of a finished import job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub job_id: i64,
    pub feeds: BatchOutcome,
    pub starred: BatchOutcome,
    /// Set when reading the bundle failed part way through pass 2.
    pub aborted: Option<String>,
}

impl ImportOutcome {
    pub fn failed(&self) -> usize {
        self.feeds.failed + self.starred.failed
    }
}
