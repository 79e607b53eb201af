use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database
    #[error("The database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Job Types
// ============================================================================

/// Kind of long-running job recorded in the `jobs` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    Import,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Import => "import",
        }
    }
}

/// Type tag of an appended job event.
///
/// The two count variants are written once, right after the job is created,
/// and carry the pass-1 totals in their message. Every other variant records
/// the outcome of one imported item, keyed by the item's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEventType {
    FeedCount,
    StarredArticleCount,
    FeedImportSuccess,
    FeedImportFailure,
    StarredArticleImportSuccess,
    StarredArticleImportFailure,
}

impl JobEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventType::FeedCount => "feed_count",
            JobEventType::StarredArticleCount => "starred_article_count",
            JobEventType::FeedImportSuccess => "feed_import_success",
            JobEventType::FeedImportFailure => "feed_import_failure",
            JobEventType::StarredArticleImportSuccess => "starred_article_import_success",
            JobEventType::StarredArticleImportFailure => "starred_article_import_failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "feed_count" => Some(JobEventType::FeedCount),
            "starred_article_count" => Some(JobEventType::StarredArticleCount),
            "feed_import_success" => Some(JobEventType::FeedImportSuccess),
            "feed_import_failure" => Some(JobEventType::FeedImportFailure),
            "starred_article_import_success" => Some(JobEventType::StarredArticleImportSuccess),
            "starred_article_import_failure" => Some(JobEventType::StarredArticleImportFailure),
            _ => None,
        }
    }

    /// True for the pass-1 summary events.
    pub fn is_summary(&self) -> bool {
        matches!(
            self,
            JobEventType::FeedCount | JobEventType::StarredArticleCount
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobEventType::FeedImportFailure | JobEventType::StarredArticleImportFailure
        )
    }
}

// ============================================================================
// Insert Payloads
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub url: String,
    pub rss_url: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: i64,
    pub feed_id: i64,
    pub category_id: i64,
    pub sort_order: i64,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub feed_id: i64,
    pub url: Option<String>,
    pub guid: String,
    pub title: String,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub published: Option<i64>,
}

/// Represents a parsed article from a feed
#[derive(Debug, Clone)]
pub struct ParsedArticle {
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub creator: Option<String>,
    pub published: Option<i64>,
    pub summary: Option<String>,
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: i64,
}

/// Category row. The root category of a user has neither parent nor name.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub name: Option<String>,
    pub sort_order: i64,
    pub folded: bool,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Feed shared by every subscriber, keyed by its `rss_url`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub rss_url: String,
    pub title: String,
    pub description: Option<String>,
    pub last_fetched: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedSubscription {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub category_id: i64,
    pub sort_order: i64,
    pub unread_count: i64,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub url: Option<String>,
    pub guid: String,
    pub title: String,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub published: Option<i64>,
    pub deleted_at: Option<i64>,
}

/// One user's read/star state on one article.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserArticle {
    pub id: i64,
    pub user_id: i64,
    pub article_id: i64,
    pub read_date: Option<i64>,
    pub starred_date: Option<i64>,
}

impl UserArticle {
    pub fn is_starred(&self) -> bool {
        self.starred_date.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub user_id: i64,
    pub job_type: String,
    pub start_date: i64,
    pub end_date: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct JobEvent {
    pub id: i64,
    pub job_id: i64,
    pub event_type: String,
    pub message: String,
    pub created_at: i64,
}

impl JobEvent {
    pub fn kind(&self) -> Option<JobEventType> {
        JobEventType::parse(&self.event_type)
    }
}

/// Progress of one import job, derived from its event log.
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub job_id: i64,
    pub feed_count: u64,
    pub starred_count: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub finished: bool,
}

impl JobProgress {
    /// Total number of items announced by the pass-1 summary events.
    pub fn total(&self) -> u64 {
        self.feed_count + self.starred_count
    }

    /// Fraction of announced items already processed, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        (self.processed as f64 / total as f64).min(1.0)
    }
}
