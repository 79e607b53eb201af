//! Import of subscription lists (OPML) and starred-article exports into a
//! multi-user feed reader database.
//!
//! Imports are queued on an [`import::ImportQueue`] and run one at a time by
//! a background [`import::ImportWorker`]. Progress is recorded as a job log in
//! storage and can be read back with [`storage::Database::job_progress`].

pub mod archive;
pub mod config;
pub mod feed;
pub mod import;
pub mod storage;
pub mod util;
