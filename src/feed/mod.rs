//! Readers for the documents found in an import bundle, and the feed
//! synchronizer the importer calls for every new feed.
//!
//! - [`opml`] parses subscription lists into an outline tree
//! - [`flatten`] groups the tree's feed outlines by category label
//! - [`starred`] streams starred items out of a JSON export
//! - [`sync`] fetches, parses and stores feeds over HTTP
//! - [`guid`] makes article identifiers storable

pub mod fetcher;
pub mod flatten;
pub mod guid;
pub mod opml;
pub mod parser;
pub mod starred;
pub mod sync;

pub use fetcher::{FetchError, FetchPolicy};
pub use flatten::{flatten, FlatOutlines, OutlineGroup};
pub use guid::repair_guid;
pub use opml::{parse_file, parse_opml, OpmlError, Outline};
pub use starred::{
    count_starred, InvalidItem, StarredArticle, StarredError, StarredFeed, StarredItem,
    StarredRecord, StarredStream,
};
pub use sync::{FeedSynchronizer, HttpFeedSynchronizer, SyncError, SyncSettings};
