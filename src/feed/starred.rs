//! Streaming reader for starred-item exports.
//!
//! Two document shapes are accepted: a Google Reader / Takeout export
//! (`{"items": [...]}`) or a bare JSON array. Each element is either a
//! Takeout item or an explicit `{"feed": {...}, "article": {...}}` pair.
//!
//! The document is parsed on a blocking thread and handed over one item at a
//! time through a channel of capacity 1, so only the item being imported is
//! held in memory.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Google Reader stream ids for feeds are `feed/<rss url>`.
const FEED_STREAM_PREFIX: &str = "feed/";

#[derive(Debug, Error)]
pub enum StarredError {
    #[error("Failed to read starred export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed starred export: {0}")]
    Json(#[from] serde_json::Error),
}

/// Feed side of a starred pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarredFeed {
    pub rss_url: String,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// Article side of a starred pair, as found in the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarredArticle {
    pub title: String,
    pub url: Option<String>,
    pub guid: Option<String>,
    pub creator: Option<String>,
    pub description: Option<String>,
    /// Unix seconds.
    pub published: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarredItem {
    pub feed: StarredFeed,
    pub article: StarredArticle,
}

/// An element of the export that could not be turned into a [`StarredItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidItem {
    /// Article title when present, otherwise the element's position.
    pub identity: String,
    pub reason: String,
}

/// One element of the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarredRecord {
    Item(StarredItem),
    Invalid(InvalidItem),
}

impl StarredRecord {
    /// Key under which the element's outcome is recorded.
    pub fn identity(&self) -> &str {
        match self {
            StarredRecord::Item(item) => &item.article.title,
            StarredRecord::Invalid(invalid) => &invalid.identity,
        }
    }
}

/// Lazy, single-pass sequence of starred records.
///
/// A syntax error in the document is yielded once as `Err` and ends the
/// sequence. Dropping the stream stops the parser thread at its next item.
pub struct StarredStream {
    rx: mpsc::Receiver<Result<StarredRecord, StarredError>>,
}

impl StarredStream {
    /// Open `path` and start parsing it in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(path: &Path) -> Result<Self, StarredError> {
        let file = File::open(path)?;
        let (tx, rx) = mpsc::channel(1);
        tokio::task::spawn_blocking(move || parse_into(BufReader::new(file), &tx));
        Ok(Self { rx })
    }

    pub async fn next(&mut self) -> Option<Result<StarredRecord, StarredError>> {
        self.rx.recv().await
    }
}

/// Count the elements of a starred export without keeping any of them.
///
/// Invalid elements count too: each one is reported as a failed item later.
pub async fn count_starred(path: &Path) -> Result<usize, StarredError> {
    let mut stream = StarredStream::open(path)?;
    let mut count = 0;
    while let Some(record) = stream.next().await {
        record?;
        count += 1;
    }
    Ok(count)
}

fn parse_into<R: Read>(reader: R, tx: &mpsc::Sender<Result<StarredRecord, StarredError>>) {
    let mut de = serde_json::Deserializer::from_reader(reader);
    let result = Document { tx }.deserialize(&mut de).and_then(|()| de.end());
    if let Err(e) = result {
        if !tx.is_closed() {
            let _ = tx.blocking_send(Err(StarredError::Json(e)));
        }
    }
}

// ============================================================================
// Streaming Visitors
// ============================================================================

type RecordSender = mpsc::Sender<Result<StarredRecord, StarredError>>;

/// Top level: `{"items": [...], ...}` or `[...]`.
struct Document<'a> {
    tx: &'a RecordSender,
}

impl<'de> DeserializeSeed<'de> for Document<'_> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Document<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object with an `items` array, or an array of starred items")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            if key == "items" {
                map.next_value_seed(Items { tx: self.tx })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<(), A::Error> {
        Items { tx: self.tx }.visit_seq(seq)
    }
}

struct Items<'a> {
    tx: &'a RecordSender,
}

impl<'de> DeserializeSeed<'de> for Items<'_> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for Items<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of starred items")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let mut position = 0usize;
        while let Some(value) = seq.next_element::<serde_json::Value>()? {
            position += 1;
            let record = record_from_value(value, position);
            if self.tx.blocking_send(Ok(record)).is_err() {
                return Err(de::Error::custom("starred stream closed by consumer"));
            }
        }
        Ok(())
    }
}

fn record_from_value(value: serde_json::Value, position: usize) -> StarredRecord {
    let identity = value
        .get("title")
        .or_else(|| value.get("article").and_then(|a| a.get("title")))
        .and_then(|t| t.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("item #{}", position));

    let converted = serde_json::from_value::<RawItem>(value)
        .map_err(|e| e.to_string())
        .and_then(RawItem::into_item);

    match converted {
        Ok(item) => StarredRecord::Item(item),
        Err(reason) => StarredRecord::Invalid(InvalidItem { identity, reason }),
    }
}

// ============================================================================
// Export Schema
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawItem {
    Pair(PairItem),
    Takeout(TakeoutItem),
}

#[derive(Debug, Deserialize)]
struct PairItem {
    feed: PairFeed,
    article: PairArticle,
}

#[derive(Debug, Deserialize)]
struct PairFeed {
    #[serde(alias = "rssUrl")]
    rss_url: String,
    url: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PairArticle {
    title: Option<String>,
    url: Option<String>,
    guid: Option<String>,
    creator: Option<String>,
    description: Option<String>,
    published: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
struct TakeoutItem {
    id: Option<String>,
    title: Option<String>,
    published: Option<Timestamp>,
    #[serde(default)]
    alternate: Vec<TakeoutLink>,
    author: Option<String>,
    summary: Option<TakeoutContent>,
    content: Option<TakeoutContent>,
    origin: Option<TakeoutOrigin>,
}

#[derive(Debug, Deserialize)]
struct TakeoutLink {
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TakeoutContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TakeoutOrigin {
    #[serde(rename = "streamId")]
    stream_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "htmlUrl")]
    html_url: Option<String>,
}

/// Unix seconds, integral or fractional, or an RFC 3339 string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Seconds(i64),
    Fractional(f64),
    Text(String),
}

impl Timestamp {
    fn seconds(&self) -> Option<i64> {
        match self {
            Timestamp::Seconds(secs) => Some(*secs),
            Timestamp::Fractional(secs) if secs.is_finite() => Some(secs.trunc() as i64),
            Timestamp::Fractional(_) => None,
            Timestamp::Text(text) => chrono::DateTime::parse_from_rfc3339(text.trim())
                .ok()
                .map(|dt| dt.timestamp()),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Article titles fall back to the URL, then to a fixed marker.
fn article_title(title: Option<String>, url: Option<&str>) -> String {
    non_blank(title)
        .or_else(|| url.map(str::to_owned))
        .unwrap_or_else(|| "(untitled)".to_string())
}

impl RawItem {
    fn into_item(self) -> Result<StarredItem, String> {
        match self {
            RawItem::Pair(pair) => pair.into_item(),
            RawItem::Takeout(item) => item.into_item(),
        }
    }
}

impl PairItem {
    fn into_item(self) -> Result<StarredItem, String> {
        let rss_url =
            non_blank(Some(self.feed.rss_url)).ok_or_else(|| "missing feed URL".to_string())?;
        let url = non_blank(self.article.url);
        Ok(StarredItem {
            feed: StarredFeed {
                rss_url,
                url: non_blank(self.feed.url),
                title: non_blank(self.feed.title),
            },
            article: StarredArticle {
                title: article_title(self.article.title, url.as_deref()),
                url,
                guid: non_blank(self.article.guid),
                creator: non_blank(self.article.creator),
                description: self.article.description,
                published: self.article.published.as_ref().and_then(Timestamp::seconds),
            },
        })
    }
}

impl TakeoutItem {
    fn into_item(self) -> Result<StarredItem, String> {
        let origin = self
            .origin
            .ok_or_else(|| "missing origin stream".to_string())?;
        let stream_id = non_blank(origin.stream_id).unwrap_or_default();
        let rss_url = stream_id
            .strip_prefix(FEED_STREAM_PREFIX)
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| format!("origin stream is not a feed: {:?}", stream_id))?
            .to_owned();

        let url = self.alternate.into_iter().find_map(|link| non_blank(link.href));
        let description = self
            .content
            .and_then(|c| c.content)
            .or_else(|| self.summary.and_then(|s| s.content));

        Ok(StarredItem {
            feed: StarredFeed {
                rss_url,
                url: non_blank(origin.html_url),
                title: non_blank(origin.title),
            },
            article: StarredArticle {
                title: article_title(self.title, url.as_deref()),
                url,
                guid: non_blank(self.id),
                creator: non_blank(self.author),
                description,
                published: self.published.as_ref().and_then(Timestamp::seconds),
            },
        })
    }
}
