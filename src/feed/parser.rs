use anyhow::Result;
use feed_rs::parser;

use super::guid::repair_guid;
use crate::storage::ParsedArticle;

/// Channel-level data plus entries of a fetched RSS/Atom document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    /// Website link of the feed, when it declares one.
    pub link: Option<String>,
    pub description: Option<String>,
    pub articles: Vec<ParsedArticle>,
}

pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::parse(bytes)?;

    let articles = feed
        .entries
        .into_iter()
        .map(|entry| {
            let url = entry.links.first().map(|l| l.href.clone());
            let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());
            let creator = entry.authors.into_iter().map(|p| p.name).find(|n| !n.trim().is_empty());

            let guid = repair_guid(Some(&entry.id), url.as_deref(), &title, published);

            ParsedArticle {
                guid,
                title,
                url,
                creator,
                published,
                summary,
            }
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content).filter(|t| !t.trim().is_empty()),
        link: feed.links.into_iter().map(|l| l.href).next(),
        description: feed.description.map(|d| d.content),
        articles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://blog.example.com/</link>
    <description>Posts about things</description>
    <item>
      <title>First</title>
      <link>https://blog.example.com/first</link>
      <guid>first-guid</guid>
      <author>alice@example.com (Alice)</author>
      <pubDate>Tue, 02 Jan 2024 03:04:05 GMT</pubDate>
      <description>Hello</description>
    </item>
    <item>
      <title>Second</title>
      <link>https://blog.example.com/second</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_channel_and_items() {
        let parsed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Example Blog"));
        assert_eq!(parsed.link.as_deref(), Some("https://blog.example.com/"));
        assert_eq!(parsed.description.as_deref(), Some("Posts about things"));
        assert_eq!(parsed.articles.len(), 2);

        let first = &parsed.articles[0];
        assert_eq!(first.guid, "first-guid");
        assert_eq!(first.title, "First");
        assert_eq!(first.url.as_deref(), Some("https://blog.example.com/first"));
        assert_eq!(first.published, Some(1_704_164_645));
        assert_eq!(first.summary.as_deref(), Some("Hello"));
        assert!(first.creator.is_some());
    }

    #[test]
    fn test_entries_always_get_a_guid() {
        let parsed = parse_feed(RSS.as_bytes()).unwrap();
        assert!(parsed.articles.iter().all(|a| !a.guid.is_empty()));
    }

    #[test]
    fn test_parse_atom() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:uuid:feed</id>
  <updated>2024-01-02T03:04:05Z</updated>
  <entry>
    <title>Entry</title>
    <id>urn:uuid:entry-1</id>
    <link href="https://atom.example.com/entry"/>
    <updated>2024-01-02T03:04:05Z</updated>
    <author><name>Bob</name></author>
  </entry>
</feed>"#;

        let parsed = parse_feed(atom.as_bytes()).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Atom Feed"));
        assert_eq!(parsed.articles.len(), 1);
        assert_eq!(parsed.articles[0].guid, "urn:uuid:entry-1");
        assert_eq!(parsed.articles[0].creator.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_feed(b"this is not a feed").is_err());
    }
}
