use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents resource exhaustion from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Well-formed XML, but no `<opml>` element anywhere.
    #[error("Document is not an OPML file")]
    NotOpml,

    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// One `<outline>` element and its nested outlines.
///
/// Attribute values are kept exactly as decoded; an outline carrying an
/// `xmlUrl` attribute is a feed even when the value is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    pub text: Option<String>,
    pub title: Option<String>,
    pub xml_url: Option<String>,
    pub html_url: Option<String>,
    pub children: Vec<Outline>,
}

impl Outline {
    /// True for outlines that subscribe to a feed.
    pub fn is_feed(&self) -> bool {
        self.xml_url.is_some()
    }

    /// Display label: `text` if non-blank, else `title` if non-blank.
    pub fn label(&self) -> Option<&str> {
        non_blank(self.text.as_deref()).or_else(|| non_blank(self.title.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Read and parse an OPML file into its top-level outlines.
pub async fn parse_file(path: &Path) -> Result<Vec<Outline>, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_opml(&content)
}

/// Parse OPML content into the tree of outlines found in the document.
///
/// Outlines are built with an explicit stack: a `Start` pushes a node, the
/// matching `End` pops it and attaches it to its parent (or to the result when
/// no outline encloses it). Self-closing outlines attach directly.
pub fn parse_opml(content: &str) -> Result<Vec<Outline>, OpmlError> {
    // SEC-002: XXE protection. quick-xml (0.37) never parses <!ENTITY> declarations;
    // `decode_and_unescape_value()` only resolves the five XML builtins and
    // reports anything else as an error. Keep the pinned version.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut roots = Vec::new();
    let mut open: Vec<Outline> = Vec::new();
    let mut seen_opml = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                // SEC-003: Reject excessively nested OPMLs
                if open.len() >= MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                open.push(read_outline(&e, &reader)?);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                let outline = read_outline(&e, &reader)?;
                attach(&mut open, &mut roots, outline);
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                if let Some(done) = open.pop() {
                    attach(&mut open, &mut roots, done);
                }
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"opml" => {
                seen_opml = true;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !open.is_empty() {
        return Err(OpmlError::XmlParse("unclosed <outline> element".to_string()));
    }
    if !seen_opml {
        return Err(OpmlError::NotOpml);
    }
    Ok(roots)
}

fn attach(open: &mut [Outline], roots: &mut Vec<Outline>, outline: Outline) {
    match open.last_mut() {
        Some(parent) => parent.children.push(outline),
        None => roots.push(outline),
    }
}

fn read_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Outline, OpmlError> {
    let mut outline = Outline::default();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let slot = match attr.key.as_ref() {
            b"text" => &mut outline.text,
            b"title" => &mut outline.title,
            b"xmlUrl" | b"xmlurl" => &mut outline.xml_url,
            b"htmlUrl" | b"htmlurl" => &mut outline.html_url,
            _ => continue,
        };
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| OpmlError::XmlParse(e.to_string()))?;
        *slot = Some(value.trim().to_string());
    }

    Ok(outline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed(text: &str, url: &str) -> Outline {
        Outline {
            text: Some(text.to_string()),
            xml_url: Some(url.to_string()),
            ..Outline::default()
        }
    }

    #[test]
    fn test_parse_nested_tree() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Test Feeds</title></head>
  <body>
    <outline text="Blogs" title="Blogs">
      <outline type="rss" text="Example Blog" xmlUrl="https://example.com/feed.xml" htmlUrl="https://example.com"/>
      <outline type="rss" text="No HTML" xmlUrl="https://nohtml.com/rss"/>
    </outline>
    <outline text="Loose" xmlUrl="https://loose.example.com/rss"/>
  </body>
</opml>"#;

        let outlines = parse_opml(content).unwrap();
        assert_eq!(outlines.len(), 2);

        let blogs = &outlines[0];
        assert!(!blogs.is_feed());
        assert_eq!(blogs.label(), Some("Blogs"));
        assert_eq!(blogs.children.len(), 2);
        assert_eq!(
            blogs.children[0].html_url.as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            blogs.children[1],
            feed("No HTML", "https://nohtml.com/rss")
        );

        assert_eq!(outlines[1], feed("Loose", "https://loose.example.com/rss"));
    }

    #[test]
    fn test_label_prefers_text_then_title() {
        let both = Outline {
            text: Some("Text".into()),
            title: Some("Title".into()),
            ..Outline::default()
        };
        let blank_text = Outline {
            text: Some("  ".into()),
            title: Some("Title".into()),
            ..Outline::default()
        };
        assert_eq!(both.label(), Some("Text"));
        assert_eq!(blank_text.label(), Some("Title"));
        assert_eq!(Outline::default().label(), None);
    }

    #[test]
    fn test_empty_xml_url_is_still_a_feed() {
        let content = r#"<opml version="2.0"><body><outline text="Broken" xmlUrl=""/></body></opml>"#;
        let outlines = parse_opml(content).unwrap();
        assert!(outlines[0].is_feed());
        assert_eq!(outlines[0].xml_url.as_deref(), Some(""));
    }

    #[test]
    fn test_attribute_entities_decoded() {
        let content = r#"<opml version="2.0"><body>
            <outline text="A &amp; B" xmlUrl="https://example.com/feed?a=1&amp;b=2"/>
        </body></opml>"#;
        let outlines = parse_opml(content).unwrap();
        assert_eq!(outlines[0].label(), Some("A & B"));
        assert_eq!(
            outlines[0].xml_url.as_deref(),
            Some("https://example.com/feed?a=1&b=2")
        );
    }

    #[test]
    fn test_empty_body() {
        let outlines = parse_opml(r#"<?xml version="1.0"?><opml version="2.0"><body></body></opml>"#)
            .unwrap();
        assert!(outlines.is_empty());
    }

    #[test]
    fn test_malformed_xml_error() {
        assert!(matches!(
            parse_opml("<not valid xml"),
            Err(OpmlError::XmlParse(_))
        ));
    }

    #[test]
    fn test_non_opml_document_rejected() {
        assert!(matches!(
            parse_opml("{\"items\": []}"),
            Err(OpmlError::NotOpml)
        ));
        assert!(matches!(
            parse_opml("<rss><channel></channel></rss>"),
            Err(OpmlError::NotOpml)
        ));
    }

    #[test]
    fn test_xxe_entity_not_expanded() {
        // SEC-002: must either fail or keep the literal reference
        let malicious = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<opml version="2.0">
    <body>
        <outline text="&xxe;" xmlUrl="https://example.com/feed.xml"/>
    </body>
</opml>"#;

        if let Ok(outlines) = parse_opml(malicious) {
            for outline in &outlines {
                let text = outline.text.as_deref().unwrap_or_default();
                assert!(!text.contains("root:"), "XXE expansion detected");
            }
        }
    }

    #[test]
    fn test_deeply_nested_opml_rejected() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..100 {
            opml.push_str(r#"<outline text="level">"#);
        }
        for _ in 0..100 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let err = parse_opml(&opml).unwrap_err();
        assert!(matches!(err, OpmlError::MaxDepthExceeded(50)));
    }

    #[test]
    fn test_nesting_at_depth_limit_allowed() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..50 {
            opml.push_str(r#"<outline text="level">"#);
        }
        opml.push_str(r#"<outline text="Deep Feed" xmlUrl="https://deep.example.com/feed"/>"#);
        for _ in 0..50 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let outlines = parse_opml(&opml).unwrap();
        let mut node = &outlines[0];
        while let Some(child) = node.children.first() {
            node = child;
        }
        assert_eq!(node.label(), Some("Deep Feed"));
    }

    #[tokio::test]
    async fn test_parse_file_missing() {
        let result = parse_file(Path::new("/nonexistent/subscriptions.xml")).await;
        assert!(matches!(result, Err(OpmlError::Io(_))));
    }
}
