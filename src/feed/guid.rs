use sha2::{Digest, Sha256};

use crate::util::is_http_url;

/// Longest guid stored as-is; longer identifiers are replaced.
pub const MAX_GUID_LEN: usize = 250;

fn usable(candidate: Option<&str>) -> Option<&str> {
    candidate.map(str::trim).filter(|c| {
        !c.is_empty() && c.chars().count() <= MAX_GUID_LEN && !c.chars().any(char::is_control)
    })
}

/// Produce a storable guid for an article.
///
/// The feed's own identifier wins when it is usable (non-blank, at most
/// [`MAX_GUID_LEN`] characters, no control characters). Otherwise the article
/// URL is used if it is a usable http(s) URL, and as a last resort the hex
/// SHA-256 of `url|title|published`.
pub fn repair_guid(
    existing: Option<&str>,
    url: Option<&str>,
    title: &str,
    published: Option<i64>,
) -> String {
    if let Some(guid) = usable(existing) {
        return guid.to_string();
    }
    if let Some(link) = usable(url).filter(|u| is_http_url(u)) {
        return link.to_string();
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}
