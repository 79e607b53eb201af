//! Small helpers shared by the parsers and the importer.
//!
//! - **URL validation**: SSRF guard applied before a feed is fetched
//! - **Text cleanup**: control-character stripping and abbreviation of
//!   untrusted names and titles

mod text;
mod url_validator;

pub use text::{abbreviate, clean_label, strip_control_chars};
pub use url_validator::{is_http_url, validate_url, HostPolicy, UrlValidationError};
