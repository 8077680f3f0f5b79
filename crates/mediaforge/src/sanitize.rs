//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Source URLs may carry credentials or signed query strings; span fields
//! only ever see the redacted form.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use url::Url;

/// Keeps scheme, host and path. Drops userinfo, query and fragment.
///
/// - `https://user:pw@example.com/a?token=x` → `https://example.com/a`
/// - unparsable input → `<invalid-url>`
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("");
            match url.port() {
                Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
                None => format!("{}://{}{}", url.scheme(), host, url.path()),
            }
        }
        Err(_) => "<invalid-url>".to_string(),
    }
}

/// Short deterministic hash of a source key for log correlation.
pub fn hash_source(source: &str) -> String {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
