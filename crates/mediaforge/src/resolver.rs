//! Acquisition strategy resolution and submission-time URL handling.
//!
//! Everything here is a pure function of its input: the same URL always
//! yields the same platform, the same strategy order and the same
//! canonical source key.

use std::sync::LazyLock;

use regex::Regex;
use url::{form_urlencoded, Url};

use crate::error::ValidationError;
use crate::model::ContentKind;
use crate::strategy::StrategyId;

static YOUTUBE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:https?://)?(?:www\.|m\.)?youtube\.com/watch\?(?:[^#]*?&)?v=([^&\n?#]+)",
        r"(?:https?://)?(?:www\.|m\.)?youtube\.com/embed/([^&\n?#/]+)",
        r"(?:https?://)?(?:www\.|m\.)?youtube\.com/v/([^&\n?#/]+)",
        r"(?:https?://)?(?:www\.)?youtu\.be/([^&\n?#/]+)",
        r"(?:https?://)?(?:www\.|m\.)?youtube\.com/shorts/([^&\n?#/]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static RUMBLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:https?://)?(?:www\.)?rumble\.com/embed/v([^/\n?#]+?)(?:\.html)?(?:[/?#]|$)",
        r"(?:https?://)?(?:www\.)?rumble\.com/v([^/\n?#]+?)(?:\.html)?(?:[/?#]|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static YOUTUBE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

/// Video platform recognised from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    YouTube { video_id: String },
    Rumble { video_id: String },
    Unknown,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Platform::YouTube { .. } => "youtube",
            Platform::Rumble { .. } => "rumble",
            Platform::Unknown => "unknown",
        }
    }
}

/// Identifies the platform of a video URL. Never fails; anything that
/// does not carry a recognisable id is `Unknown`.
pub fn detect_platform(url: &str) -> Platform {
    let url = url.trim();

    for pattern in YOUTUBE_PATTERNS.iter() {
        if let Some(id) = pattern.captures(url).and_then(|c| c.get(1)) {
            if YOUTUBE_ID.is_match(id.as_str()) {
                return Platform::YouTube {
                    video_id: id.as_str().to_string(),
                };
            }
        }
    }

    for pattern in RUMBLE_PATTERNS.iter() {
        if let Some(id) = pattern.captures(url).and_then(|c| c.get(1)) {
            if id.as_str().len() > 2 {
                return Platform::Rumble {
                    video_id: id.as_str().to_string(),
                };
            }
        }
    }

    Platform::Unknown
}

/// Ordered extraction strategies for a source.
pub fn resolve(kind: ContentKind, url: &str) -> Vec<StrategyId> {
    match kind {
        ContentKind::Article => vec![StrategyId::ArticleScrape],
        ContentKind::Video => match detect_platform(url) {
            Platform::YouTube { .. } => {
                vec![StrategyId::CaptionApi, StrategyId::DownloadTranscribe]
            }
            Platform::Rumble { .. } | Platform::Unknown => vec![StrategyId::DownloadTranscribe],
        },
    }
}

/// Canonical identity of a source, used as the deduplication key for jobs
/// and catalog entries.
pub fn canonical_source(kind: ContentKind, url: &str) -> String {
    let trimmed = url.trim();

    if kind == ContentKind::Video {
        if let Platform::YouTube { video_id } = detect_platform(trimmed) {
            return format!("https://www.youtube.com/watch?v={}", video_id);
        }
    }

    let Ok(parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    let host = parsed.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);

    let mut canonical = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        canonical.push_str(&format!(":{}", port));
    }
    canonical.push_str(parsed.path().trim_end_matches('/'));

    // Pairs come back decoded; re-encode so `%26` never turns into a separator.
    let mut query = form_urlencoded::Serializer::new(String::new());
    let mut kept = 0;
    for (key, value) in parsed.query_pairs() {
        if key.to_ascii_lowercase().starts_with("utm_") {
            continue;
        }
        if value.is_empty() {
            query.append_key_only(&key);
        } else {
            query.append_pair(&key, &value);
        }
        kept += 1;
    }
    if kept > 0 {
        canonical.push('?');
        canonical.push_str(&query.finish());
    }

    canonical
}

/// Accepts only absolute http(s) URLs with a host.
pub fn validate_source_url(raw: &str) -> Result<Url, ValidationError> {
    let raw = raw.trim();
    let invalid = |reason: &str| ValidationError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.is_empty() {
        return Err(invalid("URL is empty"));
    }

    let parsed = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("only http and https URLs are supported"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("URL has no host"));
    }

    Ok(parsed)
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL.is_match(email.trim()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}
