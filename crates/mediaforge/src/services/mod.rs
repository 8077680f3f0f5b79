//! Contracts for the external services the pipeline depends on.
//!
//! The pipeline only ever sees these traits; concrete clients are passed
//! in through [`Services`] so tests can substitute scripted doubles.

pub mod html;
pub mod http;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Segment, Tier};

pub use html::HtmlDocument;
pub use http::{HttpArticleFetcher, HttpMediaFetcher};

/// Typed failures shared by every external service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("no captions available: {0}")]
    NoCaptionsAvailable(String),

    #[error("captions disabled: {0}")]
    CaptionsDisabled(String),

    #[error("blocked by source: {0}")]
    Blocked(String),

    #[error("content unavailable: {0}")]
    Unavailable(String),

    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("invalid media: {0}")]
    InvalidMedia(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Only transient failures are worth repeating within one attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

/// Platform-native captions for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub segments: Vec<Segment>,
    pub full_text: String,
    pub word_count: usize,
    pub language: Option<String>,
}

/// Raw media written to local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub full_text: String,
    pub segments: Vec<Segment>,
    pub language: Option<String>,
    pub word_count: usize,
    pub duration_seconds: Option<f64>,
}

/// Input to the generative enrichment service.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRequest {
    /// Already truncated to the configured input budget.
    pub text: String,
    pub tier: Tier,
    pub max_key_points: usize,
    pub max_qa_pairs: usize,
    pub max_topics: usize,
}

#[async_trait]
pub trait CaptionService: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<CaptionTrack, ServiceError>;
}

#[async_trait]
pub trait MediaFetchService: Send + Sync {
    /// Downloads `url` into `dest_dir`, aborting once more than
    /// `max_bytes` have been received.
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        max_bytes: u64,
    ) -> Result<FetchedMedia, ServiceError>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<Transcription, ServiceError>;
}

#[async_trait]
pub trait TextEnrichmentService: Send + Sync {
    /// Returns the raw model output; parsing happens in the enrichment stage.
    async fn enhance(&self, request: &EnrichmentRequest) -> Result<String, ServiceError>;

    /// Model identifier recorded on successful results.
    fn model_name(&self) -> &str;
}

/// A fetched HTML page that can be queried with simple CSS selectors.
pub trait PageDocument: Send + Sync {
    /// Text of the first element matching `selector`, whitespace collapsed.
    fn select_text(&self, selector: &str) -> Option<String>;

    /// Text of the whole `<body>`.
    fn body_text(&self) -> String;
}

#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Box<dyn PageDocument>, ServiceError>;
}

/// Every external collaborator the pipeline needs.
#[derive(Clone)]
pub struct Services {
    pub captions: Arc<dyn CaptionService>,
    pub media: Arc<dyn MediaFetchService>,
    pub speech: Arc<dyn SpeechToTextService>,
    pub enrichment: Arc<dyn TextEnrichmentService>,
    pub articles: Arc<dyn ArticleFetcher>,
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
