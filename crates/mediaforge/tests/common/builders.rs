//! Scripted fakes for the external services.
//!
//! Each fake pops responses from a queue and falls back to a fixed default
//! once the queue is empty, and counts how often it was called.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use mediaforge::config::Config;
use mediaforge::model::Segment;
use mediaforge::services::{
    ArticleFetcher, CaptionService, CaptionTrack, EnrichmentRequest, FetchedMedia,
    MediaFetchService, PageDocument, ServiceError, Services, SpeechToTextService,
    TextEnrichmentService, Transcription,
};

pub const ENRICHMENT_JSON: &str = r#"{
    "summary": "How to wire an agent into a CI pipeline.",
    "key_points": ["Install the CLI", "Configure the token", "Run the workflow"],
    "qa_pairs": [{"question": "What is needed?", "answer": "An API token."}],
    "topics": ["automation", "ci", "github actions"]
}"#;

/// A config tuned for fast tests: one retry attempt, millisecond delays.
pub fn fast_config(work_directory: &Path) -> Config {
    let mut config = Config::default();
    config.storage.work_directory = work_directory.to_string_lossy().to_string();
    config.workers.count = 2;
    config.workers.queue_capacity = 16;
    config.retry.max_attempts = 1;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 1;
    config
}

fn caption_track(text: &str) -> CaptionTrack {
    CaptionTrack {
        segments: vec![Segment {
            start: 0.0,
            end: 42.0,
            text: text.to_string(),
        }],
        full_text: text.to_string(),
        word_count: 0,
        language: Some("en".to_string()),
    }
}

pub struct FakeCaptions {
    script: Mutex<VecDeque<Result<CaptionTrack, ServiceError>>>,
    pub calls: AtomicUsize,
}

impl FakeCaptions {
    pub fn returning(text: &str) -> Self {
        Self::scripted(vec![Ok(caption_track(text))])
    }

    pub fn failing(error: ServiceError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    pub fn scripted(script: Vec<Result<CaptionTrack, ServiceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptionService for FakeCaptions {
    async fn fetch(&self, _video_id: &str) -> Result<CaptionTrack, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::NoCaptionsAvailable("script exhausted".into())))
    }
}

/// Writes `bytes` of fake audio into the destination directory.
pub struct FakeMedia {
    bytes: usize,
    /// Returned, in order, before any download succeeds.
    failures: Mutex<VecDeque<ServiceError>>,
    /// Returned on every call once `failures` is drained.
    error: Option<ServiceError>,
    gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
}

impl FakeMedia {
    pub fn audio(bytes: usize) -> Self {
        Self {
            bytes,
            failures: Mutex::new(VecDeque::new()),
            error: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            error: Some(error),
            ..Self::audio(0)
        }
    }

    /// Fails once with `error`, then serves 4 KiB of audio.
    pub fn failing_once(error: ServiceError) -> Self {
        Self {
            failures: Mutex::new(VecDeque::from([error])),
            ..Self::audio(4096)
        }
    }

    /// Blocks every download until the gate is notified.
    pub fn gated(bytes: usize, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::audio(bytes)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetchService for FakeMedia {
    async fn download(
        &self,
        _url: &str,
        dest_dir: &Path,
        _max_bytes: u64,
    ) -> Result<FetchedMedia, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let path = dest_dir.join("media.m4a");
        std::fs::write(&path, vec![0u8; self.bytes])
            .map_err(|e| ServiceError::Transient(e.to_string()))?;
        Ok(FetchedMedia {
            path,
            size_bytes: self.bytes as u64,
            content_type: Some("audio/mp4".to_string()),
        })
    }
}

pub struct FakeSpeech {
    text: String,
    pub calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn returning(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechToTextService for FakeSpeech {
    async fn transcribe(&self, path: &Path) -> Result<Transcription, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !path.exists() {
            return Err(ServiceError::InvalidMedia("media file missing".into()));
        }
        Ok(Transcription {
            full_text: self.text.clone(),
            segments: vec![],
            language: Some("en".to_string()),
            word_count: 0,
            duration_seconds: Some(300.0),
        })
    }
}

pub struct FakeEnrichment {
    response: Result<String, ServiceError>,
    pub calls: AtomicUsize,
}

impl FakeEnrichment {
    pub fn returning(raw: &str) -> Self {
        Self {
            response: Ok(raw.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            response: Err(error),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextEnrichmentService for FakeEnrichment {
    async fn enhance(&self, _request: &EnrichmentRequest) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

/// An HTML page described by selector → text pairs.
#[derive(Clone, Default)]
pub struct FakePage {
    selected: HashMap<String, String>,
    body: String,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: &str, text: &str) -> Self {
        self.selected.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }
}

impl PageDocument for FakePage {
    fn select_text(&self, selector: &str) -> Option<String> {
        self.selected.get(selector).cloned()
    }

    fn body_text(&self) -> String {
        self.body.clone()
    }
}

pub struct FakeArticles {
    page: Result<FakePage, ServiceError>,
    pub calls: AtomicUsize,
}

impl FakeArticles {
    pub fn serving(page: FakePage) -> Self {
        Self {
            page: Ok(page),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            page: Err(error),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ArticleFetcher for FakeArticles {
    async fn fetch(&self, _url: &str) -> Result<Box<dyn PageDocument>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.page
            .clone()
            .map(|page| Box::new(page) as Box<dyn PageDocument>)
    }
}

/// Builder for a [`Services`] bundle with typed handles kept for assertions.
pub struct FakeServices {
    pub captions: Arc<FakeCaptions>,
    pub media: Arc<FakeMedia>,
    pub speech: Arc<FakeSpeech>,
    pub enrichment: Arc<FakeEnrichment>,
    pub articles: Arc<FakeArticles>,
}

impl FakeServices {
    /// Everything succeeds: captions exist, media downloads, enrichment parses.
    pub fn healthy() -> Self {
        Self {
            captions: Arc::new(FakeCaptions::returning(
                "caption text about wiring an agent into continuous integration",
            )),
            media: Arc::new(FakeMedia::audio(4096)),
            speech: Arc::new(FakeSpeech::returning(
                "transcribed text about prompt templates for support agents",
            )),
            enrichment: Arc::new(FakeEnrichment::returning(ENRICHMENT_JSON)),
            articles: Arc::new(FakeArticles::serving(
                FakePage::new()
                    .with("h1", "Automating Releases")
                    .with("article", &"Release automation with agents. ".repeat(40))
                    .with_body("fallback body"),
            )),
        }
    }

    pub fn with_captions(mut self, captions: FakeCaptions) -> Self {
        self.captions = Arc::new(captions);
        self
    }

    pub fn with_media(mut self, media: FakeMedia) -> Self {
        self.media = Arc::new(media);
        self
    }

    pub fn with_enrichment(mut self, enrichment: FakeEnrichment) -> Self {
        self.enrichment = Arc::new(enrichment);
        self
    }

    pub fn with_articles(mut self, articles: FakeArticles) -> Self {
        self.articles = Arc::new(articles);
        self
    }

    pub fn services(&self) -> Services {
        Services {
            captions: self.captions.clone(),
            media: self.media.clone(),
            speech: self.speech.clone(),
            enrichment: self.enrichment.clone(),
            articles: self.articles.clone(),
        }
    }
}
