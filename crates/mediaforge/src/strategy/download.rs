use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::{debug, info_span, Instrument};

use crate::config::{LimitsConfig, TimeoutsConfig};
use crate::model::{Extraction, JobStatus};
use crate::sanitize;
use crate::services::{count_words, MediaFetchService, SpeechToTextService};

use super::backoff::{retry_transient, RetryPolicy};
use super::{AttemptContext, ExtractionStrategy, FailureKind, StrategyFailure, StrategyId};

const ACCEPTED_EXTENSIONS: &[&str] = &["m4a", "webm", "mp3", "mp4", "wav", "ogg"];
const HTML_EXTENSIONS: &[&str] = &["html", "htm", "mhtml"];
const SNIFF_BYTES: usize = 512;

/// Downloads raw media into a per-attempt scratch directory and sends it
/// to speech-to-text.
pub struct DownloadTranscribeStrategy {
    media: Arc<dyn MediaFetchService>,
    speech: Arc<dyn SpeechToTextService>,
    policy: RetryPolicy,
    download_timeout: Duration,
    transcribe_timeout: Duration,
    max_media_bytes: u64,
    min_media_bytes: u64,
}

impl DownloadTranscribeStrategy {
    pub fn new(
        media: Arc<dyn MediaFetchService>,
        speech: Arc<dyn SpeechToTextService>,
        policy: RetryPolicy,
        timeouts: &TimeoutsConfig,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            media,
            speech,
            policy,
            download_timeout: timeouts.download(),
            transcribe_timeout: timeouts.transcribe(),
            max_media_bytes: limits.max_media_bytes,
            min_media_bytes: limits.min_media_bytes,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for DownloadTranscribeStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::DownloadTranscribe
    }

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<Extraction, StrategyFailure> {
        let id = self.id();
        let job = ctx.job;

        ctx.stages
            .enter(JobStatus::Downloading)
            .map_err(|e| StrategyFailure::from_stage(id, e))?;

        // Removed on every exit path when `scope` drops.
        let scope = ctx
            .work_area
            .job_scope(&job.id, job.retry_count)
            .map_err(|e| StrategyFailure::new(id, FailureKind::ExtractionFailed, e.to_string()))?;

        let media = retry_transient(&self.policy, self.download_timeout, "media download", || {
            self.media
                .download(&job.submitted_url, scope.path(), self.max_media_bytes)
        })
        .instrument(info_span!(
            "media_download",
            url = %sanitize::redact_url(&job.submitted_url)
        ))
        .await
        .map_err(|e| StrategyFailure::from_service(id, &e))?;

        let size = tokio::fs::metadata(&media.path)
            .await
            .map(|m| m.len())
            .unwrap_or(media.size_bytes);
        validate_media(&media.path, size, self.min_media_bytes, self.max_media_bytes).await?;

        ctx.stages
            .media_ready(&media.path)
            .map_err(|e| StrategyFailure::from_stage(id, e))?;
        ctx.stages
            .enter(JobStatus::Transcribing)
            .map_err(|e| StrategyFailure::from_stage(id, e))?;

        let transcription = retry_transient(&self.policy, self.transcribe_timeout, "transcription", || {
            self.speech.transcribe(&media.path)
        })
        .instrument(info_span!("transcribe", bytes = size))
        .await
        .map_err(|e| StrategyFailure::new(id, FailureKind::TranscriptionFailed, e.to_string()))?;

        let text = transcription.full_text.trim().to_string();
        if text.is_empty() {
            return Err(StrategyFailure::new(
                id,
                FailureKind::TranscriptionFailed,
                "speech-to-text returned no text",
            ));
        }

        let word_count = if transcription.word_count > 0 {
            transcription.word_count
        } else {
            count_words(&text)
        };
        let duration_seconds = transcription
            .duration_seconds
            .or_else(|| transcription.segments.last().map(|s| s.end));

        debug!(bytes = size, word_count, "Media transcribed");
        drop(scope);

        Ok(Extraction {
            text,
            segments: transcription.segments,
            word_count,
            duration_seconds,
            method: id,
            language: transcription.language,
            title: None,
            author: None,
            reading_time_minutes: None,
        })
    }
}

/// Rejects anti-bot HTML pages posing as media, empty or truncated files,
/// oversized payloads and formats speech-to-text cannot take.
pub async fn validate_media(
    path: &Path,
    size: u64,
    min_bytes: u64,
    max_bytes: u64,
) -> Result<(), StrategyFailure> {
    let id = StrategyId::DownloadTranscribe;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if HTML_EXTENSIONS.contains(&extension.as_str()) || looks_like_html(path).await {
        return Err(StrategyFailure::new(
            id,
            FailureKind::Blocked,
            "source returned an HTML page instead of media",
        ));
    }
    if size > max_bytes {
        return Err(StrategyFailure::new(
            id,
            FailureKind::PayloadTooLarge,
            format!("{} bytes exceeds limit of {} bytes", size, max_bytes),
        ));
    }
    if size < min_bytes {
        return Err(StrategyFailure::new(
            id,
            FailureKind::InvalidMedia,
            format!("file too small ({} bytes), likely incomplete", size),
        ));
    }
    if !extension.is_empty()
        && extension != "bin"
        && !ACCEPTED_EXTENSIONS.contains(&extension.as_str())
    {
        return Err(StrategyFailure::new(
            id,
            FailureKind::InvalidMedia,
            format!("unsupported media format .{}", extension),
        ));
    }
    Ok(())
}

async fn looks_like_html(path: &Path) -> bool {
    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut head = vec![0u8; SNIFF_BYTES];
    let Ok(read) = file.read(&mut head).await else {
        return false;
    };
    let head = String::from_utf8_lossy(&head[..read]).to_ascii_lowercase();
    head.trim_start().starts_with("<!doctype html") || head.contains("<html")
}
