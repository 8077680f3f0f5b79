use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, Instrument};

use crate::model::{Extraction, JobStatus};
use crate::resolver::{detect_platform, Platform};
use crate::services::{count_words, CaptionService};

use super::backoff::{retry_transient, RetryPolicy};
use super::{AttemptContext, ExtractionStrategy, FailureKind, StrategyFailure, StrategyId};

/// Reads platform-native captions by video id.
pub struct CaptionApiStrategy {
    captions: Arc<dyn CaptionService>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl CaptionApiStrategy {
    pub fn new(captions: Arc<dyn CaptionService>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            captions,
            policy,
            timeout,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for CaptionApiStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::CaptionApi
    }

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<Extraction, StrategyFailure> {
        let id = self.id();
        let Platform::YouTube { video_id } = detect_platform(&ctx.job.submitted_url) else {
            return Err(StrategyFailure::new(
                id,
                FailureKind::Unsupported,
                "URL carries no caption-capable video id",
            ));
        };

        ctx.stages
            .enter(JobStatus::Transcribing)
            .map_err(|e| StrategyFailure::from_stage(id, e))?;

        let track = retry_transient(&self.policy, self.timeout, "caption fetch", || {
            self.captions.fetch(&video_id)
        })
        .instrument(tracing::info_span!("caption_fetch", video_id = %video_id))
        .await
        .map_err(|e| StrategyFailure::from_service(id, &e))?;

        let text = track.full_text.trim().to_string();
        if text.is_empty() {
            return Err(StrategyFailure::new(
                id,
                FailureKind::NoCaptionsAvailable,
                "caption track is empty",
            ));
        }

        let word_count = if track.word_count > 0 {
            track.word_count
        } else {
            count_words(&text)
        };
        let duration_seconds = track.segments.last().map(|s| s.end);

        debug!(segments = track.segments.len(), word_count, "Captions fetched");

        Ok(Extraction {
            text,
            segments: track.segments,
            word_count,
            duration_seconds,
            method: id,
            language: track.language,
            title: None,
            author: None,
            reading_time_minutes: None,
        })
    }
}
