//! Extraction strategies and the fallback chain that runs them.

pub mod article;
pub mod backoff;
pub mod caption;
pub mod download;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::{Extraction, Job, JobStatus};
use crate::services::{ServiceError, Services};
use crate::storage::WorkArea;

pub use article::ArticleScrapeStrategy;
pub use backoff::RetryPolicy;
pub use caption::CaptionApiStrategy;
pub use download::DownloadTranscribeStrategy;

/// Identifier of an extraction method; also recorded as `Extraction::method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    CaptionApi,
    DownloadTranscribe,
    ArticleScrape,
}

impl StrategyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::CaptionApi => "caption_api",
            StrategyId::DownloadTranscribe => "download_transcribe",
            StrategyId::ArticleScrape => "article_scrape",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoCaptionsAvailable,
    CaptionsDisabled,
    TransientError,
    Blocked,
    Unavailable,
    PayloadTooLarge,
    TranscriptionFailed,
    InvalidMedia,
    Unsupported,
    ExtractionFailed,
    /// The job was reset or deleted while this attempt was running.
    Interrupted,
}

impl FailureKind {
    /// Whether the next strategy in the chain should be tried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::TransientError
                | FailureKind::TranscriptionFailed
                | FailureKind::InvalidMedia
                | FailureKind::Unsupported
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NoCaptionsAvailable => "no captions available",
            FailureKind::CaptionsDisabled => "captions disabled",
            FailureKind::TransientError => "transient error",
            FailureKind::Blocked => "blocked",
            FailureKind::Unavailable => "unavailable",
            FailureKind::PayloadTooLarge => "payload too large",
            FailureKind::TranscriptionFailed => "transcription failed",
            FailureKind::InvalidMedia => "invalid media",
            FailureKind::Unsupported => "unsupported",
            FailureKind::ExtractionFailed => "extraction failed",
            FailureKind::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{strategy}: {kind}: {detail}")]
pub struct StrategyFailure {
    pub strategy: StrategyId,
    pub kind: FailureKind,
    pub detail: String,
    pub retryable: bool,
}

impl StrategyFailure {
    pub fn new(strategy: StrategyId, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            strategy,
            kind,
            detail: detail.into(),
            retryable: kind.is_retryable(),
        }
    }

    /// Maps a service error that has no strategy-specific meaning.
    pub fn from_service(strategy: StrategyId, err: &ServiceError) -> Self {
        let kind = match err {
            ServiceError::NoCaptionsAvailable(_) => FailureKind::NoCaptionsAvailable,
            ServiceError::CaptionsDisabled(_) => FailureKind::CaptionsDisabled,
            ServiceError::Blocked(_) => FailureKind::Blocked,
            ServiceError::Unavailable(_) => FailureKind::Unavailable,
            ServiceError::PayloadTooLarge { .. } => FailureKind::PayloadTooLarge,
            ServiceError::InvalidMedia(_) => FailureKind::InvalidMedia,
            ServiceError::Transient(_) => FailureKind::TransientError,
            ServiceError::Rejected(_) => FailureKind::ExtractionFailed,
        };
        Self::new(strategy, kind, err.to_string())
    }

    pub fn from_stage(strategy: StrategyId, err: StageError) -> Self {
        match err {
            StageError::Interrupted => Self::new(strategy, FailureKind::Interrupted, err.to_string()),
            StageError::Store(_) => {
                Self::new(strategy, FailureKind::ExtractionFailed, err.to_string())
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("job was reset or deleted during processing")]
    Interrupted,

    #[error("failed to record stage: {0}")]
    Store(String),
}

/// Where strategies report stage changes and partial results. The sink
/// persists each change before returning.
pub trait StageSink: Send + Sync {
    fn enter(&self, status: JobStatus) -> Result<(), StageError>;

    fn media_ready(&self, path: &Path) -> Result<(), StageError>;
}

/// Everything a strategy needs for one attempt at one job.
pub struct AttemptContext<'a> {
    pub job: &'a Job,
    pub work_area: &'a WorkArea,
    pub stages: &'a dyn StageSink,
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn id(&self) -> StrategyId;

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<Extraction, StrategyFailure>;
}

/// Registered strategies, looked up by id.
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// The three built-in strategies wired to the given services.
    pub fn from_services(services: &Services, config: &Config) -> Self {
        let policy = RetryPolicy::from_config(&config.retry);
        let mut registry = Self::empty();
        registry.register(Arc::new(CaptionApiStrategy::new(
            Arc::clone(&services.captions),
            policy.clone(),
            config.timeouts.caption(),
        )));
        registry.register(Arc::new(DownloadTranscribeStrategy::new(
            Arc::clone(&services.media),
            Arc::clone(&services.speech),
            policy.clone(),
            &config.timeouts,
            &config.limits,
        )));
        registry.register(Arc::new(ArticleScrapeStrategy::new(
            Arc::clone(&services.articles),
            policy,
            config.timeouts.article(),
            &config.limits,
        )));
        registry
    }

    /// Adds a strategy, replacing any existing one with the same id.
    pub fn register(&mut self, strategy: Arc<dyn ExtractionStrategy>) {
        self.strategies.retain(|s| s.id() != strategy.id());
        self.strategies.push(strategy);
    }

    pub fn get(&self, id: StrategyId) -> Option<&Arc<dyn ExtractionStrategy>> {
        self.strategies.iter().find(|s| s.id() == id)
    }
}

/// Why a strategy chain produced no extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainError {
    /// The job moved on without us; nothing must be written.
    Interrupted,
    /// Every attempted strategy failed, in attempt order.
    Exhausted(Vec<StrategyFailure>),
}

impl ChainError {
    /// Failure detail for the job, one entry per attempted strategy.
    pub fn message(&self) -> String {
        match self {
            ChainError::Interrupted => "interrupted".to_string(),
            ChainError::Exhausted(failures) if failures.is_empty() => {
                "no extraction strategy available".to_string()
            }
            ChainError::Exhausted(failures) => failures
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Runs strategies in order. A retryable failure moves on to the next
/// strategy immediately; the first success or non-retryable failure
/// ends the chain.
pub async fn run_chain(
    registry: &StrategyRegistry,
    order: &[StrategyId],
    ctx: &AttemptContext<'_>,
) -> Result<Extraction, ChainError> {
    let mut failures = Vec::new();

    for &id in order {
        let Some(strategy) = registry.get(id) else {
            failures.push(StrategyFailure::new(
                id,
                FailureKind::Unsupported,
                "strategy not registered",
            ));
            continue;
        };

        match strategy.attempt(ctx).await {
            Ok(extraction) => {
                info!(strategy = %id, words = extraction.word_count, "Extraction succeeded");
                return Ok(extraction);
            }
            Err(failure) if failure.kind == FailureKind::Interrupted => {
                return Err(ChainError::Interrupted);
            }
            Err(failure) => {
                warn!(
                    strategy = %id,
                    kind = %failure.kind,
                    retryable = failure.retryable,
                    "Extraction strategy failed: {}",
                    failure.detail
                );
                let retryable = failure.retryable;
                failures.push(failure);
                if !retryable {
                    break;
                }
            }
        }
    }

    Err(ChainError::Exhausted(failures))
}
