use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::strategy::StrategyId;

use super::status::{ContentKind, JobStatus};

/// Maximum number of topics kept from an enrichment response, for every tier.
pub const MAX_TOPICS: usize = 5;

/// Processing tier; controls how much enrichment output is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Basic,
    Detailed,
    Bulk,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Detailed => "detailed",
            Tier::Bulk => "bulk",
        }
    }

    pub fn max_key_points(&self) -> usize {
        match self {
            Tier::Basic | Tier::Bulk => 5,
            Tier::Detailed => 8,
        }
    }

    pub fn max_qa_pairs(&self) -> usize {
        match self {
            Tier::Basic | Tier::Bulk => 5,
            Tier::Detailed => 10,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Tier::Basic),
            "detailed" => Ok(Tier::Detailed),
            "bulk" => Ok(Tier::Bulk),
            _ => Err(ValidationError::InvalidTier(s.to_string())),
        }
    }
}

/// A timed chunk of transcript text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Output of a successful extraction strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    pub word_count: usize,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    pub method: StrategyId,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub reading_time_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: &str, answer: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }
}

/// Normalized enrichment output stored on a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub qa_pairs: Vec<QaPair>,
    pub topics: Vec<String>,
    pub processing_model: String,
    /// True when a fixed fallback payload was substituted.
    #[serde(default)]
    pub degraded: bool,
}

/// Caller-supplied details that travel with a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// One unit of processing work.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub kind: ContentKind,
    /// Canonical source identity, the deduplication key.
    pub source_url: String,
    /// URL exactly as submitted; used for fetching.
    pub submitted_url: String,
    pub status: JobStatus,
    pub tier: Tier,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub metadata: JobMetadata,
    pub media_path: Option<String>,
    pub extraction: Option<Extraction>,
    pub enrichment: Option<EnrichedResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a fresh pending job with a new id.
    pub fn new(
        kind: ContentKind,
        source_url: String,
        submitted_url: String,
        tier: Tier,
        metadata: JobMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            source_url,
            submitted_url,
            status: JobStatus::Pending,
            tier,
            retry_count: 0,
            error_message: None,
            metadata,
            media_path: None,
            extraction: None,
            enrichment: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// True if any stage-owned result field is populated.
    pub fn has_partial_results(&self) -> bool {
        self.media_path.is_some() || self.extraction.is_some() || self.enrichment.is_some()
    }

    /// Short id prefix used in default titles and log lines.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}
