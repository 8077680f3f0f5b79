//! Job kinds, statuses and the transition graph between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of source a job processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Video,
    Article,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Article => "article",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ContentKind::Video),
            "article" => Ok(ContentKind::Article),
            other => Err(format!("unknown content kind '{}'", other)),
        }
    }
}

/// Lifecycle status of a job.
///
/// Video jobs move through `Downloading`/`Transcribing`/`Enhancing`;
/// article jobs use the single `Processing` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Transcribing,
    Enhancing,
    Processing,
    Completed,
    Failed,
}

pub const ALL_STATUSES: [JobStatus; 7] = [
    JobStatus::Pending,
    JobStatus::Downloading,
    JobStatus::Transcribing,
    JobStatus::Enhancing,
    JobStatus::Processing,
    JobStatus::Completed,
    JobStatus::Failed,
];

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Enhancing => "enhancing",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Work has started but not finished.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Downloading
                | JobStatus::Transcribing
                | JobStatus::Enhancing
                | JobStatus::Processing
        )
    }

    /// Whether the status is allowed for the given kind at all.
    pub fn applies_to(&self, kind: ContentKind) -> bool {
        match self {
            JobStatus::Downloading | JobStatus::Transcribing | JobStatus::Enhancing => {
                kind == ContentKind::Video
            }
            JobStatus::Processing => kind == ContentKind::Article,
            JobStatus::Pending | JobStatus::Completed | JobStatus::Failed => true,
        }
    }

    /// Position along the forward path. Terminal states share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Downloading => 1,
            JobStatus::Transcribing => 2,
            JobStatus::Processing => 2,
            JobStatus::Enhancing => 3,
            JobStatus::Completed | JobStatus::Failed => 4,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATUSES
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal {kind} job transition {from} -> {to}")]
pub struct TransitionError {
    pub kind: ContentKind,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Checks a forward pipeline transition.
///
/// Resets to `Pending` are not accepted here; they go through
/// [`recovery_transition`].
pub fn transition(kind: ContentKind, from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
    use JobStatus::*;

    let allowed = match (kind, from, to) {
        (_, Completed, _) | (_, Failed, _) => false,
        (_, _, Failed) => from.applies_to(kind),

        (ContentKind::Video, Pending, Downloading) => true,
        (ContentKind::Video, Pending, Transcribing) => true,
        (ContentKind::Video, Downloading, Transcribing) => true,
        (ContentKind::Video, Transcribing, Enhancing) => true,
        (ContentKind::Video, Enhancing, Completed) => true,
        (ContentKind::Video, _, _) => false,

        (ContentKind::Article, Pending, Processing) => true,
        (ContentKind::Article, Processing, Completed) => true,
        (ContentKind::Article, _, _) => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(TransitionError { kind, from, to })
    }
}

/// Checks a recovery reset back to `Pending`.
pub fn recovery_transition(kind: ContentKind, from: JobStatus) -> Result<(), TransitionError> {
    if (from == JobStatus::Failed || from.is_in_flight()) && from.applies_to(kind) {
        Ok(())
    } else {
        Err(TransitionError {
            kind,
            from,
            to: JobStatus::Pending,
        })
    }
}

/// Human-readable status line. Never includes anything beyond the stored
/// error message.
pub fn progress_message(status: JobStatus, error: Option<&str>) -> String {
    match status {
        JobStatus::Pending => "Waiting to start processing...".to_string(),
        JobStatus::Downloading => "Downloading media from source...".to_string(),
        JobStatus::Transcribing => "Creating transcript...".to_string(),
        JobStatus::Enhancing => "Generating summaries and Q&A...".to_string(),
        JobStatus::Processing => "Extracting and analysing article...".to_string(),
        JobStatus::Completed => "Processing complete! Your training data is ready.".to_string(),
        JobStatus::Failed => format!(
            "Processing failed: {}",
            error.filter(|e| !e.is_empty()).unwrap_or("Unknown error")
        ),
    }
}
