//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{progress_message, JobStatus};
use crate::sanitize;

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Unique job identifier.
    pub job_id: String,
    /// Canonical source, with credentials and query redacted.
    pub source_url: String,
    /// Hash of the full canonical source; tells apart sources that
    /// redact to the same URL.
    pub source_hash: String,
    /// Status the job just entered.
    pub status: JobStatus,
    /// Human-readable message derived from the status.
    pub message: String,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    /// Catalog entry id (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    /// Catalog category (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    /// Creates a stage-change event.
    pub fn new(job_id: &str, source_url: &str, status: JobStatus) -> Self {
        Self {
            job_id: job_id.to_string(),
            source_url: sanitize::redact_url(source_url),
            source_hash: sanitize::hash_source(source_url),
            status,
            message: progress_message(status, None),
            timestamp: Utc::now(),
            entry_id: None,
            category: None,
            error: None,
        }
    }

    /// Creates a completion event.
    pub fn completed(job_id: &str, source_url: &str, entry_id: &str, category: &str) -> Self {
        Self {
            entry_id: Some(entry_id.to_string()),
            category: Some(category.to_string()),
            ..Self::new(job_id, source_url, JobStatus::Completed)
        }
    }

    /// Creates a failure event.
    pub fn failed(job_id: &str, source_url: &str, error: &str) -> Self {
        Self {
            message: progress_message(JobStatus::Failed, Some(error)),
            error: Some(error.to_string()),
            ..Self::new(job_id, source_url, JobStatus::Failed)
        }
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one job run.
    pub fn track(&self, job_id: &str, source_url: &str) -> JobProgressTracker {
        JobProgressTracker::new(job_id, source_url, Arc::clone(&self.sender))
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single job.
pub struct JobProgressTracker {
    job_id: String,
    source_url: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(
        job_id: &str,
        source_url: &str,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            source_url: source_url.to_string(),
            sender,
        }
    }

    pub fn update_status(&self, status: JobStatus) {
        let _ = self
            .sender
            .send(JobProgressEvent::new(&self.job_id, &self.source_url, status));
    }

    pub fn completed(&self, entry_id: &str, category: &str) {
        let _ = self.sender.send(JobProgressEvent::completed(
            &self.job_id,
            &self.source_url,
            entry_id,
            category,
        ));
    }

    pub fn failed(&self, error: &str) {
        let _ = self
            .sender
            .send(JobProgressEvent::failed(&self.job_id, &self.source_url, error));
    }
}
