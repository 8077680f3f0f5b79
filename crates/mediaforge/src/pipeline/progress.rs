use crate::broadcast::job_progress::{JobProgressBroadcaster, JobProgressTracker};
use crate::model::JobStatus;

/// Events emitted by the pipeline during processing.
/// Transcripts are never part of an event (can be large).
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage { status: JobStatus },
    Completed { entry_id: String, category: String },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events to the broadcast channel.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
}

impl BroadcastProgress {
    pub fn new(broadcaster: &JobProgressBroadcaster, job_id: &str, source_url: &str) -> Self {
        Self {
            tracker: broadcaster.track(job_id, source_url),
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage { status } => self.tracker.update_status(status),
            ProgressEvent::Completed { entry_id, category } => {
                self.tracker.completed(&entry_id, &category)
            }
            ProgressEvent::Failed { error } => self.tracker.failed(&error),
        }
    }
}
