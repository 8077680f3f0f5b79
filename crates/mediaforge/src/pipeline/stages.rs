use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

use crate::db::job_repo::{self, Expect};
use crate::db::Database;
use crate::model::{transition, ContentKind, Job, JobStatus};
use crate::strategy::{StageError, StageSink};

use super::progress::{ProgressEvent, ProgressReporter};

/// Persists stage changes for one job attempt.
///
/// Every write is a compare-and-set on `(id, status, retry_count)`; a miss
/// means recovery or deletion got there first and surfaces as
/// [`StageError::Interrupted`]. Status only moves forward: entering a stage
/// at or below the current one is a no-op, which lets a fallback strategy
/// start from a later stage than the one it would normally enter first.
pub struct DbStageSink<'a> {
    db: &'a Database,
    job_id: String,
    kind: ContentKind,
    attempt: u32,
    current: Mutex<JobStatus>,
    progress: &'a dyn ProgressReporter,
}

impl<'a> DbStageSink<'a> {
    pub fn new(db: &'a Database, job: &Job, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            db,
            job_id: job.id.clone(),
            kind: job.kind,
            attempt: job.retry_count,
            current: Mutex::new(job.status),
            progress,
        }
    }

    /// Last status this sink committed.
    pub fn current(&self) -> JobStatus {
        self.current
            .lock()
            .map(|status| *status)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    /// CAS key for the next write.
    pub fn expect(&self) -> Expect<'_> {
        Expect::new(&self.job_id, self.current(), self.attempt)
    }
}

impl StageSink for DbStageSink<'_> {
    fn enter(&self, status: JobStatus) -> Result<(), StageError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| StageError::Store("stage lock poisoned".to_string()))?;

        if status.rank() <= current.rank() {
            return Ok(());
        }
        transition(self.kind, *current, status).map_err(|e| StageError::Store(e.to_string()))?;

        let expect = Expect::new(&self.job_id, *current, self.attempt);
        let moved = job_repo::transition(self.db, expect, status, Utc::now())
            .map_err(|e| StageError::Store(e.to_string()))?;
        if !moved {
            return Err(StageError::Interrupted);
        }

        debug!(from = %*current, to = %status, "Stage entered");
        *current = status;
        self.progress.report(ProgressEvent::Stage { status });
        Ok(())
    }

    fn media_ready(&self, path: &Path) -> Result<(), StageError> {
        let recorded = job_repo::record_media_path(
            self.db,
            self.expect(),
            &path.display().to_string(),
            Utc::now(),
        )
        .map_err(|e| StageError::Store(e.to_string()))?;
        if recorded {
            Ok(())
        } else {
            Err(StageError::Interrupted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobMetadata, Tier};
    use crate::pipeline::NoopProgress;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recording(StdMutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recording {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn setup(kind: ContentKind) -> (Database, Job) {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new(
            kind,
            "https://example.com/v".to_string(),
            "https://example.com/v".to_string(),
            Tier::Basic,
            JobMetadata::default(),
            Utc::now(),
        );
        job_repo::insert(&db, &job).unwrap();
        (db, job)
    }

    #[test]
    fn test_enter_moves_forward_and_reports() {
        let (db, job) = setup(ContentKind::Video);
        let progress = Recording::default();
        let sink = DbStageSink::new(&db, &job, &progress);

        sink.enter(JobStatus::Downloading).unwrap();
        sink.enter(JobStatus::Transcribing).unwrap();

        let stored = job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Transcribing);
        assert_eq!(
            *progress.0.lock().unwrap(),
            vec![
                ProgressEvent::Stage { status: JobStatus::Downloading },
                ProgressEvent::Stage { status: JobStatus::Transcribing },
            ]
        );
    }

    #[test]
    fn test_enter_lower_stage_is_noop() {
        let (db, job) = setup(ContentKind::Video);
        let sink = DbStageSink::new(&db, &job, &NoopProgress);

        sink.enter(JobStatus::Transcribing).unwrap();
        sink.enter(JobStatus::Downloading).unwrap();

        assert_eq!(sink.current(), JobStatus::Transcribing);
        let stored = job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Transcribing);
    }

    #[test]
    fn test_enter_rejects_stage_of_other_kind() {
        let (db, job) = setup(ContentKind::Article);
        let sink = DbStageSink::new(&db, &job, &NoopProgress);
        assert!(matches!(
            sink.enter(JobStatus::Downloading),
            Err(StageError::Store(_))
        ));
    }

    #[test]
    fn test_reset_underneath_interrupts() {
        let (db, job) = setup(ContentKind::Video);
        let sink = DbStageSink::new(&db, &job, &NoopProgress);
        sink.enter(JobStatus::Downloading).unwrap();

        job_repo::reset_for_retry(
            &db,
            Expect::new(&job.id, JobStatus::Downloading, 0),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(
            sink.media_ready(Path::new("/tmp/media.m4a")),
            Err(StageError::Interrupted)
        );
        assert_eq!(sink.enter(JobStatus::Transcribing), Err(StageError::Interrupted));
    }
}
