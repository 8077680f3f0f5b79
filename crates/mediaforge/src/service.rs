//! Public entry point: submission, status, recovery and stats.

use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::config::Config;
use crate::db::job_repo::{self, Expect};
use crate::db::Database;
use crate::error::{MediaforgeError, RecoveryError, Result, WorkerError};
use crate::model::{progress_message, ContentKind, Job, JobMetadata, JobStatus, Tier};
use crate::pipeline::Pipeline;
use crate::publish::{self, Claim};
use crate::recovery::{
    self, BulkRecoveryResult, HealthReport, JobStats, RecoveryItem, StuckThresholds,
};
use crate::resolver;
use crate::sanitize;
use crate::services::Services;
use crate::storage::WorkArea;
use crate::worker::{QueuedJob, WorkerPool};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// A request to process one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub url: String,
    pub kind: ContentKind,
    pub tier: Tier,
    pub title: Option<String>,
    pub creator: Option<String>,
    pub email: Option<String>,
}

impl SubmitRequest {
    pub fn video(url: impl Into<String>) -> Self {
        Self::new(url, ContentKind::Video)
    }

    pub fn article(url: impl Into<String>) -> Self {
        Self::new(url, ContentKind::Article)
    }

    fn new(url: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            url: url.into(),
            kind,
            tier: Tier::default(),
            title: None,
            creator: None,
            email: None,
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// What a submission resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A new job was created and queued.
    Created { job_id: String },
    /// A job for this source is already queued, running or completed.
    ExistingJob { job_id: String },
    /// The source is already in the catalog; nothing was created.
    ExistingEntry { entry_id: String },
}

impl SubmitOutcome {
    /// The job handling this source, if the answer is a job.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            SubmitOutcome::Created { job_id } | SubmitOutcome::ExistingJob { job_id } => {
                Some(job_id)
            }
            SubmitOutcome::ExistingEntry { .. } => None,
        }
    }

    pub fn deduped_existing(&self) -> bool {
        !matches!(self, SubmitOutcome::Created { .. })
    }
}

/// Caller-facing snapshot of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub kind: ContentKind,
    pub status: JobStatus,
    pub progress_message: String,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind,
            status: job.status,
            progress_message: progress_message(job.status, job.error_message.as_deref()),
            error_message: job.error_message.clone(),
            retry_count: job.retry_count,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

/// Owns the worker pool and exposes every operation on jobs.
pub struct IngestService {
    config: Arc<Config>,
    db: Database,
    pool: WorkerPool,
    progress: JobProgressBroadcaster,
    work_area: WorkArea,
    thresholds: StuckThresholds,
}

impl IngestService {
    /// Sweeps stale scratch directories, starts the workers and requeues
    /// jobs left pending by a previous process.
    pub async fn start(config: Config, db: Database, services: Services) -> Result<Self> {
        let pipeline = Pipeline::from_services(db.clone(), &services, &config);
        Self::start_with_pipeline(config, db, pipeline).await
    }

    /// Same as [`start`](Self::start) with a prebuilt pipeline.
    pub async fn start_with_pipeline(
        config: Config,
        db: Database,
        pipeline: Pipeline,
    ) -> Result<Self> {
        let work_area = pipeline.work_area().clone();
        work_area.ensure()?;
        let max_age = StdDuration::from_secs(config.recovery.file_cleanup_days * SECONDS_PER_DAY);
        let swept = work_area.sweep_stale(max_age, SystemTime::now());
        if swept > 0 {
            info!("Removed {} stale work directories", swept);
        }

        let progress = JobProgressBroadcaster::default();
        let pool = WorkerPool::new(
            Arc::new(pipeline),
            Some(progress.clone()),
            config.workers.count,
            config.workers.queue_capacity,
        );

        let service = Self {
            thresholds: StuckThresholds::from_config(&config.recovery),
            config: Arc::new(config),
            db,
            pool,
            progress,
            work_area,
        };

        let pending = job_repo::list_by_status(&service.db, JobStatus::Pending)?;
        if !pending.is_empty() {
            info!("Requeueing {} pending jobs", pending.len());
        }
        for job in &pending {
            service.pool.submit(QueuedJob::from(job)).await?;
        }

        Ok(service)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validates, deduplicates and queues a source.
    ///
    /// Validation failures are returned before anything is stored.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome> {
        let url = resolver::validate_source_url(&request.url)?;
        let email = normalize_optional(request.email);
        if let Some(email) = &email {
            resolver::validate_email(email)?;
        }

        let submitted = request.url.trim().to_string();
        let source_url = resolver::canonical_source(request.kind, url.as_str());
        let job = Job::new(
            request.kind,
            source_url,
            submitted,
            request.tier,
            JobMetadata {
                title: normalize_optional(request.title),
                creator: normalize_optional(request.creator),
                email,
            },
            Utc::now(),
        );

        let outcome = match publish::claim_source(&self.db, job)? {
            Claim::Created(job) => {
                self.enqueue_new(&job).await?;
                info!(
                    "Created {} job {} for source {}",
                    job.kind,
                    job.id,
                    sanitize::hash_source(&job.source_url)
                );
                SubmitOutcome::Created { job_id: job.id }
            }
            Claim::ExistingJob(job) => {
                debug!("Submission deduplicated onto job {}", job.id);
                SubmitOutcome::ExistingJob { job_id: job.id }
            }
            Claim::ExistingEntry(entry) => {
                debug!("Submission answered by catalog entry {}", entry.id);
                SubmitOutcome::ExistingEntry { entry_id: entry.id }
            }
        };

        Ok(outcome)
    }

    async fn enqueue_new(&self, job: &Job) -> Result<()> {
        if let Err(e) = self.pool.submit(QueuedJob::from(job)).await {
            self.release_unqueued(job, &e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Fails a pending job that never reached the queue, so a later
    /// submission is not deduplicated onto a job that will never run.
    /// Returns the status the job is left in.
    fn release_unqueued(&self, job: &Job, cause: &WorkerError) -> JobStatus {
        let expect = Expect::new(&job.id, JobStatus::Pending, job.retry_count);
        let reason = format!("could not be queued: {}", cause);
        match job_repo::mark_failed(&self.db, expect, &reason, Utc::now()) {
            Ok(true) => JobStatus::Failed,
            Ok(false) => job.status,
            Err(db_err) => {
                error!("Failed to release unqueued job {}: {}", job.id, db_err);
                job.status
            }
        }
    }

    pub fn get_status(&self, job_id: &str) -> Result<JobStatusView> {
        let job = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| MediaforgeError::JobNotFound(job_id.to_string()))?;
        Ok(JobStatusView::from(&job))
    }

    /// Resets a failed or stuck job and queues it again.
    pub async fn retry(&self, job_id: &str) -> Result<RecoveryItem> {
        let job = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| RecoveryError::NotFound(job_id.to_string()))?;

        let now = Utc::now();
        let retryable = job.status == JobStatus::Failed
            || recovery::is_stuck(job.status, job.updated_at, now, &self.thresholds);
        if !retryable {
            return Err(RecoveryError::NotRetryable {
                job_id: job.id,
                status: job.status,
            }
            .into());
        }

        let reset = recovery::reset_job(&self.db, &job, now)?;
        if let Err(source) = self.pool.submit(QueuedJob::from(&reset)).await {
            self.release_unqueued(&reset, &source);
            return Err(RecoveryError::Enqueue {
                job_id: reset.id,
                source,
            }
            .into());
        }

        Ok(RecoveryItem {
            job_id: reset.id,
            success: true,
            message: format!("Job queued for retry (attempt #{})", reset.retry_count),
            new_status: reset.status,
        })
    }

    /// Retries every failed job whose retry count is below `max_retries`
    /// (the configured default when `None`). One job's failure does not
    /// stop the others.
    pub async fn retry_all_failed(&self, max_retries: Option<u32>) -> Result<BulkRecoveryResult> {
        let max_retries = max_retries.unwrap_or(self.config.recovery.default_max_retries);
        let candidates = recovery::find_retry_eligible(&self.db, max_retries)?;

        let mut result = BulkRecoveryResult::default();
        for job in &candidates {
            let item = self
                .recover_one(job, |reset| {
                    format!("Queued for retry (attempt #{})", reset.retry_count)
                })
                .await;
            result.push(item);
        }

        info!(
            "Bulk retry: {} attempted, {} queued, {} failed",
            result.attempted, result.succeeded, result.failed
        );
        Ok(result)
    }

    /// Resets every stuck in-flight job and queues it again.
    pub async fn cleanup_stuck(&self) -> Result<BulkRecoveryResult> {
        let stuck = recovery::find_stuck(&self.db, &self.thresholds, Utc::now())?;

        let mut result = BulkRecoveryResult::default();
        for job in &stuck {
            let from = job.status;
            let item = self
                .recover_one(job, |_| format!("Reset from stuck {} status", from))
                .await;
            result.push(item);
        }

        info!(
            "Stuck cleanup: {} attempted, {} reset, {} failed",
            result.attempted, result.succeeded, result.failed
        );
        Ok(result)
    }

    async fn recover_one<F>(&self, job: &Job, message: F) -> RecoveryItem
    where
        F: Fn(&Job) -> String,
    {
        let reset = match recovery::reset_job(&self.db, job, Utc::now()) {
            Ok(reset) => reset,
            Err(e) => {
                warn!("Could not reset job {}: {}", job.id, e);
                return RecoveryItem {
                    job_id: job.id.clone(),
                    success: false,
                    message: format!("Failed to reset: {}", e),
                    new_status: job.status,
                };
            }
        };

        match self.pool.submit(QueuedJob::from(&reset)).await {
            Ok(()) => RecoveryItem {
                job_id: reset.id.clone(),
                success: true,
                message: message(&reset),
                new_status: reset.status,
            },
            Err(e) => {
                let new_status = self.release_unqueued(&reset, &e);
                let e = RecoveryError::Enqueue {
                    job_id: reset.id.clone(),
                    source: e,
                };
                warn!("{}", e);
                RecoveryItem {
                    job_id: reset.id.clone(),
                    success: false,
                    message: format!("Failed to queue retry: {}; job left {}", e, new_status),
                    new_status,
                }
            }
        }
    }

    pub fn get_stats(&self) -> Result<JobStats> {
        let window = Duration::hours(self.config.recovery.recent_failure_hours);
        Ok(recovery::collect_stats(
            &self.db,
            &self.thresholds,
            window,
            Utc::now(),
        )?)
    }

    pub fn health(&self) -> Result<HealthReport> {
        Ok(recovery::assess_health(self.get_stats()?))
    }

    /// Removes the job and its scratch directories. Catalog entries stay.
    /// File cleanup is best-effort and never fails the delete.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        let job = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| MediaforgeError::JobNotFound(job_id.to_string()))?;

        if !job_repo::delete(&self.db, &job.id)? {
            return Err(MediaforgeError::JobNotFound(job_id.to_string()));
        }

        let removed = self.work_area.remove_job_dirs(&job.id);
        if let Some(path) = &job.media_path {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed media file {}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove media file {}: {}", path, e),
            }
        }

        info!(
            "Deleted job {} ({} work directories removed)",
            job.id, removed
        );
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.progress.subscribe()
    }

    /// Stops accepting work and waits for running jobs to finish.
    pub async fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait().await;
    }

    /// Waits for every queued job to run, then stops the workers.
    pub async fn drain(self) {
        self.pool.wait().await;
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
