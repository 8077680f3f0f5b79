//! Stuck-job detection, retry eligibility, job resets and health stats.
//!
//! Detection is pure; only [`reset_job`] and the stats queries touch the
//! database. Re-enqueueing is left to the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::config::RecoveryConfig;
use crate::db::job_repo::{self, Expect};
use crate::db::{stats_repo, Database, DatabaseError};
use crate::error::RecoveryError;
use crate::model::{recovery_transition, Job, JobStatus};

/// Age limits past which an in-flight job counts as stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckThresholds {
    pub downloading: Duration,
    /// Transcribing, enhancing and article processing.
    pub processing: Duration,
}

impl StuckThresholds {
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            downloading: Duration::minutes(config.downloading_stuck_minutes),
            processing: Duration::minutes(config.processing_stuck_minutes),
        }
    }
}

impl Default for StuckThresholds {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

/// True when the job sat in an in-flight status for strictly longer than
/// its threshold.
pub fn is_stuck(
    status: JobStatus,
    updated_at: DateTime<Utc>,
    now: DateTime<Utc>,
    thresholds: &StuckThresholds,
) -> bool {
    let limit = match status {
        JobStatus::Downloading => thresholds.downloading,
        JobStatus::Transcribing | JobStatus::Enhancing | JobStatus::Processing => {
            thresholds.processing
        }
        JobStatus::Pending | JobStatus::Completed | JobStatus::Failed => return false,
    };
    now - updated_at > limit
}

pub fn is_retry_eligible(status: JobStatus, retry_count: u32, max_retries: u32) -> bool {
    status == JobStatus::Failed && retry_count < max_retries
}

/// Outcome for one job inside a single or bulk recovery call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryItem {
    pub job_id: String,
    pub success: bool,
    pub message: String,
    pub new_status: JobStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRecoveryResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub details: Vec<RecoveryItem>,
}

impl BulkRecoveryResult {
    pub fn push(&mut self, item: RecoveryItem) {
        self.attempted += 1;
        if item.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.details.push(item);
    }
}

/// Jobs currently stuck, oldest update first.
pub fn find_stuck(
    db: &Database,
    thresholds: &StuckThresholds,
    now: DateTime<Utc>,
) -> Result<Vec<Job>, DatabaseError> {
    Ok(job_repo::list_in_flight(db)?
        .into_iter()
        .filter(|job| is_stuck(job.status, job.updated_at, now, thresholds))
        .collect())
}

/// Failed jobs below the retry cap, oldest first.
pub fn find_retry_eligible(db: &Database, max_retries: u32) -> Result<Vec<Job>, DatabaseError> {
    Ok(job_repo::list_by_status(db, JobStatus::Failed)?
        .into_iter()
        .filter(|job| is_retry_eligible(job.status, job.retry_count, max_retries))
        .collect())
}

/// Resets `job` to `Pending` with the next attempt number and all
/// stage-owned fields cleared. `job` must be the row as last read; if it
/// changed since, nothing is written and `Conflict` is returned.
pub fn reset_job(db: &Database, job: &Job, now: DateTime<Utc>) -> Result<Job, RecoveryError> {
    recovery_transition(job.kind, job.status).map_err(|_| RecoveryError::NotRetryable {
        job_id: job.id.clone(),
        status: job.status,
    })?;

    let expect = Expect::new(&job.id, job.status, job.retry_count);
    match job_repo::reset_for_retry(db, expect, now) {
        Ok(true) => {}
        Ok(false) => {
            return Err(RecoveryError::Conflict {
                job_id: job.id.clone(),
            })
        }
        // A fresh job for the same source already took the active slot.
        Err(e) if e.is_constraint_violation() => {
            return Err(RecoveryError::Conflict {
                job_id: job.id.clone(),
            })
        }
        Err(e) => return Err(e.into()),
    }

    info!(
        "Reset job {} from '{}' to pending (attempt #{})",
        job.id,
        job.status,
        job.retry_count + 1
    );

    job_repo::find_by_id(db, &job.id)?.ok_or_else(|| RecoveryError::NotFound(job.id.clone()))
}

/// Job counts for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub total: u64,
    pub by_status: BTreeMap<JobStatus, u64>,
    pub stuck: u64,
    pub recent_failures: u64,
}

impl JobStats {
    pub fn count(&self, status: JobStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Pending plus in-flight.
    pub fn active(&self) -> u64 {
        self.by_status
            .iter()
            .filter(|(status, _)| **status == JobStatus::Pending || status.is_in_flight())
            .map(|(_, count)| count)
            .sum()
    }
}

pub fn collect_stats(
    db: &Database,
    thresholds: &StuckThresholds,
    recent_window: Duration,
    now: DateTime<Utc>,
) -> Result<JobStats, DatabaseError> {
    let by_status = stats_repo::count_by_status(db)?;
    let total = by_status.values().sum();
    let stuck = find_stuck(db, thresholds, now)?.len() as u64;
    let recent_failures = stats_repo::count_failed_since(db, now - recent_window)?;

    Ok(JobStats {
        total,
        by_status,
        stuck,
        recent_failures,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Percentage of all jobs that completed.
    pub success_rate: f64,
    /// Percentage of active jobs that are stuck.
    pub stuck_rate: f64,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub stats: JobStats,
}

const STUCK_RATE_WARNING: f64 = 20.0;
const SUCCESS_RATE_CRITICAL: f64 = 80.0;
const RECENT_FAILURES_WARNING: u64 = 10;
const RECENT_FAILURES_RETRY_HINT: u64 = 5;
const FAILED_INVESTIGATE_HINT: u64 = 10;

/// Grades the stats. The worst triggered check sets the status.
pub fn assess_health(stats: JobStats) -> HealthReport {
    let completed = stats.count(JobStatus::Completed);
    let success_rate = if stats.total == 0 {
        100.0
    } else {
        completed as f64 / stats.total as f64 * 100.0
    };
    let active = stats.active();
    let stuck_rate = if active == 0 {
        0.0
    } else {
        stats.stuck as f64 / active as f64 * 100.0
    };

    let mut status = HealthStatus::Healthy;
    let mut warnings = Vec::new();

    if stuck_rate > STUCK_RATE_WARNING {
        status = status.max(HealthStatus::Warning);
        warnings.push(format!("High stuck job rate: {:.1}%", stuck_rate));
    }
    if success_rate < SUCCESS_RATE_CRITICAL {
        status = status.max(HealthStatus::Critical);
        warnings.push(format!("Low success rate: {:.1}%", success_rate));
    }
    if stats.recent_failures > RECENT_FAILURES_WARNING {
        status = status.max(HealthStatus::Warning);
        warnings.push(format!(
            "High recent failure count: {}",
            stats.recent_failures
        ));
    }

    let mut recommendations = Vec::new();
    if stats.stuck > 0 {
        recommendations.push("Run cleanup_stuck to reset stuck jobs".to_string());
    }
    if stats.recent_failures > RECENT_FAILURES_RETRY_HINT {
        recommendations.push("Run retry_all_failed to retry recent failures".to_string());
    }
    if stats.count(JobStatus::Failed) > FAILED_INVESTIGATE_HINT {
        recommendations.push("Investigate error patterns in failed jobs".to_string());
    }

    if status != HealthStatus::Healthy {
        warn!("Job system health is {:?}: {}", status, warnings.join("; "));
    }

    HealthReport {
        status,
        success_rate,
        stuck_rate,
        warnings,
        recommendations,
        stats,
    }
}
