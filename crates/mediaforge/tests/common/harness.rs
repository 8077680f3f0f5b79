//! Test harness for isolated service runs.
//!
//! The `TestHarness` owns a temporary work area, an in-memory database and
//! a started `IngestService` wired to fake services.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use mediaforge::config::Config;
use mediaforge::db::{job_repo, Database};
use mediaforge::model::{Job, JobStatus};
use mediaforge::{IngestService, JobStatusView};

use super::builders::{fast_config, FakeServices};

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct TestHarness {
    temp_dir: TempDir,
    pub work_dir: PathBuf,
    pub db: Database,
    pub fakes: FakeServices,
    pub service: IngestService,
}

impl TestHarness {
    /// Starts a service where every external call succeeds.
    pub async fn new() -> Self {
        Self::with_fakes(FakeServices::healthy()).await
    }

    pub async fn with_fakes(fakes: FakeServices) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let work_dir = temp_dir.path().join("work");
        let config = fast_config(&work_dir);
        Self::build(temp_dir, work_dir, config, fakes).await
    }

    /// Starts a service with a customised config. The work directory is
    /// always redirected into the harness temp dir.
    pub async fn with_config<F>(fakes: FakeServices, customize: F) -> Self
    where
        F: FnOnce(&mut Config),
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let work_dir = temp_dir.path().join("work");
        let mut config = fast_config(&work_dir);
        customize(&mut config);
        config.storage.work_directory = work_dir.to_string_lossy().to_string();
        Self::build(temp_dir, work_dir, config, fakes).await
    }

    /// Starts a service over an existing database, e.g. one seeded with
    /// jobs left behind by an earlier process.
    pub async fn with_database(db: Database, fakes: FakeServices) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let work_dir = temp_dir.path().join("work");
        let config = fast_config(&work_dir);
        Self::start(temp_dir, work_dir, config, db, fakes).await
    }

    async fn build(temp_dir: TempDir, work_dir: PathBuf, config: Config, fakes: FakeServices) -> Self {
        let db = Database::open_in_memory().expect("Failed to open database");
        Self::start(temp_dir, work_dir, config, db, fakes).await
    }

    async fn start(
        temp_dir: TempDir,
        work_dir: PathBuf,
        config: Config,
        db: Database,
        fakes: FakeServices,
    ) -> Self {
        let service = IngestService::start(config, db.clone(), fakes.services())
            .await
            .expect("Failed to start service");

        Self {
            temp_dir,
            work_dir,
            db,
            fakes,
            service,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn job(&self, job_id: &str) -> Job {
        job_repo::find_by_id(&self.db, job_id)
            .expect("Failed to load job")
            .expect("Job should exist")
    }

    /// Polls until the job is completed or failed.
    pub async fn wait_for_terminal(&self, job_id: &str) -> JobStatusView {
        self.wait_for(job_id, |status| {
            matches!(status, JobStatus::Completed | JobStatus::Failed)
        })
        .await
    }

    pub async fn wait_for<F>(&self, job_id: &str, done: F) -> JobStatusView
    where
        F: Fn(JobStatus) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let view = self
                .service
                .get_status(job_id)
                .expect("Job should be readable");
            if done(view.status) {
                return view;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} stuck in {}",
                job_id,
                view.status
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Pushes `updated_at` into the past to simulate a job that stopped
    /// making progress.
    pub fn backdate(&self, job_id: &str, updated_at: DateTime<Utc>) {
        self.db
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE jobs SET updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![mediaforge::db::format_timestamp(&updated_at), job_id],
                )?;
                Ok(())
            })
            .expect("Failed to backdate job");
    }

    /// Forces a job into a status, bypassing the state machine.
    pub fn force_status(&self, job_id: &str, status: JobStatus) {
        self.db
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE jobs SET status = ?1 WHERE id = ?2",
                    rusqlite::params![status.as_str(), job_id],
                )?;
                Ok(())
            })
            .expect("Failed to force status");
    }
}
