//! Job repository: CRUD and compare-and-set updates for the `jobs` table.
//!
//! Every update that moves a job forward is conditioned on the row still
//! having the expected `(status, retry_count)`. A `false` return means the
//! row changed underneath the caller (recovery reset, deletion, or another
//! writer) and nothing was written.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::model::{ContentKind, EnrichedResult, Extraction, Job, JobMetadata, JobStatus};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub kind: String,
    pub source_url: String,
    pub submitted_url: String,
    pub status: String,
    pub tier: String,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub metadata: Option<String>,
    pub media_path: Option<String>,
    pub extraction: Option<String>,
    pub enrichment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            source_url: row.get("source_url")?,
            submitted_url: row.get("submitted_url")?,
            status: row.get("status")?,
            tier: row.get("tier")?,
            retry_count: row.get("retry_count")?,
            error_message: row.get("error_message")?,
            metadata: row.get("metadata")?,
            media_path: row.get("media_path")?,
            extraction: row.get("extraction")?,
            enrichment: row.get("enrichment")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn from_job(job: &Job) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: job.id.clone(),
            kind: job.kind.as_str().to_string(),
            source_url: job.source_url.clone(),
            submitted_url: job.submitted_url.clone(),
            status: job.status.as_str().to_string(),
            tier: job.tier.as_str().to_string(),
            retry_count: i64::from(job.retry_count),
            error_message: job.error_message.clone(),
            metadata: Some(serde_json::to_string(&job.metadata)?),
            media_path: job.media_path.clone(),
            extraction: job.extraction.as_ref().map(serde_json::to_string).transpose()?,
            enrichment: job.enrichment.as_ref().map(serde_json::to_string).transpose()?,
            created_at: format_timestamp(&job.created_at),
            updated_at: format_timestamp(&job.updated_at),
            completed_at: job.completed_at.as_ref().map(format_timestamp),
        })
    }

    pub fn into_job(self) -> Result<Job, DatabaseError> {
        let id = self.id;
        let corrupt = |reason: String| DatabaseError::Corrupt {
            id: id.clone(),
            reason,
        };

        let kind: ContentKind = self.kind.parse().map_err(corrupt)?;
        let status: JobStatus = self.status.parse().map_err(corrupt)?;
        let tier = self
            .tier
            .parse()
            .map_err(|e: crate::error::ValidationError| corrupt(e.to_string()))?;
        let retry_count = u32::try_from(self.retry_count)
            .map_err(|_| corrupt(format!("negative retry_count {}", self.retry_count)))?;
        let metadata: JobMetadata = match self.metadata.as_deref() {
            Some(raw) => serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?,
            None => JobMetadata::default(),
        };
        let extraction: Option<Extraction> = self
            .extraction
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let enrichment: Option<EnrichedResult> = self
            .enrichment
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;

        let created_at = parse_timestamp(&id, &self.created_at)?;
        let updated_at = parse_timestamp(&id, &self.updated_at)?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|s| parse_timestamp(&id, s))
            .transpose()?;

        Ok(Job {
            id,
            kind,
            source_url: self.source_url,
            submitted_url: self.submitted_url,
            status,
            tier,
            retry_count,
            error_message: self.error_message,
            metadata,
            media_path: self.media_path,
            extraction,
            enrichment,
            created_at,
            updated_at,
            completed_at,
        })
    }
}

/// Compare-and-set key for a job update.
#[derive(Debug, Clone, Copy)]
pub struct Expect<'a> {
    pub id: &'a str,
    pub status: JobStatus,
    pub attempt: u32,
}

impl<'a> Expect<'a> {
    pub fn new(id: &'a str, status: JobStatus, attempt: u32) -> Self {
        Self { id, status, attempt }
    }
}

fn collect_jobs(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Job>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<JobRow> = stmt
        .query_map(params, JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(JobRow::into_job).collect()
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_in(conn, job))
}

pub(crate) fn insert_in(conn: &Connection, job: &Job) -> Result<(), DatabaseError> {
    let row = JobRow::from_job(job)?;
    conn.execute(
        "INSERT INTO jobs (id, kind, source_url, submitted_url, status, tier, retry_count,
         error_message, metadata, media_path, extraction, enrichment, created_at, updated_at,
         completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            row.id,
            row.kind,
            row.source_url,
            row.submitted_url,
            row.status,
            row.tier,
            row.retry_count,
            row.error_message,
            row.metadata,
            row.media_path,
            row.extraction,
            row.enrichment,
            row.created_at,
            row.updated_at,
            row.completed_at,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        row.map(JobRow::into_job).transpose()
    })
}

/// The job for this source that is anything but failed, if one exists.
pub(crate) fn find_active_by_source_in(
    conn: &Connection,
    kind: ContentKind,
    source_url: &str,
) -> Result<Option<Job>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE kind = ?1 AND source_url = ?2 AND status != 'failed'
             ORDER BY created_at DESC LIMIT 1",
            params![kind.as_str(), source_url],
            JobRow::from_row,
        )
        .optional()?;
    row.map(JobRow::into_job).transpose()
}

/// Lists jobs with the given status, oldest first.
pub fn list_by_status(db: &Database, status: JobStatus) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        collect_jobs(
            conn,
            "SELECT * FROM jobs WHERE status = ?1 ORDER BY created_at ASC",
            params![status.as_str()],
        )
    })
}

/// Lists every job that has started but not finished.
pub fn list_in_flight(db: &Database) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        collect_jobs(
            conn,
            "SELECT * FROM jobs
             WHERE status IN ('downloading', 'transcribing', 'enhancing', 'processing')
             ORDER BY updated_at ASC",
            [],
        )
    })
}

/// Moves a job to a new status.
pub fn transition(
    db: &Database,
    expect: Expect<'_>,
    to: JobStatus,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?2 AND retry_count = ?3",
            params![
                expect.id,
                expect.status.as_str(),
                expect.attempt,
                to.as_str(),
                format_timestamp(&now)
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Records where the downloaded media of the current attempt lives.
pub fn record_media_path(
    db: &Database,
    expect: Expect<'_>,
    path: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET media_path = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?2 AND retry_count = ?3",
            params![
                expect.id,
                expect.status.as_str(),
                expect.attempt,
                path,
                format_timestamp(&now)
            ],
        )?;
        Ok(changed == 1)
    })
}

pub fn save_extraction(
    db: &Database,
    expect: Expect<'_>,
    extraction: &Extraction,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let payload = serde_json::to_string(extraction)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET extraction = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?2 AND retry_count = ?3",
            params![
                expect.id,
                expect.status.as_str(),
                expect.attempt,
                payload,
                format_timestamp(&now)
            ],
        )?;
        Ok(changed == 1)
    })
}

pub fn save_enrichment(
    db: &Database,
    expect: Expect<'_>,
    enrichment: &EnrichedResult,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let payload = serde_json::to_string(enrichment)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET enrichment = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?2 AND retry_count = ?3",
            params![
                expect.id,
                expect.status.as_str(),
                expect.attempt,
                payload,
                format_timestamp(&now)
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Terminal failure: sets the error and `completed_at`.
pub fn mark_failed(
    db: &Database,
    expect: Expect<'_>,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let ts = format_timestamp(&now);
        let changed = conn.execute(
            "UPDATE jobs SET status = 'failed', error_message = ?4, updated_at = ?5,
             completed_at = ?5
             WHERE id = ?1 AND status = ?2 AND retry_count = ?3",
            params![expect.id, expect.status.as_str(), expect.attempt, error, ts],
        )?;
        Ok(changed == 1)
    })
}

/// Terminal success, run inside the publish transaction.
pub(crate) fn complete_in(
    conn: &Connection,
    expect: Expect<'_>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let ts = format_timestamp(&now);
    let changed = conn.execute(
        "UPDATE jobs SET status = 'completed', error_message = NULL, updated_at = ?4,
         completed_at = ?4
         WHERE id = ?1 AND status = ?2 AND retry_count = ?3",
        params![expect.id, expect.status.as_str(), expect.attempt, ts],
    )?;
    Ok(changed == 1)
}

/// Recovery reset: back to pending with the next attempt number and every
/// stage-owned field cleared.
pub fn reset_for_retry(
    db: &Database,
    expect: Expect<'_>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'pending', retry_count = retry_count + 1,
             error_message = NULL, media_path = NULL, extraction = NULL, enrichment = NULL,
             completed_at = NULL, updated_at = ?4
             WHERE id = ?1 AND status = ?2 AND retry_count = ?3",
            params![
                expect.id,
                expect.status.as_str(),
                expect.attempt,
                format_timestamp(&now)
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Deletes a job row. Returns whether a row was removed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(changed == 1)
    })
}
