//! Source deduplication at submission and catalog publish at completion.

pub mod mapper;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::db::{catalog_repo, job_repo, Database, DatabaseError};
use crate::model::{CatalogEntry, Job};

pub use mapper::{build_entry, infer_category, Category};

/// Result of trying to claim a source for a new job.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// No prior work existed; the job was inserted.
    Created(Job),
    /// A non-failed job already owns this source.
    ExistingJob(Job),
    /// The source is already published; no job was created.
    ExistingEntry(CatalogEntry),
}

/// Two-level dedup check and insert, atomic under the database lock.
///
/// Both levels key on `(kind, source_url)`. A published catalog entry wins
/// over everything. Otherwise any job for the same source outside `failed`
/// is returned instead of `job`.
pub fn claim_source(db: &Database, job: Job) -> Result<Claim, DatabaseError> {
    db.with_conn(|conn| {
        if let Some(entry) = catalog_repo::find_by_source_in(conn, job.kind, &job.source_url)? {
            debug!("Source already published as entry {}", entry.id);
            return Ok(Claim::ExistingEntry(entry));
        }
        if let Some(existing) = job_repo::find_active_by_source_in(conn, job.kind, &job.source_url)?
        {
            debug!("Source already owned by job {}", existing.id);
            return Ok(Claim::ExistingJob(existing));
        }

        match job_repo::insert_in(conn, &job) {
            Ok(()) => Ok(Claim::Created(job)),
            // The partial unique index caught a writer on another connection.
            Err(e) if e.is_constraint_violation() => {
                match job_repo::find_active_by_source_in(conn, job.kind, &job.source_url)? {
                    Some(existing) => Ok(Claim::ExistingJob(existing)),
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    })
}

/// What happened to a completion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Job completed and the stored entry is returned.
    Published(CatalogEntry),
    /// The job was no longer at the expected status/attempt; nothing written.
    Superseded,
}

/// Marks the job completed and upserts its catalog entry in one
/// transaction. Either both happen or neither does.
pub fn complete_and_publish(
    db: &Database,
    expect: job_repo::Expect<'_>,
    entry: &CatalogEntry,
    now: DateTime<Utc>,
) -> Result<PublishOutcome, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        if !job_repo::complete_in(&tx, expect, now)? {
            tx.rollback()?;
            return Ok(PublishOutcome::Superseded);
        }
        let stored = catalog_repo::upsert_in(&tx, entry)?;
        tx.commit()?;

        info!(
            "Published catalog entry {} for job {} ({})",
            stored.id, expect.id, stored.category
        );
        Ok(PublishOutcome::Published(stored))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::Expect;
    use crate::model::{ContentKind, EnrichedResult, Extraction, JobMetadata, JobStatus, Tier};
    use crate::strategy::StrategyId;
    use chrono::{Duration, TimeZone};

    fn db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn job(url: &str) -> Job {
        Job::new(
            ContentKind::Article,
            url.to_string(),
            url.to_string(),
            Tier::Basic,
            JobMetadata::default(),
            Utc::now(),
        )
    }

    fn entry_for(job: &Job, summary: &str, now: DateTime<Utc>) -> CatalogEntry {
        let extraction = Extraction {
            text: "body text".to_string(),
            segments: vec![],
            word_count: 2,
            duration_seconds: None,
            method: StrategyId::ArticleScrape,
            language: None,
            title: Some("Title".to_string()),
            author: None,
            reading_time_minutes: Some(1),
        };
        let enrichment = EnrichedResult {
            summary: summary.to_string(),
            key_points: vec![],
            qa_pairs: vec![],
            topics: vec![],
            processing_model: "m".to_string(),
            degraded: false,
        };
        build_entry(job, &extraction, &enrichment, 1000, now)
    }

    fn move_to_processing(db: &Database, job: &Job) {
        assert!(job_repo::transition(
            db,
            Expect::new(&job.id, JobStatus::Pending, job.retry_count),
            JobStatus::Processing,
            Utc::now()
        )
        .unwrap());
    }

    #[test]
    fn test_claim_creates_then_dedupes() {
        let db = db();
        let first = job("https://example.com/a");
        let first_id = first.id.clone();
        assert!(matches!(claim_source(&db, first).unwrap(), Claim::Created(_)));

        match claim_source(&db, job("https://example.com/a")).unwrap() {
            Claim::ExistingJob(existing) => assert_eq!(existing.id, first_id),
            other => panic!("expected existing job, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_job_allows_fresh_claim() {
        let db = db();
        let first = job("https://example.com/a");
        let Claim::Created(first) = claim_source(&db, first).unwrap() else {
            panic!("expected created");
        };
        assert!(job_repo::mark_failed(
            &db,
            Expect::new(&first.id, JobStatus::Pending, 0),
            "boom",
            Utc::now()
        )
        .unwrap());

        match claim_source(&db, job("https://example.com/a")).unwrap() {
            Claim::Created(second) => assert_ne!(second.id, first.id),
            other => panic!("expected created, got {:?}", other),
        }
    }

    #[test]
    fn test_published_source_short_circuits() {
        let db = db();
        let Claim::Created(first) = claim_source(&db, job("https://example.com/a")).unwrap() else {
            panic!("expected created");
        };
        move_to_processing(&db, &first);
        let entry = entry_for(&first, "S", Utc::now());
        complete_and_publish(
            &db,
            Expect::new(&first.id, JobStatus::Processing, 0),
            &entry,
            Utc::now(),
        )
        .unwrap();

        match claim_source(&db, job("https://example.com/a")).unwrap() {
            Claim::ExistingEntry(found) => assert_eq!(found.id, entry.id),
            other => panic!("expected existing entry, got {:?}", other),
        }
    }

    #[test]
    fn test_publish_superseded_writes_nothing() {
        let db = db();
        let Claim::Created(first) = claim_source(&db, job("https://example.com/a")).unwrap() else {
            panic!("expected created");
        };
        let entry = entry_for(&first, "S", Utc::now());
        // Job is still pending, not processing.
        let outcome = complete_and_publish(
            &db,
            Expect::new(&first.id, JobStatus::Processing, 0),
            &entry,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(outcome, PublishOutcome::Superseded);
        assert_eq!(catalog_repo::count(&db).unwrap(), 0);
        let stored = job_repo::find_by_id(&db, &first.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
    }

    #[test]
    fn test_republish_keeps_created_at_and_id() {
        let db = db();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let t1 = t0 + Duration::hours(2);

        let Claim::Created(first) = claim_source(&db, job("https://example.com/a")).unwrap() else {
            panic!("expected created");
        };
        move_to_processing(&db, &first);
        let PublishOutcome::Published(stored_first) = complete_and_publish(
            &db,
            Expect::new(&first.id, JobStatus::Processing, 0),
            &entry_for(&first, "First", t0),
            t0,
        )
        .unwrap() else {
            panic!("expected publish");
        };

        // Reprocess the same source under a new job.
        job_repo::delete(&db, &first.id).unwrap();
        let mut second = job("https://example.com/a");
        second.status = JobStatus::Processing;
        job_repo::insert(&db, &second).unwrap();

        let PublishOutcome::Published(stored_second) = complete_and_publish(
            &db,
            Expect::new(&second.id, JobStatus::Processing, 0),
            &entry_for(&second, "Second", t1),
            t1,
        )
        .unwrap() else {
            panic!("expected publish");
        };

        assert_eq!(catalog_repo::count(&db).unwrap(), 1);
        assert_eq!(stored_second.id, stored_first.id);
        assert_eq!(stored_second.created_at, t0);
        assert_eq!(stored_second.updated_at, t1);
        assert_eq!(stored_second.summary, "Second");
        assert_eq!(stored_second.job_id, second.id);
    }
}
