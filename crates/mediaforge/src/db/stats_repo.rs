//! Aggregate queries over the `jobs` table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::model::JobStatus;

use super::{format_timestamp, Database, DatabaseError};

/// Job counts keyed by status. Statuses with no jobs are present with 0.
pub fn count_by_status(db: &Database) -> Result<BTreeMap<JobStatus, u64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut counts: BTreeMap<JobStatus, u64> = crate::model::ALL_STATUSES
            .iter()
            .map(|s| (*s, 0))
            .collect();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            let status: JobStatus = status.parse().map_err(|reason| DatabaseError::Corrupt {
                id: "jobs.status".to_string(),
                reason,
            })?;
            counts.insert(status, count);
        }
        Ok(counts)
    })
}

/// Failed jobs whose last update is at or after `since`.
pub fn count_failed_since(db: &Database, since: DateTime<Utc>) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'failed' AND updated_at >= ?1",
            params![format_timestamp(&since)],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
