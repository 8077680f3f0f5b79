//! Catalog repository: one entry per content kind and canonical source.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::model::{CatalogEntry, ContentKind};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};

/// A raw catalog row from the database.
#[derive(Debug, Clone)]
struct CatalogRow {
    id: String,
    source_url: String,
    kind: String,
    job_id: String,
    title: String,
    creator: String,
    category: String,
    difficulty: String,
    signal_score: i64,
    summary: String,
    summary_bullets: String,
    topics: String,
    tools: String,
    best_for: String,
    teaches_agent_to: String,
    prompt_template: String,
    execution_checklist: String,
    agent_training_script: String,
    word_count: i64,
    reading_time_minutes: Option<i64>,
    content: Option<String>,
    created_at: String,
    updated_at: String,
}

impl CatalogRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            source_url: row.get("source_url")?,
            kind: row.get("kind")?,
            job_id: row.get("job_id")?,
            title: row.get("title")?,
            creator: row.get("creator")?,
            category: row.get("category")?,
            difficulty: row.get("difficulty")?,
            signal_score: row.get("signal_score")?,
            summary: row.get("summary")?,
            summary_bullets: row.get("summary_bullets")?,
            topics: row.get("topics")?,
            tools: row.get("tools")?,
            best_for: row.get("best_for")?,
            teaches_agent_to: row.get("teaches_agent_to")?,
            prompt_template: row.get("prompt_template")?,
            execution_checklist: row.get("execution_checklist")?,
            agent_training_script: row.get("agent_training_script")?,
            word_count: row.get("word_count")?,
            reading_time_minutes: row.get("reading_time_minutes")?,
            content: row.get("content")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_entry(self) -> Result<CatalogEntry, DatabaseError> {
        let id = self.id;
        let corrupt = |reason: String| DatabaseError::Corrupt {
            id: id.clone(),
            reason,
        };

        let kind: ContentKind = self.kind.parse().map_err(corrupt)?;
        let topics: Vec<String> =
            serde_json::from_str(&self.topics).map_err(|e| corrupt(e.to_string()))?;
        let signal_score = u8::try_from(self.signal_score)
            .map_err(|_| corrupt(format!("signal_score out of range: {}", self.signal_score)))?;
        let word_count = usize::try_from(self.word_count)
            .map_err(|_| corrupt(format!("negative word_count {}", self.word_count)))?;
        let reading_time_minutes = self
            .reading_time_minutes
            .map(u32::try_from)
            .transpose()
            .map_err(|_| corrupt("reading_time_minutes out of range".to_string()))?;
        let created_at = parse_timestamp(&id, &self.created_at)?;
        let updated_at = parse_timestamp(&id, &self.updated_at)?;

        Ok(CatalogEntry {
            id,
            source_url: self.source_url,
            kind,
            job_id: self.job_id,
            title: self.title,
            creator: self.creator,
            category: self.category,
            difficulty: self.difficulty,
            signal_score,
            summary: self.summary,
            summary_bullets: self.summary_bullets,
            topics,
            tools: self.tools,
            best_for: self.best_for,
            teaches_agent_to: self.teaches_agent_to,
            prompt_template: self.prompt_template,
            execution_checklist: self.execution_checklist,
            agent_training_script: self.agent_training_script,
            word_count,
            reading_time_minutes,
            content: self.content,
            created_at,
            updated_at,
        })
    }
}

/// Finds the entry published for a canonical source of the given kind.
pub fn find_by_source(
    db: &Database,
    kind: ContentKind,
    source_url: &str,
) -> Result<Option<CatalogEntry>, DatabaseError> {
    db.with_conn(|conn| find_by_source_in(conn, kind, source_url))
}

pub(crate) fn find_by_source_in(
    conn: &Connection,
    kind: ContentKind,
    source_url: &str,
) -> Result<Option<CatalogEntry>, DatabaseError> {
    let entry = conn
        .query_row(
            "SELECT * FROM catalog_entries WHERE kind = ?1 AND source_url = ?2",
            params![kind.as_str(), source_url],
            CatalogRow::from_row,
        )
        .optional()?;
    entry.map(CatalogRow::into_entry).transpose()
}

/// Inserts or updates the entry keyed by `(kind, source_url)`.
///
/// On conflict every derived field is overwritten; `id` and `created_at`
/// keep their first-publish values. Returns the stored entry.
pub(crate) fn upsert_in(
    conn: &Connection,
    entry: &CatalogEntry,
) -> Result<CatalogEntry, DatabaseError> {
    let topics = serde_json::to_string(&entry.topics)?;
    conn.execute(
        "INSERT INTO catalog_entries (id, source_url, kind, job_id, title, creator, category,
         difficulty, signal_score, summary, summary_bullets, topics, tools, best_for,
         teaches_agent_to, prompt_template, execution_checklist, agent_training_script,
         word_count, reading_time_minutes, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22, ?23)
         ON CONFLICT(kind, source_url) DO UPDATE SET
           job_id = excluded.job_id,
           title = excluded.title,
           creator = excluded.creator,
           category = excluded.category,
           difficulty = excluded.difficulty,
           signal_score = excluded.signal_score,
           summary = excluded.summary,
           summary_bullets = excluded.summary_bullets,
           topics = excluded.topics,
           tools = excluded.tools,
           best_for = excluded.best_for,
           teaches_agent_to = excluded.teaches_agent_to,
           prompt_template = excluded.prompt_template,
           execution_checklist = excluded.execution_checklist,
           agent_training_script = excluded.agent_training_script,
           word_count = excluded.word_count,
           reading_time_minutes = excluded.reading_time_minutes,
           content = excluded.content,
           updated_at = excluded.updated_at",
        params![
            entry.id,
            entry.source_url,
            entry.kind.as_str(),
            entry.job_id,
            entry.title,
            entry.creator,
            entry.category,
            entry.difficulty,
            entry.signal_score,
            entry.summary,
            entry.summary_bullets,
            topics,
            entry.tools,
            entry.best_for,
            entry.teaches_agent_to,
            entry.prompt_template,
            entry.execution_checklist,
            entry.agent_training_script,
            entry.word_count as i64,
            entry.reading_time_minutes,
            entry.content,
            format_timestamp(&entry.created_at),
            format_timestamp(&entry.updated_at),
        ],
    )?;

    find_by_source_in(conn, entry.kind, &entry.source_url)?.ok_or_else(|| DatabaseError::Corrupt {
        id: entry.id.clone(),
        reason: "catalog entry missing after upsert".to_string(),
    })
}

/// Number of catalog entries.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM catalog_entries", [], |r| r.get(0))?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn sample_entry(source: &str, title: &str) -> CatalogEntry {
        let now = Utc::now();
        CatalogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            source_url: source.to_string(),
            kind: ContentKind::Video,
            job_id: "job-1".to_string(),
            title: title.to_string(),
            creator: "Unknown Creator".to_string(),
            category: "Automation Workflows".to_string(),
            difficulty: "Beginner".to_string(),
            signal_score: 70,
            summary: "summary".to_string(),
            summary_bullets: "• one".to_string(),
            topics: vec!["rust".to_string()],
            tools: "rust".to_string(),
            best_for: "People learning automation workflows".to_string(),
            teaches_agent_to: "x".to_string(),
            prompt_template: "y".to_string(),
            execution_checklist: "z".to_string(),
            agent_training_script: "w".to_string(),
            word_count: 1200,
            reading_time_minutes: None,
            content: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_upsert_inserts_then_updates_in_place() {
        let db = Database::open_in_memory().unwrap();
        let first = sample_entry("https://example.com/a", "First");
        let stored = db.with_conn(|conn| upsert_in(conn, &first)).unwrap();
        assert_eq!(stored.title, "First");

        let mut second = sample_entry("https://example.com/a", "Second");
        second.created_at = first.created_at + Duration::hours(1);
        second.updated_at = first.updated_at + Duration::hours(1);
        second.job_id = "job-2".to_string();
        let stored = db.with_conn(|conn| upsert_in(conn, &second)).unwrap();

        assert_eq!(count(&db).unwrap(), 1);
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.title, "Second");
        assert_eq!(stored.job_id, "job-2");
        assert_eq!(
            crate::db::format_timestamp(&stored.created_at),
            crate::db::format_timestamp(&first.created_at)
        );
        assert_eq!(
            crate::db::format_timestamp(&stored.updated_at),
            crate::db::format_timestamp(&second.updated_at)
        );
    }

    #[test]
    fn test_find_by_source() {
        let db = Database::open_in_memory().unwrap();
        assert!(find_by_source(&db, ContentKind::Video, "https://example.com/none")
            .unwrap()
            .is_none());

        let entry = sample_entry("https://example.com/b", "B");
        db.with_conn(|conn| upsert_in(conn, &entry)).unwrap();
        let found = find_by_source(&db, ContentKind::Video, "https://example.com/b")
            .unwrap()
            .unwrap();
        assert_eq!(found.topics, vec!["rust".to_string()]);
        assert_eq!(found.signal_score, 70);
        assert!(find_by_source(&db, ContentKind::Article, "https://example.com/b")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_same_source_keeps_one_entry_per_kind() {
        let db = Database::open_in_memory().unwrap();
        let video = sample_entry("https://example.com/talk", "Talk");
        let mut article = sample_entry("https://example.com/talk", "Talk notes");
        article.kind = ContentKind::Article;
        article.job_id = "job-2".to_string();

        db.with_conn(|conn| upsert_in(conn, &video)).unwrap();
        db.with_conn(|conn| upsert_in(conn, &article)).unwrap();
        assert_eq!(count(&db).unwrap(), 2);

        let stored_video = find_by_source(&db, ContentKind::Video, "https://example.com/talk")
            .unwrap()
            .unwrap();
        assert_eq!(stored_video.id, video.id);
        assert_eq!(stored_video.job_id, "job-1");
        assert_eq!(stored_video.title, "Talk");

        let stored_article = find_by_source(&db, ContentKind::Article, "https://example.com/talk")
            .unwrap()
            .unwrap();
        assert_eq!(stored_article.id, article.id);
        assert_eq!(stored_article.job_id, "job-2");
    }
}
