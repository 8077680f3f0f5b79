use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::ContentKind;

/// Published, searchable artifact derived from a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub source_url: String,
    pub kind: ContentKind,
    /// Job whose completion produced the current field values.
    pub job_id: String,
    pub title: String,
    pub creator: String,
    pub category: String,
    pub difficulty: String,
    pub signal_score: u8,
    pub summary: String,
    pub summary_bullets: String,
    pub topics: Vec<String>,
    pub tools: String,
    pub best_for: String,
    pub teaches_agent_to: String,
    pub prompt_template: String,
    pub execution_checklist: String,
    pub agent_training_script: String,
    pub word_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_time_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
