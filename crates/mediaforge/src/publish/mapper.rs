//! Pure mapping from a completed job to catalog fields.
//!
//! Nothing here performs I/O; the same job always maps to the same fields
//! apart from the entry id and timestamps.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::model::{CatalogEntry, ContentKind, EnrichedResult, Extraction, Job};
use crate::strategy::article::truncate_chars;

const DEFAULT_CREATOR: &str = "Unknown Creator";
const DEFAULT_ARTICLE_TITLE: &str = "Untitled Article";
const DEFAULT_SUMMARY: &str = "Transcript processed and ready for training use.";
const DEFAULT_TOOLS: &str = "Not specified";
const MAX_BULLETS: usize = 5;
const MAX_TOOLS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    SetupOnboarding,
    DebuggingFixes,
    PromptsTemplates,
    ToolingIntegrations,
    BusinessUseCases,
    AutomationWorkflows,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SetupOnboarding => "Setup & Onboarding",
            Category::DebuggingFixes => "Debugging & Fixes",
            Category::PromptsTemplates => "Prompts & Templates",
            Category::ToolingIntegrations => "Tooling & Integrations",
            Category::BusinessUseCases => "Business Use Cases",
            Category::AutomationWorkflows => "Automation Workflows",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static SETUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:setup\w*|install\w*|onboard\w*|getting\s+started)\b").unwrap()
});
static DEBUGGING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:debug\w*|errors?|fix|fixe[sd]|fixing|troubleshoot\w*)\b").unwrap()
});
static PROMPTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:prompt\w*|templates?)\b").unwrap());
static TOOLING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:notion|apis?|mcp|integrations?|tools?|tooling)\b").unwrap()
});
static BUSINESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:money|revenue|sales?|business(?:es)?)\b|\bmake\s*\$").unwrap()
});

/// First rule whose terms appear as whole words in the title, summary or
/// topics wins.
pub fn infer_category(title: &str, summary: &str, topics: &[String]) -> Category {
    let corpus = format!("{} {} {}", title, summary, topics.join(" ")).to_lowercase();
    let rules: [(&LazyLock<Regex>, Category); 5] = [
        (&SETUP, Category::SetupOnboarding),
        (&DEBUGGING, Category::DebuggingFixes),
        (&PROMPTS, Category::PromptsTemplates),
        (&TOOLING, Category::ToolingIntegrations),
        (&BUSINESS, Category::BusinessUseCases),
    ];

    rules
        .iter()
        .find(|(pattern, _)| pattern.is_match(&corpus))
        .map(|(_, category)| *category)
        .unwrap_or(Category::AutomationWorkflows)
}

pub fn infer_difficulty(word_count: usize) -> &'static str {
    if word_count >= 3500 {
        "Advanced"
    } else if word_count >= 1600 {
        "Intermediate"
    } else {
        "Beginner"
    }
}

/// Up to five `• ` bullets: key points first, then the summary if there
/// is room.
pub fn make_bullets(summary: &str, key_points: &[String]) -> String {
    let mut points: Vec<&str> = key_points
        .iter()
        .map(String::as_str)
        .filter(|p| !p.trim().is_empty())
        .take(MAX_BULLETS)
        .collect();
    if points.len() < MAX_BULLETS && !summary.trim().is_empty() {
        points.push(summary);
    }
    points
        .iter()
        .map(|p| format!("• {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn infer_signal_score(qa_pairs: usize, topics: usize, word_count: usize) -> u8 {
    let mut score: i64 = 65;
    score += (qa_pairs as i64 * 2).min(12);
    score += (topics as i64 * 2).min(10);
    if word_count > 1200 {
        score += 8;
    }
    if word_count > 2500 {
        score += 5;
    }
    score.clamp(1, 100) as u8
}

pub fn tools_from_topics(topics: &[String]) -> String {
    if topics.is_empty() {
        DEFAULT_TOOLS.to_string()
    } else {
        topics
            .iter()
            .take(MAX_TOOLS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn best_for(category: Category) -> String {
    format!("People learning {} workflows", category.as_str().to_lowercase())
}

pub fn teaches_agent_to(category: Category) -> String {
    match category {
        Category::SetupOnboarding => {
            "Guide a new user through installation and first-run configuration, checking each step before moving on."
        }
        Category::DebuggingFixes => {
            "Reproduce a reported problem, isolate its cause and apply the smallest fix that resolves it."
        }
        Category::PromptsTemplates => {
            "Adapt a proven prompt structure to a new goal and fill its placeholders from user context."
        }
        Category::ToolingIntegrations => {
            "Connect the tools described in the source and move data between them reliably."
        }
        Category::BusinessUseCases => {
            "Map the described workflow onto a concrete business outcome and measure the result."
        }
        Category::AutomationWorkflows => {
            "Break a repetitive task into automatable steps and run them in the right order."
        }
    }
    .to_string()
}

pub fn prompt_template(title: &str, category: Category, tools: &str) -> String {
    format!(
        "You are an assistant trained on \"{}\". Using {}, help me with a {} task. \
         Ask for my goal first, then apply the steps from the source in order and confirm the result.",
        title,
        tools,
        category.as_str().to_lowercase()
    )
}

pub fn execution_checklist(category: Category) -> String {
    let steps: [&str; 4] = match category {
        Category::SetupOnboarding => [
            "Confirm prerequisites and access",
            "Install and configure",
            "Run a first end-to-end test",
            "Record the working configuration",
        ],
        Category::DebuggingFixes => [
            "Reproduce the problem",
            "Narrow down the failing component",
            "Apply and verify the fix",
            "Document the root cause",
        ],
        Category::PromptsTemplates => [
            "Pick the template that matches the goal",
            "Fill in the placeholders",
            "Run it and review the output",
            "Refine and save the final prompt",
        ],
        Category::ToolingIntegrations => [
            "List the tools and credentials involved",
            "Connect one integration at a time",
            "Test data flow between tools",
            "Monitor the first real runs",
        ],
        Category::BusinessUseCases => [
            "Define the target outcome",
            "Map the workflow to that outcome",
            "Run a small pilot",
            "Measure and iterate",
        ],
        Category::AutomationWorkflows => [
            "Identify the repetitive task",
            "Split it into discrete steps",
            "Automate and chain the steps",
            "Verify results and schedule",
        ],
    };
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn agent_training_script(title: &str, bullets: &str, checklist: &str) -> String {
    format!(
        "Lesson: {}\n\nKey ideas:\n{}\n\nProcedure:\n{}\n\n\
         Practice: restate the key ideas in your own words, then run the procedure on a sample request.",
        title, bullets, checklist
    )
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Builds the full catalog entry for a completed job. The returned entry
/// carries a fresh id and `now` for both timestamps; on republish the
/// store keeps the original id and `created_at`.
pub fn build_entry(
    job: &Job,
    extraction: &Extraction,
    enrichment: &EnrichedResult,
    content_chars: usize,
    now: DateTime<Utc>,
) -> CatalogEntry {
    let title = non_blank(job.metadata.title.as_deref())
        .or_else(|| non_blank(extraction.title.as_deref()))
        .map(str::to_string)
        .unwrap_or_else(|| match job.kind {
            ContentKind::Video => format!("Training Video ({})", job.short_id()),
            ContentKind::Article => DEFAULT_ARTICLE_TITLE.to_string(),
        });
    let creator = non_blank(job.metadata.creator.as_deref())
        .or_else(|| non_blank(extraction.author.as_deref()))
        .unwrap_or(DEFAULT_CREATOR)
        .to_string();
    let summary = non_blank(Some(&enrichment.summary))
        .unwrap_or(DEFAULT_SUMMARY)
        .to_string();

    let category = infer_category(&title, &summary, &enrichment.topics);
    let bullets = make_bullets(&summary, &enrichment.key_points);
    let tools = tools_from_topics(&enrichment.topics);
    let checklist = execution_checklist(category);
    let content = match job.kind {
        ContentKind::Article => Some(truncate_chars(&extraction.text, content_chars)),
        ContentKind::Video => None,
    };

    CatalogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        source_url: job.source_url.clone(),
        kind: job.kind,
        job_id: job.id.clone(),
        category: category.as_str().to_string(),
        difficulty: infer_difficulty(extraction.word_count).to_string(),
        signal_score: infer_signal_score(
            enrichment.qa_pairs.len(),
            enrichment.topics.len(),
            extraction.word_count,
        ),
        teaches_agent_to: teaches_agent_to(category),
        prompt_template: prompt_template(&title, category, &tools),
        agent_training_script: agent_training_script(&title, &bullets, &checklist),
        execution_checklist: checklist,
        best_for: best_for(category),
        summary_bullets: bullets,
        topics: enrichment.topics.clone(),
        tools,
        title,
        creator,
        summary,
        word_count: extraction.word_count,
        reading_time_minutes: extraction.reading_time_minutes,
        content,
        created_at: now,
        updated_at: now,
    }
}
