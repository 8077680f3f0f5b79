use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info_span, Instrument};

use crate::config::LimitsConfig;
use crate::model::{Extraction, JobStatus};
use crate::sanitize;
use crate::services::{count_words, ArticleFetcher, PageDocument};

use super::backoff::{retry_transient, RetryPolicy};
use super::{AttemptContext, ExtractionStrategy, FailureKind, StrategyFailure, StrategyId};

const TITLE_SELECTORS: &[&str] = &[
    "h1.entry-title",
    "h1.post-title",
    "h1.article-title",
    ".post-header h1",
    "article h1",
    "h1",
    "title",
];

const CONTENT_SELECTORS: &[&str] = &[
    "article .entry-content",
    "article .post-content",
    ".article-content",
    ".post-body",
    "main article",
    "article",
    ".content",
];

const AUTHOR_SELECTORS: &[&str] = &[
    ".author-name",
    ".byline",
    ".post-author",
    "[rel=\"author\"]",
    ".author",
];

const DEFAULT_TITLE: &str = "Untitled Article";
const WORDS_PER_MINUTE: f64 = 200.0;

/// Fetches an article page and pulls title, author and body text out of it.
pub struct ArticleScrapeStrategy {
    articles: Arc<dyn ArticleFetcher>,
    policy: RetryPolicy,
    timeout: Duration,
    body_chars: usize,
    min_content_chars: usize,
}

impl ArticleScrapeStrategy {
    pub fn new(
        articles: Arc<dyn ArticleFetcher>,
        policy: RetryPolicy,
        timeout: Duration,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            articles,
            policy,
            timeout,
            body_chars: limits.article_body_chars,
            min_content_chars: limits.article_min_content_chars,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for ArticleScrapeStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::ArticleScrape
    }

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<Extraction, StrategyFailure> {
        let id = self.id();
        let url = &ctx.job.submitted_url;

        ctx.stages
            .enter(JobStatus::Processing)
            .map_err(|e| StrategyFailure::from_stage(id, e))?;

        let page = retry_transient(&self.policy, self.timeout, "article fetch", || {
            self.articles.fetch(url)
        })
        .instrument(info_span!("article_fetch", url = %sanitize::redact_url(url)))
        .await
        .map_err(|e| StrategyFailure::from_service(id, &e))?;

        let scraped = scrape(page.as_ref(), self.min_content_chars, self.body_chars);
        if scraped.body.is_empty() {
            return Err(StrategyFailure::new(
                id,
                FailureKind::ExtractionFailed,
                "page contains no readable text",
            ));
        }

        let word_count = count_words(&scraped.body);
        debug!(word_count, title = %scraped.title, "Article scraped");

        Ok(Extraction {
            text: scraped.body,
            segments: vec![],
            word_count,
            duration_seconds: None,
            method: id,
            language: None,
            title: Some(scraped.title),
            author: scraped.author,
            reading_time_minutes: Some(reading_time_minutes(word_count)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedArticle {
    pub title: String,
    pub author: Option<String>,
    pub body: String,
}

/// Selector-priority extraction. The first content selector yielding at
/// least `min_content_chars` wins; otherwise the whole body is used.
pub fn scrape(page: &dyn PageDocument, min_content_chars: usize, max_body_chars: usize) -> ScrapedArticle {
    let title = first_match(page, TITLE_SELECTORS).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let author = first_match(page, AUTHOR_SELECTORS);

    let body = CONTENT_SELECTORS
        .iter()
        .filter_map(|selector| page.select_text(selector))
        .find(|text| text.chars().count() >= min_content_chars)
        .unwrap_or_else(|| page.body_text());

    ScrapedArticle {
        title,
        author,
        body: truncate_chars(&body, max_body_chars),
    }
}

fn first_match(page: &dyn PageDocument, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|selector| page.select_text(selector))
        .find(|text| !text.is_empty())
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// `max(1, round(words / 200))`.
pub fn reading_time_minutes(word_count: usize) -> u32 {
    let minutes = (word_count as f64 / WORDS_PER_MINUTE).round() as u32;
    minutes.max(1)
}
