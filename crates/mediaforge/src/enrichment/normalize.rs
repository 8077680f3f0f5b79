//! Lenient parsing of generative-model output into an [`EnrichedResult`].

use serde::Deserialize;

use crate::model::{EnrichedResult, QaPair, Tier, MAX_TOPICS};

const MISSING_SUMMARY: &str = "Summary not available";

#[derive(Debug, Default, Deserialize)]
struct RawEnrichment {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default, alias = "keyPoints")]
    key_points: Vec<String>,
    #[serde(default, alias = "qaPairs", alias = "qa")]
    qa_pairs: Vec<RawQa>,
    #[serde(default, alias = "tags")]
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawQa {
    #[serde(default, alias = "q")]
    question: String,
    #[serde(default, alias = "a")]
    answer: String,
}

/// Removes a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[start + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the first newline.
    let body = match after_fence.find('\n') {
        Some(nl) if !after_fence[..nl].trim().starts_with('{') => &after_fence[nl + 1..],
        _ => after_fence,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parses and caps a model response. `None` means the response was not a
/// usable JSON object.
pub fn normalize(raw: &str, tier: Tier, model: &str) -> Option<EnrichedResult> {
    let body = strip_code_fences(raw);
    let object = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if end > start => &body[start..=end],
        _ => return None,
    };
    let parsed: RawEnrichment = serde_json::from_str(object).ok()?;

    let summary = parsed
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| MISSING_SUMMARY.to_string());

    Some(EnrichedResult {
        summary,
        key_points: clean_list(parsed.key_points, tier.max_key_points()),
        qa_pairs: parsed
            .qa_pairs
            .into_iter()
            .map(|qa| QaPair {
                question: qa.question.trim().to_string(),
                answer: qa.answer.trim().to_string(),
            })
            .filter(|qa| !qa.question.is_empty() && !qa.answer.is_empty())
            .take(tier.max_qa_pairs())
            .collect(),
        topics: clean_list(parsed.topics, MAX_TOPICS),
        processing_model: model.to_string(),
        degraded: false,
    })
}

fn clean_list(items: Vec<String>, cap: usize) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(cap)
        .collect()
}

/// Substituted when the service answered but the answer could not be parsed.
pub fn unparsable_fallback(model: &str) -> EnrichedResult {
    EnrichedResult {
        summary: "AI analysis completed but structured data parsing failed.".to_string(),
        key_points: vec![
            "Content analysis".to_string(),
            "Transcript processing".to_string(),
            "AI enhancement".to_string(),
        ],
        qa_pairs: vec![QaPair::new(
            "What was discussed?",
            "The content covers various topics from the video transcript.",
        )],
        topics: vec![
            "video".to_string(),
            "content".to_string(),
            "analysis".to_string(),
        ],
        processing_model: model.to_string(),
        degraded: true,
    }
}

/// Substituted when the service could not be reached at all.
pub fn unavailable_fallback() -> EnrichedResult {
    EnrichedResult {
        summary: "AI enhancement temporarily unavailable. Raw transcript available.".to_string(),
        key_points: vec![
            "Transcript processed".to_string(),
            "Content available".to_string(),
            "AI enhancement pending".to_string(),
        ],
        qa_pairs: vec![QaPair::new(
            "What content is available?",
            "The video transcript has been processed and is available for download.",
        )],
        topics: vec![
            "video".to_string(),
            "transcript".to_string(),
            "processing".to_string(),
        ],
        processing_model: "fallback".to_string(),
        degraded: true,
    }
}
