//! Enrichment stage: summary, key points, Q&A and topics from extracted text.
//!
//! Never fails. A malformed answer or an unreachable service yields a fixed
//! fallback payload marked `degraded`.

pub mod normalize;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info_span, warn, Instrument};

use crate::config::Config;
use crate::model::{EnrichedResult, Tier, MAX_TOPICS};
use crate::services::{EnrichmentRequest, TextEnrichmentService};
use crate::strategy::article::truncate_chars;
use crate::strategy::backoff::{retry_transient, RetryPolicy};

pub use normalize::{normalize, strip_code_fences, unavailable_fallback, unparsable_fallback};

pub struct Enricher {
    service: Arc<dyn TextEnrichmentService>,
    policy: RetryPolicy,
    timeout: Duration,
    input_chars: usize,
}

impl Enricher {
    pub fn new(service: Arc<dyn TextEnrichmentService>, config: &Config) -> Self {
        Self {
            service,
            policy: RetryPolicy::from_config(&config.retry),
            timeout: config.timeouts.enrichment(),
            input_chars: config.limits.enrichment_input_chars,
        }
    }

    pub fn request_for(&self, text: &str, tier: Tier) -> EnrichmentRequest {
        EnrichmentRequest {
            text: truncate_chars(text, self.input_chars),
            tier,
            max_key_points: tier.max_key_points(),
            max_qa_pairs: tier.max_qa_pairs(),
            max_topics: MAX_TOPICS,
        }
    }

    pub async fn enrich(&self, text: &str, tier: Tier) -> EnrichedResult {
        let request = self.request_for(text, tier);
        let model = self.service.model_name().to_string();

        let response = retry_transient(&self.policy, self.timeout, "enrichment", || {
            self.service.enhance(&request)
        })
        .instrument(info_span!("enrichment_call", model = %model, tier = %tier))
        .await;

        match response {
            Ok(raw) => match normalize(&raw, tier, &model) {
                Some(result) => result,
                None => {
                    warn!(model = %model, "Enrichment response was not valid JSON, using fallback");
                    unparsable_fallback(&model)
                }
            },
            Err(e) => {
                warn!(model = %model, "Enrichment service unavailable, using fallback: {}", e);
                unavailable_fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: Result<String, ServiceError>,
        seen: Mutex<Option<EnrichmentRequest>>,
    }

    impl Canned {
        fn new(reply: Result<&str, ServiceError>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TextEnrichmentService for Canned {
        async fn enhance(&self, request: &EnrichmentRequest) -> Result<String, ServiceError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            self.reply.clone()
        }

        fn model_name(&self) -> &str {
            "canned-model"
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.retry.max_attempts = 1;
        config.retry.base_delay_ms = 0;
        config.retry.max_delay_ms = 0;
        config.limits.enrichment_input_chars = 10;
        config
    }

    #[tokio::test]
    async fn test_enrich_parses_fenced_json() {
        let service = Canned::new(Ok(
            "```json\n{\"summary\":\"Good\",\"key_points\":[\"a\"],\"qa_pairs\":[],\"topics\":[\"rust\"]}\n```",
        ));
        let enricher = Enricher::new(service.clone(), &config());
        let result = enricher.enrich("some transcript text here", Tier::Basic).await;

        assert_eq!(result.summary, "Good");
        assert_eq!(result.topics, vec!["rust".to_string()]);
        assert_eq!(result.processing_model, "canned-model");
        assert!(!result.degraded);

        let seen = service.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.text, "some trans");
        assert_eq!(seen.max_key_points, 5);
    }

    #[tokio::test]
    async fn test_unparsable_reply_uses_fallback() {
        let enricher = Enricher::new(Canned::new(Ok("definitely not json")), &config());
        let result = enricher.enrich("text", Tier::Detailed).await;
        assert!(result.degraded);
        assert_eq!(
            result.summary,
            "AI analysis completed but structured data parsing failed."
        );
    }

    #[tokio::test]
    async fn test_service_failure_uses_unavailable_fallback() {
        let enricher = Enricher::new(
            Canned::new(Err(ServiceError::Transient("503".into()))),
            &config(),
        );
        let result = enricher.enrich("text", Tier::Basic).await;
        assert!(result.degraded);
        assert_eq!(result.processing_model, "fallback");
    }
}
