use crate::model::{EnrichedResult, Extraction, Job};
use crate::strategy::StrategyId;

/// State carried through one pipeline run.
pub struct PipelineContext {
    // Input, as loaded when the run started
    pub job: Job,

    // Resolver output
    pub order: Vec<StrategyId>,

    // Set once a strategy succeeds
    pub extraction: Option<Extraction>,

    // Set once enrichment returns (real or fallback)
    pub enrichment: Option<EnrichedResult>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            order: Vec::new(),
            extraction: None,
            enrichment: None,
        }
    }
}
