pub mod catalog;
pub mod job;
pub mod status;

pub use catalog::CatalogEntry;
pub use job::{EnrichedResult, Extraction, Job, JobMetadata, QaPair, Segment, Tier, MAX_TOPICS};
pub use status::{
    progress_message, recovery_transition, transition, ContentKind, JobStatus, TransitionError,
    ALL_STATUSES,
};
