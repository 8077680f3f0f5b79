pub mod broadcast;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod recovery;
pub mod resolver;
pub mod sanitize;
pub mod service;
pub mod services;
pub mod storage;
pub mod strategy;
pub mod worker;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, MediaforgeError, RecoveryError, Result, StorageError, ValidationError,
    WorkerError,
};
pub use model::{CatalogEntry, ContentKind, Job, JobStatus, Tier};
pub use pipeline::{Pipeline, PipelineContext, RunOutcome};
pub use recovery::{BulkRecoveryResult, HealthReport, HealthStatus, JobStats, RecoveryItem};
pub use service::{IngestService, JobStatusView, SubmitOutcome, SubmitRequest};
pub use services::Services;
