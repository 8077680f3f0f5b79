pub mod context;
pub mod error;
pub mod progress;
pub mod runner;
pub mod stages;

pub use context::PipelineContext;
pub use error::PipelineError;
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{Pipeline, RunOutcome};
pub use stages::DbStageSink;
