pub mod pool;

pub use pool::{QueuedJob, WorkerPool};
