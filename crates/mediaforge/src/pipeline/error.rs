use thiserror::Error;

use crate::model::JobStatus;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} is '{status}', only pending jobs can run")]
    NotPending { job_id: String, status: JobStatus },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}
