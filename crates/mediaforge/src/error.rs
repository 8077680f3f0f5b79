use std::path::PathBuf;
use thiserror::Error;

use crate::model::JobStatus;

#[derive(Error, Debug)]
pub enum MediaforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Submission-time rejections. A job is never created when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid source URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Unknown tier '{0}' (expected basic, detailed or bulk)")]
    InvalidTier(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove directory '{path}': {source}")]
    RemoveDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker queue closed")]
    ChannelClosed,

    #[error("Job failed: {0}")]
    JobFailed(String),
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} cannot be retried from status '{status}'")]
    NotRetryable { job_id: String, status: JobStatus },

    #[error("Job {job_id} changed while being reset")]
    Conflict { job_id: String },

    #[error("Failed to re-enqueue job {job_id}: {source}")]
    Enqueue {
        job_id: String,
        #[source]
        source: WorkerError,
    },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, MediaforgeError>;
