use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            storage: StorageConfig::default(),
            workers: WorkersConfig::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutsConfig::default(),
            limits: LimitsConfig::default(),
            recovery: RecoveryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the per-job scratch area.
    #[serde(default = "default_work_directory")]
    pub work_directory: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_work_directory() -> String {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .map(|p| {
            p.join("mediaforge")
                .join("work")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| {
            std::env::temp_dir()
                .join("mediaforge")
                .join("work")
                .to_string_lossy()
                .to_string()
        })
}

fn default_database_path() -> String {
    crate::db::default_database_path()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "mediaforge.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_directory: default_work_directory(),
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Strategy-level retry of transient external failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_caption_secs")]
    pub caption_secs: u64,
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,
    #[serde(default = "default_transcribe_secs")]
    pub transcribe_secs: u64,
    #[serde(default = "default_enrichment_secs")]
    pub enrichment_secs: u64,
    #[serde(default = "default_article_secs")]
    pub article_secs: u64,
}

fn default_caption_secs() -> u64 {
    30
}

fn default_download_secs() -> u64 {
    300
}

fn default_transcribe_secs() -> u64 {
    600
}

fn default_enrichment_secs() -> u64 {
    120
}

fn default_article_secs() -> u64 {
    30
}

impl TimeoutsConfig {
    pub fn caption(&self) -> Duration {
        Duration::from_secs(self.caption_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn transcribe(&self) -> Duration {
        Duration::from_secs(self.transcribe_secs)
    }

    pub fn enrichment(&self) -> Duration {
        Duration::from_secs(self.enrichment_secs)
    }

    pub fn article(&self) -> Duration {
        Duration::from_secs(self.article_secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            caption_secs: default_caption_secs(),
            download_secs: default_download_secs(),
            transcribe_secs: default_transcribe_secs(),
            enrichment_secs: default_enrichment_secs(),
            article_secs: default_article_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest media payload accepted for transcription.
    #[serde(default = "default_max_media_bytes")]
    pub max_media_bytes: u64,
    /// Anything smaller is treated as a broken download.
    #[serde(default = "default_min_media_bytes")]
    pub min_media_bytes: u64,
    #[serde(default = "default_enrichment_input_chars")]
    pub enrichment_input_chars: usize,
    #[serde(default = "default_article_body_chars")]
    pub article_body_chars: usize,
    #[serde(default = "default_article_min_content_chars")]
    pub article_min_content_chars: usize,
    #[serde(default = "default_catalog_content_chars")]
    pub catalog_content_chars: usize,
}

fn default_max_media_bytes() -> u64 {
    25 * 1024 * 1024
}

fn default_min_media_bytes() -> u64 {
    1024
}

fn default_enrichment_input_chars() -> usize {
    3000
}

fn default_article_body_chars() -> usize {
    10_000
}

fn default_article_min_content_chars() -> usize {
    500
}

fn default_catalog_content_chars() -> usize {
    8000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_media_bytes: default_max_media_bytes(),
            min_media_bytes: default_min_media_bytes(),
            enrichment_input_chars: default_enrichment_input_chars(),
            article_body_chars: default_article_body_chars(),
            article_min_content_chars: default_article_min_content_chars(),
            catalog_content_chars: default_catalog_content_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_downloading_stuck_minutes")]
    pub downloading_stuck_minutes: i64,
    /// Threshold for transcribing, enhancing and article processing.
    #[serde(default = "default_processing_stuck_minutes")]
    pub processing_stuck_minutes: i64,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    #[serde(default = "default_recent_failure_hours")]
    pub recent_failure_hours: i64,
    #[serde(default = "default_file_cleanup_days")]
    pub file_cleanup_days: u64,
}

fn default_downloading_stuck_minutes() -> i64 {
    30
}

fn default_processing_stuck_minutes() -> i64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_recent_failure_hours() -> i64 {
    24
}

fn default_file_cleanup_days() -> u64 {
    7
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            downloading_stuck_minutes: default_downloading_stuck_minutes(),
            processing_stuck_minutes: default_processing_stuck_minutes(),
            default_max_retries: default_max_retries(),
            recent_failure_hours: default_recent_failure_hours(),
            file_cleanup_days: default_file_cleanup_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
