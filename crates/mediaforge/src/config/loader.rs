use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.workers.count == 0 {
        return Err(ConfigError::Validation {
            message: "workers.count must be greater than 0".to_string(),
        });
    }

    if config.workers.queue_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "workers.queue_capacity must be greater than 0".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.max_delay_ms ({}) is smaller than retry.base_delay_ms ({})",
                config.retry.max_delay_ms, config.retry.base_delay_ms
            ),
        });
    }

    if config.limits.min_media_bytes >= config.limits.max_media_bytes {
        return Err(ConfigError::Validation {
            message: "limits.min_media_bytes must be below limits.max_media_bytes".to_string(),
        });
    }

    if config.recovery.processing_stuck_minutes <= 0
        || config.recovery.downloading_stuck_minutes <= 0
    {
        return Err(ConfigError::Validation {
            message: "stuck thresholds must be positive".to_string(),
        });
    }

    if tracing_subscriber::EnvFilter::try_new(&config.logging.level).is_err() {
        return Err(ConfigError::Validation {
            message: format!("Invalid logging.level directive: {}", config.logging.level),
        });
    }

    Ok(())
}
