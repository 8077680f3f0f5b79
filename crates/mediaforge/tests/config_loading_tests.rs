//! Table-driven tests for configuration files on disk.

mod common;

use assert_fs::prelude::*;
use assert_fs::TempDir;

use mediaforge::config::load_config;
use mediaforge::db::Database;
use mediaforge::{ConfigError, IngestService, SubmitRequest};

use common::FakeServices;

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "tuned_recovery",
        config_json: r#"{
            "version": "1.0",
            "workers": { "count": 2, "queue_capacity": 8 },
            "recovery": {
                "downloading_stuck_minutes": 45,
                "processing_stuck_minutes": 20,
                "default_max_retries": 5,
                "file_cleanup_days": 1
            }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "negative_timeout",
        config_json: r#"{ "version": "1.0", "timeouts": { "caption_secs": -1 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_stuck_threshold",
        config_json: r#"{ "version": "1.0", "recovery": { "processing_stuck_minutes": 0 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "inverted_media_limits",
        config_json: r#"{
            "version": "1.0",
            "limits": { "min_media_bytes": 2048, "max_media_bytes": 1024 }
        }"#,
        should_succeed: false,
        expected_error: Some("min_media_bytes"),
    },
    ConfigTestCase {
        name: "bad_log_directive",
        config_json: r#"{ "version": "1.0", "logging": { "level": "mediaforge=verbose" } }"#,
        should_succeed: false,
        expected_error: Some("logging.level"),
    },
];

#[test]
fn test_config_files() {
    let temp = TempDir::new().unwrap();

    for case in CONFIG_TESTS {
        let file = temp.child(format!("{}.json", case.name));
        file.write_str(case.config_json).unwrap();

        let result = load_config(file.path());
        match (case.should_succeed, result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("{}: expected success, got {}", case.name, e),
            (false, Ok(_)) => panic!("{}: expected failure", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "{}: '{}' does not mention '{}'",
                        case.name,
                        e,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_missing_config_file() {
    let temp = TempDir::new().unwrap();
    let result = load_config(temp.child("absent.json").path());
    assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
}

#[tokio::test]
async fn test_service_starts_from_config_file() {
    let temp = TempDir::new().unwrap();
    let work = temp.child("work");
    let db_path = temp.child("data/jobs.db");

    let config_file = temp.child("mediaforge.json");
    config_file
        .write_str(&format!(
            r#"{{
                "version": "1.0",
                "storage": {{ "work_directory": "{}", "database_path": "{}" }},
                "workers": {{ "count": 1 }},
                "retry": {{ "max_attempts": 1, "base_delay_ms": 1, "max_delay_ms": 1 }},
                "recovery": {{ "file_cleanup_days": 1 }}
            }}"#,
            work.path().display(),
            db_path.path().display()
        ))
        .unwrap();

    let config = load_config(config_file.path()).unwrap();
    let db = Database::open(std::path::Path::new(&config.storage.database_path)).unwrap();
    let service = IngestService::start(config, db, FakeServices::healthy().services())
        .await
        .unwrap();

    assert!(work.path().is_dir());
    assert!(db_path.path().exists());

    let outcome = service
        .submit(SubmitRequest::article("https://blog.example.com/posts/one"))
        .await
        .unwrap();
    assert!(outcome.job_id().is_some());

    service.drain().await;
}
