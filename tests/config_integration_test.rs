//! Integration tests for configuration loading and validation
//!
//! Note: Tests that modify environment variables should be run with --test-threads=1
//! to avoid interference between tests.

use dwca_publisher::config::load_config;
use secrecy::ExposeSecret;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn cleanup_env_vars() {
    for name in [
        "DWCA_APPLICATION_LOG_LEVEL",
        "DWCA_ARCHIVE_EXPORT_FOLDER",
        "DWCA_ARCHIVE_INCLUDE_EVENT_ARCHIVES",
        "DWCA_PUBLICATION_BATCH_SIZE",
        "DWCA_SEARCH_URL",
        "DWCA_SEARCH_PASSWORD",
        "TEST_DWCA_SEARCH_PASSWORD",
    ] {
        std::env::remove_var(name);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[application]
log_level = "debug"

[archive]
export_folder = "/srv/dwca/export"
working_folder = "/srv/dwca/work"
combined_bundle_name = "sweden-all"
include_event_archives = false
compression_level = 9

[publication]
batch_size = 2500
parallel_batches = 8

[search]
url = "https://search.example.org:9200"
index = "observations-v2"
username = "publisher"
password = "plain-text"
page_size = 1000
keep_alive = "10m"
timeout_seconds = 120

[search.retry]
max_retries = 5
initial_delay_ms = 250

[storage]
root = "/srv/dwca/store"

[logging]
local_enabled = false
local_path = "/tmp/dwca"
local_rotation = "hourly"
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "debug");

    assert_eq!(config.archive.export_folder, PathBuf::from("/srv/dwca/export"));
    assert_eq!(config.archive.working_folder, PathBuf::from("/srv/dwca/work"));
    assert_eq!(config.archive.combined_bundle_name, "sweden-all");
    assert!(!config.archive.include_event_archives);
    assert_eq!(config.archive.compression_level, Some(9));

    assert_eq!(config.publication.batch_size, 2500);
    assert_eq!(config.publication.parallel_batches, 8);

    let search = config.search.expect("search section");
    assert_eq!(search.url, "https://search.example.org:9200");
    assert_eq!(search.index, "observations-v2");
    assert_eq!(search.username.as_deref(), Some("publisher"));
    assert_eq!(
        search.password.as_ref().map(|p| p.expose_secret().as_ref().to_string()),
        Some("plain-text".to_string())
    );
    assert_eq!(search.page_size, 1000);
    assert_eq!(search.keep_alive, "10m");
    assert_eq!(search.timeout_seconds, 120);
    assert_eq!(search.retry.max_retries, 5);
    assert_eq!(search.retry.initial_delay_ms, 250);
    assert_eq!(search.retry.max_delay_ms, 30000);

    assert_eq!(config.storage.root, PathBuf::from("/srv/dwca/store"));

    assert!(!config.logging.local_enabled);
    assert_eq!(config.logging.local_rotation, "hourly");
}

#[test]
fn test_load_minimal_config_with_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[archive]

[storage]
root = "./store"
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.archive.export_folder, PathBuf::from("./dwca-export"));
    assert_eq!(config.archive.working_folder, PathBuf::from("./dwca-work"));
    assert_eq!(config.archive.combined_bundle_name, "all");
    assert!(config.archive.include_event_archives);
    assert!(config.archive.compression_level.is_none());
    assert_eq!(config.publication.batch_size, 10000);
    assert_eq!(config.publication.parallel_batches, 4);
    assert!(config.search.is_none());
    assert!(config.logging.local_enabled);
    assert_eq!(config.logging.local_rotation, "daily");
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_DWCA_SEARCH_PASSWORD", "secret_pass");

    let temp_file = write_config(
        r#"
[archive]

[search]
url = "http://localhost:9200"
index = "observations"
username = "elastic"
password = "${TEST_DWCA_SEARCH_PASSWORD}"

[storage]
root = "./store"
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");
    let password = config.search.unwrap().password.unwrap();
    assert_eq!(password.expose_secret().as_ref(), "secret_pass");

    cleanup_env_vars();
}

#[test]
fn test_missing_substitution_variable_fails() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[archive]

[search]
url = "http://localhost:9200"
index = "observations"
username = "elastic"
password = "${TEST_DWCA_SEARCH_PASSWORD}"

[storage]
root = "./store"
"#,
    );

    let err = load_config(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("TEST_DWCA_SEARCH_PASSWORD"));
}

#[test]
fn test_env_var_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("DWCA_APPLICATION_LOG_LEVEL", "trace");
    std::env::set_var("DWCA_ARCHIVE_EXPORT_FOLDER", "/override/export");
    std::env::set_var("DWCA_ARCHIVE_INCLUDE_EVENT_ARCHIVES", "false");
    std::env::set_var("DWCA_PUBLICATION_BATCH_SIZE", "2000");
    std::env::set_var("DWCA_SEARCH_URL", "http://search:9200");
    std::env::set_var("DWCA_SEARCH_PASSWORD", "from-env");

    let temp_file = write_config(
        r#"
[application]
log_level = "info"

[archive]
export_folder = "/srv/dwca/export"

[publication]
batch_size = 500

[search]
url = "http://localhost:9200"
index = "observations"
username = "elastic"

[storage]
root = "./store"
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "trace");
    assert_eq!(config.archive.export_folder, PathBuf::from("/override/export"));
    assert!(!config.archive.include_event_archives);
    assert_eq!(config.publication.batch_size, 2000);
    let search = config.search.unwrap();
    assert_eq!(search.url, "http://search:9200");
    assert_eq!(search.password.unwrap().expose_secret().as_ref(), "from-env");

    cleanup_env_vars();
}

#[test]
fn test_invalid_override_value_fails() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("DWCA_PUBLICATION_BATCH_SIZE", "lots");

    let temp_file = write_config("[archive]\n\n[storage]\nroot = \"./store\"\n");
    let err = load_config(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("DWCA_PUBLICATION_BATCH_SIZE"));

    cleanup_env_vars();
}

#[test]
fn test_invalid_config_validation() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[application]
log_level = "loud"

[archive]

[storage]
root = "./store"
"#,
    );

    let err = load_config(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("log_level"));
}

#[test]
fn test_same_export_and_working_folder_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[archive]
export_folder = "/srv/dwca"
working_folder = "/srv/dwca"

[storage]
root = "./store"
"#,
    );

    assert!(load_config(temp_file.path()).is_err());
}
