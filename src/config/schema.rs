//! Configuration schema types
//!
//! This module defines the configuration structure that maps to the TOML file.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Bundle locations and assembly settings
    pub archive: ArchiveConfig,

    /// How the `publish` command feeds the coordinator
    #[serde(default)]
    pub publication: PublicationConfig,

    /// Search backend (required by the `export` command only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchConfig>,

    /// Provider store and publication records
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PublisherConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns a readable message naming the first invalid setting
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.archive.validate()?;
        self.publication.validate()?;
        if let Some(ref search) = self.search {
            search.validate()?;
        }
        self.storage.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Bundle locations and assembly settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Where published bundles live
    #[serde(default = "default_export_folder")]
    pub export_folder: PathBuf,

    /// Scratch space for batch files and staged bundles
    #[serde(default = "default_working_folder")]
    pub working_folder: PathBuf,

    /// File stem of the bundle combining every generated source
    #[serde(default = "default_combined_bundle_name")]
    pub combined_bundle_name: String,

    /// Build event-core bundles for sources that emit event records
    #[serde(default = "default_true")]
    pub include_event_archives: bool,

    /// Deflate level 0-9; the zip default when unset
    #[serde(default)]
    pub compression_level: Option<i64>,
}

impl ArchiveConfig {
    fn validate(&self) -> Result<(), String> {
        if self.export_folder.as_os_str().is_empty() {
            return Err("archive.export_folder cannot be empty".to_string());
        }
        if self.working_folder.as_os_str().is_empty() {
            return Err("archive.working_folder cannot be empty".to_string());
        }
        if self.export_folder == self.working_folder {
            return Err("archive.export_folder and archive.working_folder must differ".to_string());
        }

        let name = &self.combined_bundle_name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!(
                "archive.combined_bundle_name '{name}' must be non-empty and use only letters, digits, '-' or '_'"
            ));
        }

        if let Some(level) = self.compression_level {
            if !(0..=9).contains(&level) {
                return Err(format!(
                    "archive.compression_level must be between 0 and 9, got {level}"
                ));
            }
        }
        Ok(())
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            export_folder: default_export_folder(),
            working_folder: default_working_folder(),
            combined_bundle_name: default_combined_bundle_name(),
            include_event_archives: true,
            compression_level: None,
        }
    }
}

/// Batching of the `publish` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationConfig {
    /// Observations per `write_batch` call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent `write_batch` callers
    #[serde(default = "default_parallel_batches")]
    pub parallel_batches: usize,
}

impl PublicationConfig {
    fn validate(&self) -> Result<(), String> {
        if !(1..=100_000).contains(&self.batch_size) {
            return Err(format!(
                "publication.batch_size must be between 1 and 100000, got {}",
                self.batch_size
            ));
        }
        if self.parallel_batches == 0 || self.parallel_batches > 64 {
            return Err(format!(
                "publication.parallel_batches must be between 1 and 64, got {}",
                self.parallel_batches
            ));
        }
        Ok(())
    }
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parallel_batches: default_parallel_batches(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Elasticsearch connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the cluster
    pub url: String,

    /// Observation index (or alias)
    pub index: String,

    #[serde(default)]
    pub username: Option<String>,

    /// Stored securely in memory and zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Hits per page of a full export
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Point-in-time keep-alive, e.g. "5m"
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl SearchConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if self.url.is_empty() {
            return Err("search.url cannot be empty".to_string());
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("search.url must start with http:// or https://".to_string());
        }
        if self.index.is_empty() {
            return Err("search.index cannot be empty".to_string());
        }

        let has_password = self
            .password
            .as_ref()
            .is_some_and(|p| !p.expose_secret().is_empty());
        if self.username.is_some() != has_password {
            return Err("search.username and search.password must be set together".to_string());
        }

        // Elasticsearch rejects larger pages unless index.max_result_window is raised
        if self.page_size == 0 || self.page_size > 10_000 {
            return Err(format!(
                "search.page_size must be between 1 and 10000, got {}",
                self.page_size
            ));
        }

        let valid_unit = self
            .keep_alive
            .strip_suffix(&['s', 'm', 'h'][..])
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
        if !valid_unit {
            return Err(format!(
                "search.keep_alive '{}' must be a number followed by s, m or h",
                self.keep_alive
            ));
        }

        if self.retry.max_retries == 0 || self.retry.max_retries > 10 {
            return Err(format!(
                "search.retry.max_retries must be between 1 and 10, got {}",
                self.retry.max_retries
            ));
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "observations".to_string(),
            username: None,
            password: None,
            page_size: default_page_size(),
            keep_alive: default_keep_alive(),
            timeout_seconds: default_timeout_seconds(),
            retry: RetryConfig::default(),
        }
    }
}

/// File-backed provider store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding providers.json, metadata/, upstream/ and state/
    pub root: PathBuf,
}

impl StorageConfig {
    fn validate(&self) -> Result<(), String> {
        if self.root.as_os_str().is_empty() {
            return Err("storage.root cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON log files in addition to the console
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// daily, hourly or never
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.is_empty() {
            return Err("logging.local_path cannot be empty when local_enabled".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_export_folder() -> PathBuf {
    PathBuf::from("./dwca-export")
}

fn default_working_folder() -> PathBuf {
    PathBuf::from("./dwca-work")
}

fn default_combined_bundle_name() -> String {
    "all".to_string()
}

fn default_batch_size() -> usize {
    10_000
}

fn default_parallel_batches() -> usize {
    4
}

fn default_page_size() -> usize {
    5_000
}

fn default_keep_alive() -> String {
    "5m".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
