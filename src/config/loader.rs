//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::PublisherConfig;
use super::secret::secret_string;
use crate::domain::errors::DwcaError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Substitutes `${VAR}` placeholders from the environment
/// 3. Parses the TOML into [`PublisherConfig`]
/// 4. Applies `DWCA_<SECTION>_<KEY>` environment overrides
/// 5. Validates the result
///
/// # Errors
///
/// Returns `DwcaError::Configuration` if the file is missing or unreadable,
/// a referenced variable is unset, parsing fails or validation fails.
pub fn load_config(path: impl AsRef<Path>) -> Result<PublisherConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(DwcaError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        DwcaError::Configuration(format!(
            "Failed to read configuration file {}: {e}",
            path.display()
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: PublisherConfig = toml::from_str(&contents)
        .map_err(|e| DwcaError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config
        .validate()
        .map_err(|e| DwcaError::Configuration(format!("Configuration validation failed: {e}")))?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are left untouched. Every missing variable is reported at once.
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = ENV_PLACEHOLDER.replace_all(line, |caps: &regex::Captures| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| {
                if !missing_vars.iter().any(|m| m == name) {
                    missing_vars.push(name.to_string());
                }
                String::new()
            })
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(DwcaError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| DwcaError::Configuration(format!("Invalid value '{raw}' for {name}"))),
        None => Ok(None),
    }
}

/// Applies environment variable overrides using the `DWCA_` prefix
///
/// Variables follow the pattern `DWCA_<SECTION>_<KEY>`, for example
/// `DWCA_ARCHIVE_EXPORT_FOLDER` or `DWCA_SEARCH_PASSWORD`.
fn apply_env_overrides(config: &mut PublisherConfig) -> Result<()> {
    if let Some(val) = env("DWCA_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Archive overrides
    if let Some(val) = env("DWCA_ARCHIVE_EXPORT_FOLDER") {
        config.archive.export_folder = PathBuf::from(val);
    }
    if let Some(val) = env("DWCA_ARCHIVE_WORKING_FOLDER") {
        config.archive.working_folder = PathBuf::from(val);
    }
    if let Some(val) = env("DWCA_ARCHIVE_COMBINED_BUNDLE_NAME") {
        config.archive.combined_bundle_name = val;
    }
    if let Some(val) = parse_env("DWCA_ARCHIVE_INCLUDE_EVENT_ARCHIVES")? {
        config.archive.include_event_archives = val;
    }
    if let Some(val) = parse_env("DWCA_ARCHIVE_COMPRESSION_LEVEL")? {
        config.archive.compression_level = Some(val);
    }

    // Publication overrides
    if let Some(val) = parse_env("DWCA_PUBLICATION_BATCH_SIZE")? {
        config.publication.batch_size = val;
    }
    if let Some(val) = parse_env("DWCA_PUBLICATION_PARALLEL_BATCHES")? {
        config.publication.parallel_batches = val;
    }

    // Search overrides (only if a search section is configured)
    if let Some(ref mut search) = config.search {
        if let Some(val) = env("DWCA_SEARCH_URL") {
            search.url = val;
        }
        if let Some(val) = env("DWCA_SEARCH_INDEX") {
            search.index = val;
        }
        if let Some(val) = env("DWCA_SEARCH_USERNAME") {
            search.username = Some(val);
        }
        if let Some(val) = env("DWCA_SEARCH_PASSWORD") {
            search.password = Some(secret_string(val));
        }
        if let Some(val) = parse_env("DWCA_SEARCH_PAGE_SIZE")? {
            search.page_size = val;
        }
        if let Some(val) = env("DWCA_SEARCH_KEEP_ALIVE") {
            search.keep_alive = val;
        }
    }

    if let Some(val) = env("DWCA_STORAGE_ROOT") {
        config.storage.root = PathBuf::from(val);
    }

    // Logging overrides
    if let Some(val) = parse_env("DWCA_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env("DWCA_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Some(val) = env("DWCA_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}
