//! Init command implementation
//!
//! Generates a sample configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "dwca-publisher.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing publisher configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your folders", self.output);
                println!("  2. Describe your data providers in <storage.root>/providers.json");
                println!("  3. Set DWCA_SEARCH_PASSWORD in .env if exports use a secured cluster");
                println!("  4. Validate configuration: dwca-publisher validate-config");
                println!("  5. Publish: dwca-publisher publish observations.jsonl");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }

    fn generate_minimal_config() -> String {
        r#"# Darwin Core Archive publisher configuration

[application]
log_level = "info"

[archive]
export_folder = "./dwca-export"
working_folder = "./dwca-work"
combined_bundle_name = "all"
include_event_archives = true

[publication]
batch_size = 10000
parallel_batches = 4

[search]
url = "http://localhost:9200"
index = "observations"

[storage]
root = "./dwca-store"

[logging]
local_enabled = true
local_path = "./logs"
local_rotation = "daily"
"#
        .to_string()
    }

    fn generate_config_with_examples() -> String {
        r#"# Darwin Core Archive publisher configuration
#
# Every option with an explanation. Values of the form ${VAR} are read from
# the environment (or a .env file); any option can also be overridden with
# DWCA_<SECTION>_<KEY>, e.g. DWCA_ARCHIVE_EXPORT_FOLDER.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# ============================================================================
# Archive Settings
# ============================================================================
[archive]
# Where published bundles are placed. Only changed bundles are replaced.
export_folder = "/srv/dwca/export"

# Scratch space for working sets and staged bundles; must differ from
# export_folder. Each run uses its own subfolder which is removed afterwards.
working_folder = "/srv/dwca/work"

# File name (without .zip) of the bundle combining all regenerated sources
combined_bundle_name = "all"

# Produce an event-core bundle for providers that emit event records
include_event_archives = true

# Deflate level 0-9 (omit for the zip default)
# compression_level = 6

# ============================================================================
# Publication Settings
# ============================================================================
[publication]
# Observations per write_batch call (1-100000)
batch_size = 10000

# Concurrent batch writers (1-64)
parallel_batches = 4

# ============================================================================
# Search Backend (full export)
# ============================================================================
[search]
url = "https://search.example.org:9200"
index = "observations"

# Basic authentication; set both or neither
username = "publisher"
password = "${DWCA_SEARCH_PASSWORD}"

# Observations per page (1-10000)
page_size = 5000

# Point-in-time keep-alive between pages
keep_alive = "5m"

# HTTP request timeout
timeout_seconds = 60

[search.retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

# ============================================================================
# Storage
# ============================================================================
[storage]
# Holds providers.json, per-provider metadata (metadata/<identifier>.xml),
# upstream bundles (upstream/<identifier>.zip) and publication records.
root = "/srv/dwca/store"

# ============================================================================
# Logging Configuration
# ============================================================================
[logging]
# JSON log files in addition to console output
local_enabled = true
local_path = "/var/log/dwca-publisher"

# daily | hourly | never
local_rotation = "daily"
"#
        .to_string()
    }
}
