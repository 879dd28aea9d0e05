//! Configuration management for the publisher.
//!
//! TOML configuration with:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `DWCA_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation with readable messages
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [archive]
//! export_folder = "/srv/dwca/export"
//! working_folder = "/srv/dwca/work"
//! combined_bundle_name = "all"
//! include_event_archives = true
//!
//! [publication]
//! batch_size = 10000
//! parallel_batches = 4
//!
//! [search]
//! url = "https://search.example.org:9200"
//! index = "observations"
//! username = "publisher"
//! password = "${DWCA_SEARCH_PASSWORD}"
//!
//! [storage]
//! root = "/srv/dwca/store"
//!
//! [logging]
//! local_enabled = true
//! local_path = "/var/log/dwca-publisher"
//! local_rotation = "daily"
//! ```
//!
//! ```rust,no_run
//! use dwca_publisher::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("dwca-publisher.toml")?;
//! println!("Publishing to {}", config.archive.export_folder.display());
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::load_config;
pub use schema::{
    ApplicationConfig, ArchiveConfig, LoggingConfig, PublicationConfig, PublisherConfig,
    RetryConfig, SearchConfig, StorageConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
