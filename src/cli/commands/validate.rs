//! Validate config command implementation
//!
//! Loads and validates the configuration file, then prints a summary.

use crate::adapters::search::create_search_backend;
use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also check that the search backend is reachable
    #[arg(long)]
    pub check_search: bool,
}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as its last step
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Export Folder: {}", config.archive.export_folder.display());
        println!("  Working Folder: {}", config.archive.working_folder.display());
        println!("  Combined Bundle: {}.zip", config.archive.combined_bundle_name);
        println!("  Event Bundles: {}", config.archive.include_event_archives);
        println!("  Batch Size: {}", config.publication.batch_size);
        println!("  Parallel Batches: {}", config.publication.parallel_batches);
        println!("  Storage Root: {}", config.storage.root.display());

        match &config.search {
            Some(search) => {
                println!("  Search Backend: {} (index {})", search.url, search.index);
                println!(
                    "  Search Auth: {}",
                    search.username.as_deref().unwrap_or("none")
                );
                println!("  Page Size: {}", search.page_size);
            }
            None => println!("  Search Backend: not configured (export disabled)"),
        }

        if config.logging.local_enabled {
            println!(
                "  Log Files: {} ({})",
                config.logging.local_path, config.logging.local_rotation
            );
        }
        println!();

        if self.check_search {
            let Some(search) = &config.search else {
                println!("❌ --check-search given but no [search] section is configured");
                return Ok(2);
            };
            let healthy = match create_search_backend(search) {
                Ok(backend) => backend.health_check().await,
                Err(e) => Err(e),
            };
            match healthy {
                Ok(()) => println!("✅ Search backend is reachable"),
                Err(e) => {
                    println!("❌ Search backend check failed");
                    println!("   Error: {e}");
                    return Ok(4);
                }
            }
            println!();
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_validate_reports_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[archive]
export_folder = "/srv/dwca"
working_folder = "/srv/dwca"

[storage]
root = "/srv/store"
"#,
        )
        .unwrap();
        file.flush().unwrap();

        let args = ValidateArgs {
            check_search: false,
        };
        let path = file.path().display().to_string();
        assert_eq!(args.execute(&path).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_validate_missing_file() {
        let args = ValidateArgs {
            check_search: false,
        };
        assert_eq!(args.execute("does-not-exist.toml").await.unwrap(), 2);
    }
}
