//! Status command implementation
//!
//! Shows the stored publication record of every configured source.

use crate::adapters::storage::{FileProviderStore, ProviderStore};
use crate::config::load_config;
use crate::core::state::{PublicationRecord, PublicationStatus, StateManager};
use clap::Args;
use std::collections::HashMap;
use std::sync::Arc;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this source identifier
    #[arg(long)]
    pub source: Option<String>,

    /// Print records as JSON
    #[arg(long)]
    pub json: bool,
}

fn status_label(status: PublicationStatus) -> &'static str {
    match status {
        PublicationStatus::NeverPublished => "never published",
        PublicationStatus::Published => "published",
        PublicationStatus::Unchanged => "unchanged",
        PublicationStatus::Failed => "failed",
    }
}

impl StatusArgs {
    fn matches(&self, identifier: &str) -> bool {
        self.source.as_deref().map_or(true, |s| s == identifier)
    }

    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking publication status");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let store = Arc::new(FileProviderStore::new(&config.storage.root));
        let providers = match store.list_providers().await {
            Ok(p) => p,
            Err(e) => {
                println!("❌ Failed to read data providers");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let state_manager = StateManager::new_with_storage(store);
        let records = match state_manager.list_publications().await {
            Ok(r) => r,
            Err(e) => {
                println!("❌ Failed to load publication records");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        let records: Vec<PublicationRecord> =
            records.into_iter().filter(|r| self.matches(&r.id)).collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(0);
        }

        println!("📊 Publication Status");
        println!();

        let by_id: HashMap<&str, &PublicationRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();

        println!(
            "{:<30} {:<16} {:<8} {:<20} {:<25}",
            "Source", "Status", "Count", "Fingerprint", "Last Published"
        );
        println!("{}", "-".repeat(100));

        let mut shown = 0;
        for provider in providers.iter().filter(|p| self.matches(&p.identifier)) {
            shown += 1;
            match by_id.get(provider.identifier.as_str()) {
                Some(record) => println!(
                    "{:<30} {:<16} {:<8} {:<20} {:<25}",
                    record.id,
                    status_label(record.status),
                    record.publications_count,
                    record
                        .fingerprint
                        .map(|f| f.value().to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    record
                        .last_published_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Never".to_string()),
                ),
                None => println!(
                    "{:<30} {:<16} {:<8} {:<20} {:<25}",
                    provider.identifier,
                    status_label(PublicationStatus::NeverPublished),
                    0,
                    "-",
                    "Never"
                ),
            }
        }

        // Records whose provider has since been removed from the configuration
        for record in &records {
            if !providers.iter().any(|p| p.identifier == record.id) {
                shown += 1;
                println!(
                    "{:<30} {:<16} {:<8} {:<20} {:<25}",
                    record.id,
                    "removed",
                    record.publications_count,
                    "-",
                    "-"
                );
            }
        }

        if shown == 0 {
            println!("No sources match the specified filters.");
        }
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_filter() {
        let args = StatusArgs {
            source: Some("artportalen".to_string()),
            json: false,
        };
        assert!(args.matches("artportalen"));
        assert!(!args.matches("nors"));

        let all = StatusArgs {
            source: None,
            json: true,
        };
        assert!(all.matches("nors"));
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(status_label(PublicationStatus::NeverPublished), "never published");
        assert_eq!(status_label(PublicationStatus::Unchanged), "unchanged");
    }
}
