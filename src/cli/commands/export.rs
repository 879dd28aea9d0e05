//! Export command implementation
//!
//! Builds one bundle straight from the search backend, outside any
//! publication run.

use crate::adapters::search::{create_search_backend, SearchFilter};
use crate::adapters::storage::FileProviderStore;
use crate::config::load_config;
use crate::core::archive::ArchiveKind;
use crate::core::export::SearchExporter;
use crate::domain::DwcaError;
use chrono::{DateTime, Utc};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Bundle name; written as `<name>.zip` in the export folder
    #[arg(long, default_value = "export")]
    pub name: String,

    /// Only these data provider ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub provider: Vec<i32>,

    /// Only these taxon ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub taxon: Vec<String>,

    /// Only events starting at or after this instant (RFC 3339)
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Only events ending at or before this instant (RFC 3339)
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,

    /// ISO 3166 country code
    #[arg(long)]
    pub country: Option<String>,

    /// Build the event-core layout instead of the occurrence layout
    #[arg(long)]
    pub event: bool,
}

impl ExportArgs {
    fn filter(&self) -> SearchFilter {
        SearchFilter {
            data_provider_ids: self.provider.clone(),
            taxon_ids: self.taxon.clone(),
            start_date: self.from,
            end_date: self.to,
            country_code: self.country.clone(),
        }
    }

    fn kind(&self) -> ArchiveKind {
        if self.event {
            ArchiveKind::Event
        } else {
            ArchiveKind::Occurrence
        }
    }

    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(name = %self.name, "Starting export command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        let Some(search_config) = config.search.clone() else {
            eprintln!("The export command requires a [search] section in the configuration");
            return Ok(2);
        };

        let backend = match create_search_backend(&search_config) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Failed to create search client: {e}");
                return Ok(4);
            }
        };
        if let Err(e) = backend.health_check().await {
            crate::log_error_with_context!(&e, "Search backend health check failed");
            eprintln!("Search backend unavailable: {e}");
            return Ok(4);
        }

        let exporter = SearchExporter::new(
            config.archive.clone(),
            backend,
            Arc::new(FileProviderStore::new(&config.storage.root)),
            search_config.page_size,
            shutdown_signal,
        );

        match exporter.export(self.filter(), self.kind(), &self.name).await {
            Ok(outcome) => {
                println!();
                println!("Export Summary:");
                println!("  Bundle: {}", outcome.path.display());
                println!("  Layout: {}", outcome.kind);
                println!("  Records retrieved: {}", outcome.records_retrieved);
                for part in &outcome.parts {
                    println!("  {:<28} {} rows", part.file_name(), outcome.counts.get(*part));
                }
                println!("  Duration: {:.2}s", outcome.duration.as_secs_f64());
                println!();
                Ok(0)
            }
            Err(e @ DwcaError::Incomplete { .. }) => {
                eprintln!("Export discarded: {e}");
                Ok(1)
            }
            Err(e) if e.is_cancelled() => {
                println!("Export interrupted; no bundle was written.");
                Ok(130)
            }
            Err(e @ DwcaError::Search(_)) => {
                eprintln!("Search backend failed: {e}");
                Ok(4)
            }
            Err(e) => {
                eprintln!("Export failed: {e}");
                Ok(5)
            }
        }
    }
}
