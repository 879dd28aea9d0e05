//! Single-shot export straight from the search backend
//!
//! Every part of the layout is streamed page by page from a point-in-time
//! snapshot straight into its entry of the output bundle. An extension is only
//! included when its stream produced rows. A failed or cancelled export leaves
//! no bundle behind.

use crate::adapters::search::{SearchBackend, SearchFilter};
use crate::adapters::storage::ProviderStore;
use crate::config::ArchiveConfig;
use crate::core::archive::metadata::{default_eml, render_eml};
use crate::core::archive::{
    ArchiveAssembler, ArchiveKind, ExportQuery, FilePart, PartCounts, PartWriter,
};
use crate::domain::{DataProvider, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Result of one export
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub kind: ArchiveKind,
    pub parts: Vec<FilePart>,
    pub counts: PartCounts,
    pub records_retrieved: u64,
    pub duration: Duration,
}

pub struct SearchExporter {
    config: ArchiveConfig,
    backend: Arc<dyn SearchBackend>,
    providers: Arc<dyn ProviderStore>,
    page_size: usize,
    shutdown: watch::Receiver<bool>,
}

impl SearchExporter {
    pub fn new(
        config: ArchiveConfig,
        backend: Arc<dyn SearchBackend>,
        providers: Arc<dyn ProviderStore>,
        page_size: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            backend,
            providers,
            page_size,
            shutdown,
        }
    }

    /// Export everything matching `filter` to `{export_folder}/{name}.zip`
    pub async fn export(
        &self,
        filter: SearchFilter,
        kind: ArchiveKind,
        name: &str,
    ) -> Result<ExportOutcome> {
        let started = Instant::now();
        tokio::fs::create_dir_all(&self.config.export_folder).await?;

        tracing::info!(name, kind = %kind, "Starting export from search backend");

        let query = ExportQuery {
            backend: Arc::clone(&self.backend),
            filter: filter.clone(),
            page_size: self.page_size,
            shutdown: self.shutdown.clone(),
        };

        let output = self.config.export_folder.join(format!("{name}.zip"));
        let assembler = ArchiveAssembler::new(self.config.compression_level, self.shutdown.clone());
        let mut bundle = assembler.begin_streamed(kind, &output)?;

        let mut counts = PartCounts::default();
        let mut records_retrieved = 0;
        for part in kind.parts() {
            let mut entry = bundle.entry(*part)?;
            let outcome = PartWriter::new(*part).stream(&query, &mut entry).await?;
            if !entry.finish()? {
                tracing::debug!(part = %part, "No rows; extension omitted");
            }

            records_retrieved = records_retrieved.max(outcome.records_retrieved);
            counts.add(*part, outcome.rows_written);
        }

        let metadata = self.metadata(&filter, name).await?;
        let included = bundle.finish(&metadata, None)?;

        let outcome = ExportOutcome {
            path: output,
            kind,
            parts: included,
            counts,
            records_retrieved,
            duration: started.elapsed(),
        };
        tracing::info!(
            path = %outcome.path.display(),
            records = outcome.records_retrieved,
            rows = outcome.counts.total(),
            duration_secs = outcome.duration.as_secs(),
            "Export completed"
        );
        Ok(outcome)
    }

    /// The provider's metadata when the filter names exactly one provider
    async fn metadata(&self, filter: &SearchFilter, name: &str) -> Result<String> {
        let published_at = Utc::now();
        if let [id] = filter.data_provider_ids.as_slice() {
            if let Some(provider) = self.providers.get_provider(*id).await? {
                let stored = self.providers.get_metadata_document(&provider).await?;
                return render_eml(&provider, stored.as_deref(), published_at);
            }
        }
        Ok(default_eml(&DataProvider::new(0, name), published_at.date_naive()))
    }
}
