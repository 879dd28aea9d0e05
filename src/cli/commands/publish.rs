//! Publish command implementation
//!
//! Reads observations as JSON lines, groups them into per-source batches and
//! feeds them concurrently through the publication coordinator, then
//! finalizes the run.

use crate::adapters::storage::{FileProviderStore, ProviderStore};
use crate::config::{load_config, PublicationConfig};
use crate::core::archive::ProcessInfo;
use crate::core::export::{check_bundle_names, PublicationCoordinator, PublicationSummary};
use crate::core::state::StateManager;
use crate::domain::{DataProvider, DwcaError, Observation, Result};
use chrono::Utc;
use clap::Args;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Arguments for the publish command
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// JSON-lines file of observations ("-" reads stdin)
    pub input: PathBuf,

    /// Override observations per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override concurrent batch writers
    #[arg(long)]
    pub parallel_batches: Option<usize>,
}

/// Counters of one feed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedStats {
    pub lines_read: u64,
    pub invalid_lines: u64,
    pub unknown_source: u64,
    pub batches_submitted: u64,
    pub batches_failed: u64,

    /// Observations per source identifier
    pub per_source: BTreeMap<String, u64>,
}

/// Feed JSON-lines observations into an open run
///
/// Batches hold `batch_size` observations of a single source and are written
/// by up to `parallel_batches` concurrent tasks. Verbatim sources that
/// received no observations still get an empty batch so their upstream
/// bundle is published.
///
/// # Errors
///
/// Returns `DwcaError::Cancelled` when the shutdown signal fires; batches in
/// flight are awaited first.
pub async fn feed_observations<R: AsyncBufRead + Unpin>(
    coordinator: Arc<PublicationCoordinator>,
    providers: &[DataProvider],
    reader: R,
    settings: &PublicationConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<FeedStats> {
    let by_id: HashMap<i32, &DataProvider> = providers.iter().map(|p| (p.id, p)).collect();
    let permits = Arc::new(Semaphore::new(settings.parallel_batches.max(1)));
    let batch_size = settings.batch_size.max(1);

    let mut stats = FeedStats::default();
    let mut buffers: HashMap<i32, Vec<Observation>> = HashMap::new();
    let mut sequence: HashMap<i32, usize> = HashMap::new();
    let mut tasks = JoinSet::new();

    let mut submit = |provider: DataProvider,
                      records: Vec<Observation>,
                      tasks: &mut JoinSet<bool>,
                      permit: OwnedSemaphorePermit| {
        let seq = sequence.entry(provider.id).or_insert(0);
        *seq += 1;
        let batch_id = format!("{}-{:05}", provider.identifier, seq);
        let coordinator = Arc::clone(&coordinator);
        tasks.spawn(async move {
            let _permit = permit;
            coordinator.write_batch(records, &provider, &batch_id).await
        });
    };

    let mut lines = reader.lines();
    let mut cancelled = false;
    while let Some(line) = lines.next_line().await? {
        if *shutdown.borrow() {
            cancelled = true;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        stats.lines_read += 1;

        let observation: Observation = match serde_json::from_str(&line) {
            Ok(obs) => obs,
            Err(e) => {
                tracing::warn!(line = stats.lines_read, error = %e, "Skipping invalid observation");
                stats.invalid_lines += 1;
                continue;
            }
        };

        let Some(provider) = by_id.get(&observation.data_provider_id) else {
            if stats.unknown_source == 0 {
                tracing::warn!(
                    data_provider_id = observation.data_provider_id,
                    "Skipping observations of unknown data provider"
                );
            }
            stats.unknown_source += 1;
            continue;
        };

        *stats.per_source.entry(provider.identifier.clone()).or_default() += 1;
        let buffer = buffers.entry(provider.id).or_default();
        buffer.push(observation);

        if buffer.len() >= batch_size {
            let records = std::mem::take(buffer);
            let permit = acquire(&permits).await?;
            submit((*provider).clone(), records, &mut tasks, permit);
            stats.batches_submitted += 1;
        }
    }

    if !cancelled {
        for provider in providers {
            let records = buffers.remove(&provider.id).unwrap_or_default();
            if records.is_empty() && !provider.use_upstream_archive_verbatim {
                continue;
            }
            let permit = acquire(&permits).await?;
            submit(provider.clone(), records, &mut tasks, permit);
            stats.batches_submitted += 1;
        }
    }

    while let Some(result) = tasks.join_next().await {
        if !result? {
            stats.batches_failed += 1;
        }
    }

    if cancelled {
        return Err(DwcaError::Cancelled(format!(
            "Shutdown requested after {} lines",
            stats.lines_read
        )));
    }

    tracing::info!(
        lines = stats.lines_read,
        invalid = stats.invalid_lines,
        unknown_source = stats.unknown_source,
        batches = stats.batches_submitted,
        failed = stats.batches_failed,
        "Observations fed"
    );
    Ok(stats)
}

async fn acquire(permits: &Arc<Semaphore>) -> Result<OwnedSemaphorePermit> {
    Arc::clone(permits)
        .acquire_owned()
        .await
        .map_err(|e| DwcaError::Other(format!("Batch limiter closed: {e}")))
}

impl PublishArgs {
    /// Execute the publish command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(input = %self.input.display(), "Starting publish command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        if let Some(size) = self.batch_size {
            config.publication.batch_size = size;
        }
        if let Some(parallel) = self.parallel_batches {
            config.publication.parallel_batches = parallel;
        }
        if let Err(e) = config.validate() {
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let store = Arc::new(FileProviderStore::new(&config.storage.root));
        let providers = match store.list_providers().await {
            Ok(p) if !p.is_empty() => p,
            Ok(_) => {
                eprintln!(
                    "No data providers configured in {}",
                    store.root().join("providers.json").display()
                );
                return Ok(2);
            }
            Err(e) => {
                crate::log_error_with_context!(&e, "Failed to read data providers");
                eprintln!("Failed to read data providers: {e}");
                return Ok(4);
            }
        };

        if let Err(e) = check_bundle_names(&providers, &config.archive) {
            eprintln!("{e}");
            return Ok(2);
        }

        let state = Arc::new(StateManager::new_with_storage(store.clone()));
        let coordinator = Arc::new(PublicationCoordinator::new(
            config.archive.clone(),
            store,
            state,
            shutdown_signal.clone(),
        ));

        let started = Utc::now();
        coordinator.begin_run()?;

        let fed = match self.open_input().await {
            Ok(reader) => {
                feed_observations(
                    Arc::clone(&coordinator),
                    &providers,
                    reader,
                    &config.publication,
                    shutdown_signal,
                )
                .await
            }
            Err(e) => Err(e),
        };

        let stats = match fed {
            Ok(stats) => stats,
            Err(e) => {
                coordinator.cleanup_run();
                if e.is_cancelled() {
                    tracing::info!(reason = %e, "Publication interrupted");
                    println!("Publication interrupted; nothing was published.");
                    return Ok(130);
                }
                eprintln!("Failed to read observations: {e}");
                return Ok(5);
            }
        };

        let mut process_info = ProcessInfo::new(uuid::Uuid::new_v4().to_string(), started);
        for (identifier, records) in &stats.per_source {
            process_info = process_info.with_provider(identifier.clone(), *records);
        }

        match coordinator.finalize_run(Some(process_info.finished(Utc::now()))).await {
            Ok(summary) => Ok(Self::report(&stats, &summary)),
            Err(e) if e.is_cancelled() => {
                println!("Publication interrupted; nothing was published.");
                Ok(130)
            }
            Err(e) => {
                eprintln!("Publication failed: {e}");
                Ok(5)
            }
        }
    }

    async fn open_input(&self) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
        if self.input.as_os_str() == "-" {
            return Ok(Box::new(BufReader::new(tokio::io::stdin())));
        }
        let file = tokio::fs::File::open(&self.input).await.map_err(|e| {
            DwcaError::Io(format!("Failed to open {}: {e}", self.input.display()))
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn report(stats: &FeedStats, summary: &PublicationSummary) -> i32 {
        println!();
        println!("Publication Summary:");
        println!("  Observations read: {}", stats.lines_read);
        println!("  Skipped (invalid/unknown source): {}", stats.invalid_lines + stats.unknown_source);
        println!("  Sources: {}", summary.sources_processed);
        println!("  Batches written: {}", summary.batches_written);
        println!("  Batches failed: {}", summary.batches_failed);
        println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
        println!();

        for bundle in &summary.bundles {
            println!(
                "  {:<30} {:<10} {:<10} {}",
                bundle.source.as_deref().unwrap_or("(combined)"),
                bundle.kind.to_string(),
                if bundle.changed { "published" } else { "unchanged" },
                bundle.path.display()
            );
        }

        if !summary.errors.is_empty() {
            println!();
            println!("Errors encountered:");
            for error in &summary.errors {
                println!("  - {:?}: {}", error.error_type, error.message);
                if let Some(context) = &error.context {
                    println!("    Context: {context}");
                }
            }
        }
        println!();

        if summary.is_successful() && stats.batches_failed == 0 {
            println!("Publication completed: {} bundle(s) changed", summary.changed_bundles().len());
            0
        } else {
            println!("Publication completed with failures");
            1
        }
    }
}
