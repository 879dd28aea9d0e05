//! Publication coordinator - orchestrates one publication run
//!
//! A run is `begin_run`, any number of (possibly concurrent) `write_batch`
//! calls, then `finalize_run`. Batches are appended to per-source working
//! sets; finalize assembles one bundle per source (plus an event bundle for
//! event-emitting sources) and a combined bundle, publishes the bundles whose
//! fingerprint changed and removes all working files.
//!
//! All state shared between concurrent callers lives in one [`RunState`]
//! behind a mutex. The lock is only held for bookkeeping, never across I/O.

use crate::adapters::storage::ProviderStore;
use crate::config::ArchiveConfig;
use crate::core::archive::metadata::{default_eml, render_eml};
use crate::core::archive::{
    ArchiveAssembler, ArchiveKind, ArchiveWriter, BundleSource, BundleSpec, FilePart,
    Fingerprint, PartContent, PartCounts, ProcessInfo,
};
use crate::core::export::ledger::{DedupKey, DedupLedger, KeyAdmission};
use crate::core::export::summary::{
    BundleResult, PublicationError, PublicationErrorType, PublicationSummary,
};
use crate::core::export::working_set::WorkingSet;
use crate::core::state::StateManager;
use crate::domain::{BatchId, DataProvider, DwcaError, Observation, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::watch;

/// Mutable state of the current run
#[derive(Debug)]
struct RunState {
    run_root: PathBuf,
    working_sets: HashMap<i32, WorkingSet>,
    ledger: DedupLedger,
    batches_written: usize,
    batches_failed: usize,
    errors: Vec<PublicationError>,
}

impl RunState {
    fn new(working_folder: &Path) -> Self {
        Self {
            run_root: working_folder.join(format!("run-{}", uuid::Uuid::new_v4())),
            working_sets: HashMap::new(),
            ledger: DedupLedger::new(),
            batches_written: 0,
            batches_failed: 0,
            errors: Vec::new(),
        }
    }
}

fn lock_state(state: &Mutex<RunState>) -> Result<MutexGuard<'_, RunState>> {
    state
        .lock()
        .map_err(|_| DwcaError::State("Run state lock poisoned".to_string()))
}

/// Dedup gate backed by the run-wide ledger
struct RunLedger(Arc<Mutex<RunState>>);

impl KeyAdmission for RunLedger {
    fn admit(&self, keys: &[DedupKey]) -> Result<Vec<bool>> {
        let mut state = lock_state(&self.0)?;
        Ok(keys
            .iter()
            .map(|key| state.ledger.check_and_insert(key))
            .collect())
    }
}

/// Bundles built for one source before change detection
struct SourceBundles {
    provider: DataProvider,
    staged: Vec<(PathBuf, BundleResult)>,
}

/// Publication coordinator
pub struct PublicationCoordinator {
    config: ArchiveConfig,
    providers: Arc<dyn ProviderStore>,
    state_manager: Arc<StateManager>,
    shutdown: watch::Receiver<bool>,
    run: Arc<Mutex<RunState>>,
}

impl PublicationCoordinator {
    pub fn new(
        config: ArchiveConfig,
        providers: Arc<dyn ProviderStore>,
        state_manager: Arc<StateManager>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let run = Arc::new(Mutex::new(RunState::new(&config.working_folder)));
        Self {
            config,
            providers,
            state_manager,
            shutdown,
            run,
        }
    }

    /// Reset all per-run state
    ///
    /// Must be called once before the first batch; not safe to call
    /// concurrently with `write_batch`.
    pub fn begin_run(&self) -> Result<()> {
        let previous = {
            let mut state = lock_state(&self.run)?;
            std::mem::replace(&mut *state, RunState::new(&self.config.working_folder))
        };

        // Leftovers of a run that was never finalized
        remove_working_sets(&previous);

        tracing::info!(
            working_folder = %self.config.working_folder.display(),
            "Publication run started"
        );
        Ok(())
    }

    /// Append a batch of observations for one source
    ///
    /// An empty `batch_id` selects the default batch. Restricted observations
    /// are dropped. Returns `false` if the batch could not be written; the
    /// cause is logged and the run can continue.
    pub async fn write_batch(
        &self,
        records: Vec<Observation>,
        provider: &DataProvider,
        batch_id: &str,
    ) -> bool {
        let batch = BatchId::resolve(batch_id);
        match self.try_write_batch(records, provider, &batch).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    source = %provider.identifier,
                    batch_id = %batch,
                    error = %e,
                    "Failed to write batch"
                );
                if let Ok(mut state) = lock_state(&self.run) {
                    state.batches_failed += 1;
                    state.errors.push(
                        PublicationError::new(PublicationErrorType::Batch, e.to_string())
                            .with_context(format!("source={} batch={batch}", provider.identifier)),
                    );
                }
                false
            }
        }
    }

    fn emits_events(&self, provider: &DataProvider) -> bool {
        provider.emits_event_records && self.config.include_event_archives
    }

    async fn try_write_batch(
        &self,
        mut records: Vec<Observation>,
        provider: &DataProvider,
        batch: &BatchId,
    ) -> Result<()> {
        let total = records.len();
        records.retain(|record| !record.restricted);
        if records.len() < total {
            tracing::debug!(
                source = %provider.identifier,
                batch_id = %batch,
                restricted = total - records.len(),
                "Dropped restricted observations"
            );
        }

        let (directory, occurrence_files, event_files) = {
            let mut state = lock_state(&self.run)?;
            let run_root = state.run_root.clone();
            let working_set = state
                .working_sets
                .entry(provider.id)
                .or_insert_with(|| WorkingSet::new(&run_root, provider.clone()));

            // Verbatim sources publish their upstream bundle; rows are never used
            if provider.use_upstream_archive_verbatim {
                state.batches_written += 1;
                return Ok(());
            }

            let occurrence_files = working_set.batch_files(batch, ArchiveKind::Occurrence);
            let event_files = self
                .emits_events(provider)
                .then(|| working_set.batch_files(batch, ArchiveKind::Event));
            (
                working_set.directory().to_path_buf(),
                occurrence_files,
                event_files,
            )
        };

        tokio::fs::create_dir_all(&directory).await?;
        let records = Arc::new(records);

        let occurrence = tokio::task::spawn_blocking({
            let records = Arc::clone(&records);
            let gate = RunLedger(Arc::clone(&self.run));
            move || {
                ArchiveWriter::new(ArchiveKind::Occurrence).append_batch(
                    &records,
                    &occurrence_files,
                    &gate,
                )
            }
        });
        let event = event_files.map(|files| {
            let records = Arc::clone(&records);
            let gate = RunLedger(Arc::clone(&self.run));
            tokio::task::spawn_blocking(move || {
                ArchiveWriter::new(ArchiveKind::Event).append_batch(&records, &files, &gate)
            })
        });

        let occurrence_counts = occurrence.await??;
        let event_counts = match event {
            Some(handle) => handle.await??,
            None => PartCounts::default(),
        };

        {
            let mut state = lock_state(&self.run)?;
            let working_set = state.working_sets.get_mut(&provider.id).ok_or_else(|| {
                DwcaError::State(format!(
                    "Working set of {} disappeared during the batch",
                    provider.identifier
                ))
            })?;
            working_set.fold(&occurrence_counts, &event_counts);
            state.batches_written += 1;
        }

        tracing::debug!(
            source = %provider.identifier,
            batch_id = %batch,
            occurrences = occurrence_counts.occurrence,
            events = event_counts.event,
            "Batch written"
        );
        Ok(())
    }

    /// Assemble, diff and publish every bundle of the run
    ///
    /// Working files are removed whatever the outcome. Callers must have
    /// stopped issuing batches.
    pub async fn finalize_run(&self, process_info: Option<ProcessInfo>) -> Result<PublicationSummary> {
        let started = Instant::now();
        let result = self.finalize_inner(process_info).await;
        self.cleanup_run();

        match result {
            Ok(summary) => {
                let summary = summary.with_duration(started.elapsed());
                summary.log_summary();
                Ok(summary)
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(reason = %e, "Publication run cancelled");
                Err(e)
            }
            Err(e) => {
                tracing::error!(error = %e, "Publication run failed");
                Err(e)
            }
        }
    }

    async fn finalize_inner(&self, process_info: Option<ProcessInfo>) -> Result<PublicationSummary> {
        if *self.shutdown.borrow() {
            return Err(DwcaError::Cancelled("Shutdown requested before finalize".to_string()));
        }

        let (run_root, working_sets, mut summary) = {
            let state = lock_state(&self.run)?;
            let mut working_sets: Vec<WorkingSet> = state.working_sets.values().cloned().collect();
            working_sets.sort_by_key(|ws| ws.provider().id);
            let summary = PublicationSummary {
                sources_processed: working_sets.len(),
                batches_written: state.batches_written,
                batches_failed: state.batches_failed,
                errors: state.errors.clone(),
                ..Default::default()
            };
            (state.run_root.clone(), working_sets, summary)
        };

        let providers: Vec<DataProvider> =
            working_sets.iter().map(|ws| ws.provider().clone()).collect();
        check_bundle_names(&providers, &self.config)?;

        let staging = run_root.join("staging");
        tokio::fs::create_dir_all(&staging).await?;
        tokio::fs::create_dir_all(&self.config.export_folder).await?;

        let published_at = Utc::now();
        let process_info = process_info.map(|info| info.to_xml()).transpose()?;

        let per_source = futures::future::join_all(working_sets.iter().map(|ws| {
            self.build_source_bundles(ws, &staging, published_at, process_info.as_deref())
        }));
        let combined = self.build_combined_bundle(
            &working_sets,
            &staging,
            published_at,
            process_info.as_deref(),
        );
        let (per_source, combined) = tokio::join!(per_source, combined);

        let mut built = Vec::with_capacity(per_source.len());
        for result in per_source {
            built.push(result?);
        }
        let combined = combined?;

        let mut any_changed = false;
        for source in built {
            any_changed |= self.publish_if_changed(source, &mut summary).await?;
        }

        if let Some((staged, mut result)) = combined {
            if any_changed {
                move_file(&staged, &result.path).await?;
                result.changed = true;
            } else {
                tracing::debug!("No source changed; discarding combined bundle");
            }
            summary.bundles.push(result);
        }

        Ok(summary)
    }

    fn assembler(&self) -> ArchiveAssembler {
        ArchiveAssembler::new(self.config.compression_level, self.shutdown.clone())
    }

    async fn assemble(
        &self,
        source: BundleSource,
        output: PathBuf,
    ) -> Result<(Vec<FilePart>, Option<Fingerprint>)> {
        let assembler = self.assembler();
        tokio::task::spawn_blocking(move || {
            let parts = assembler.assemble(&source, &output)?;
            Ok((parts, Fingerprint::of_bundle_or_empty(&output)))
        })
        .await?
    }

    /// Part inputs of a layout from one or more working sets
    fn part_contents(
        working_sets: &[&WorkingSet],
        kind: ArchiveKind,
        counts: &PartCounts,
    ) -> Result<Vec<(FilePart, PartContent)>> {
        let mut parts = Vec::new();
        for part in kind.parts() {
            if !part.is_core() && counts.get(*part) == 0 {
                continue;
            }
            let mut files = Vec::new();
            for ws in working_sets {
                files.extend(ws.files_for(*part)?);
            }
            parts.push((*part, PartContent::BatchFiles(files)));
        }
        Ok(parts)
    }

    async fn build_source_bundles(
        &self,
        ws: &WorkingSet,
        staging: &Path,
        published_at: DateTime<Utc>,
        process_info: Option<&str>,
    ) -> Result<SourceBundles> {
        let provider = ws.provider().clone();
        let mut staged = Vec::new();

        let bundle = |kind: ArchiveKind, name: String, counts: PartCounts, verbatim: bool| {
            (
                staging.join(&name),
                BundleResult {
                    source: Some(provider.identifier.clone()),
                    kind,
                    path: self.config.export_folder.join(&name),
                    counts,
                    verbatim,
                    fingerprint: None,
                    changed: false,
                },
            )
        };

        if provider.use_upstream_archive_verbatim {
            match self.providers.get_upstream_archive(&provider).await? {
                Some(bytes) => {
                    let (path, mut result) = bundle(
                        ArchiveKind::Occurrence,
                        provider.bundle_file_name(),
                        PartCounts::default(),
                        true,
                    );
                    let (_, fingerprint) =
                        self.assemble(BundleSource::Verbatim(bytes), path.clone()).await?;
                    result.fingerprint = fingerprint;
                    staged.push((path, result));
                }
                None => tracing::warn!(
                    source = %provider.identifier,
                    "Upstream bundle not found; skipping verbatim source"
                ),
            }
            return Ok(SourceBundles { provider, staged });
        }

        let stored = self.providers.get_metadata_document(&provider).await?;
        let metadata = render_eml(&provider, stored.as_deref(), published_at)?;

        let mut layouts = vec![(ArchiveKind::Occurrence, provider.bundle_file_name())];
        if self.emits_events(&provider) {
            if ws.event_counts.event > 0 {
                layouts.push((ArchiveKind::Event, provider.event_bundle_file_name()));
            } else {
                tracing::debug!(source = %provider.identifier, "No event rows; skipping event bundle");
            }
        }

        for (kind, name) in layouts {
            let counts = *ws.counts(kind);
            let spec = BundleSpec {
                kind,
                parts: Self::part_contents(&[ws], kind, &counts)?,
                metadata: metadata.clone(),
                process_info: process_info.map(str::to_string),
            };
            let (path, mut result) = bundle(kind, name, counts, false);
            let (_, fingerprint) = self
                .assemble(BundleSource::Generated(spec), path.clone())
                .await
                .map_err(|e| {
                    if !e.is_cancelled() {
                        tracing::error!(source = %provider.identifier, kind = %kind, error = %e, "Assembly failed");
                    }
                    e
                })?;
            result.fingerprint = fingerprint;
            staged.push((path, result));
        }

        Ok(SourceBundles { provider, staged })
    }

    async fn build_combined_bundle(
        &self,
        working_sets: &[WorkingSet],
        staging: &Path,
        published_at: DateTime<Utc>,
        process_info: Option<&str>,
    ) -> Result<Option<(PathBuf, BundleResult)>> {
        let sources: Vec<&WorkingSet> = working_sets
            .iter()
            .filter(|ws| !ws.provider().use_upstream_archive_verbatim)
            .collect();
        if sources.is_empty() {
            return Ok(None);
        }

        let mut counts = PartCounts::default();
        for ws in &sources {
            counts.merge(&ws.occurrence_counts);
        }

        let name = format!("{}.zip", self.config.combined_bundle_name);
        let mut combined = DataProvider::new(0, self.config.combined_bundle_name.clone());
        combined.name = "All data providers".to_string();

        let spec = BundleSpec {
            kind: ArchiveKind::Occurrence,
            parts: Self::part_contents(&sources, ArchiveKind::Occurrence, &counts)?,
            metadata: default_eml(&combined, published_at.date_naive()),
            process_info: process_info.map(str::to_string),
        };

        let staged = staging.join(&name);
        let (_, fingerprint) = self
            .assemble(BundleSource::Generated(spec), staged.clone())
            .await?;

        Ok(Some((
            staged,
            BundleResult {
                source: None,
                kind: ArchiveKind::Occurrence,
                path: self.config.export_folder.join(&name),
                counts,
                verbatim: false,
                fingerprint,
                changed: false,
            },
        )))
    }

    /// Compare a source's bundles with the stored fingerprint and publish on change
    async fn publish_if_changed(
        &self,
        source: SourceBundles,
        summary: &mut PublicationSummary,
    ) -> Result<bool> {
        let SourceBundles { provider, staged } = source;
        if staged.is_empty() {
            return Ok(false);
        }

        let fingerprint = staged
            .iter()
            .map(|(_, result)| result.fingerprint)
            .collect::<Option<Vec<_>>>()
            .map(Fingerprint::combine);

        let mut record = match self.state_manager.load_or_default(&provider).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    source = %provider.identifier,
                    error = %e,
                    "Failed to load publication record; treating source as unchanged"
                );
                summary.bundles.extend(staged.into_iter().map(|(_, r)| r));
                return Ok(false);
            }
        };

        let Some(new_fingerprint) = fingerprint.filter(|f| record.is_changed(Some(*f))) else {
            if fingerprint.is_none() {
                tracing::warn!(source = %provider.identifier, "No fingerprint; treating source as unchanged");
            } else {
                tracing::info!(source = %provider.identifier, "Bundle unchanged");
            }
            summary.bundles.extend(staged.into_iter().map(|(_, r)| r));
            return Ok(false);
        };

        for (staged_path, mut result) in staged {
            move_file(&staged_path, &result.path).await?;
            result.changed = true;
            tracing::debug!(
                source = %provider.identifier,
                path = %result.path.display(),
                "Bundle moved to export folder"
            );
            summary.bundles.push(result);
        }

        record.mark_published(new_fingerprint);
        if let Err(e) = self.state_manager.save_publication(&record).await {
            tracing::error!(source = %provider.identifier, error = %e, "Failed to save publication record");
            summary.add_error(
                PublicationError::new(PublicationErrorType::State, e.to_string())
                    .with_context(format!("source={}", provider.identifier)),
            );
        }
        Ok(true)
    }

    /// Delete every working directory of the run
    ///
    /// Idempotent; individual failures are logged, never returned.
    pub fn cleanup_run(&self) {
        let snapshot = {
            let mut state = match self.run.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            RunState {
                run_root: state.run_root.clone(),
                working_sets: std::mem::take(&mut state.working_sets),
                ledger: DedupLedger::new(),
                batches_written: 0,
                batches_failed: 0,
                errors: Vec::new(),
            }
        };
        remove_working_sets(&snapshot);
    }
}

fn remove_working_sets(state: &RunState) {
    for ws in state.working_sets.values() {
        if let Err(e) = ws.remove() {
            tracing::warn!(
                source = %ws.provider().identifier,
                path = %ws.directory().display(),
                error = %e,
                "Failed to remove working directory"
            );
        }
    }
    match std::fs::remove_dir_all(&state.run_root) {
        Ok(()) => tracing::debug!(path = %state.run_root.display(), "Removed run directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %state.run_root.display(),
            error = %e,
            "Failed to remove run directory"
        ),
    }
}

/// Reject providers whose bundles would share a file name
///
/// Every bundle of a run is staged and published under its file name, so two
/// bundles with the same name would overwrite each other. The combined bundle
/// name is always reserved.
pub fn check_bundle_names(providers: &[DataProvider], config: &ArchiveConfig) -> Result<()> {
    let mut owners: HashMap<String, String> = HashMap::new();
    owners.insert(
        format!("{}.zip", config.combined_bundle_name),
        "the combined bundle".to_string(),
    );

    for provider in providers {
        let mut names = vec![provider.bundle_file_name()];
        if provider.emits_event_records && config.include_event_archives {
            names.push(provider.event_bundle_file_name());
        }
        for name in names {
            let owner = format!("provider '{}'", provider.identifier);
            if let Some(existing) = owners.get(&name) {
                return Err(DwcaError::Configuration(format!(
                    "Bundle name '{name}' is used by both {existing} and {owner}"
                )));
            }
            owners.insert(name, owner);
        }
    }
    Ok(())
}

/// Rename, falling back to copy and delete across filesystems
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}
