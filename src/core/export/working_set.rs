//! Per-source working state for one publication run

use crate::core::archive::{ArchiveKind, FilePart, PartCounts};
use crate::domain::{BatchId, DataProvider, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Batch files and row counters of one source
///
/// Each distinct batch id gets its own file per part, so concurrent batches
/// never append to the same file. Paths are assigned without touching the
/// disk; the directory and files appear once a row is written.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    provider: DataProvider,
    directory: PathBuf,
    files: HashMap<(BatchId, FilePart), PathBuf>,

    /// Rows written to occurrence-core parts
    pub occurrence_counts: PartCounts,

    /// Rows written to event-core parts
    pub event_counts: PartCounts,
}

impl WorkingSet {
    /// Working set rooted at `{root}/{identifier}-{uuid}`
    pub fn new(root: &Path, provider: DataProvider) -> Self {
        let directory = root.join(format!("{}-{}", provider.identifier, uuid::Uuid::new_v4()));
        Self {
            provider,
            directory,
            files: HashMap::new(),
            occurrence_counts: PartCounts::default(),
            event_counts: PartCounts::default(),
        }
    }

    pub fn provider(&self) -> &DataProvider {
        &self.provider
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File paths for every part of `kind` in `batch`
    pub fn batch_files(&mut self, batch: &BatchId, kind: ArchiveKind) -> HashMap<FilePart, PathBuf> {
        kind.parts()
            .iter()
            .map(|part| (*part, self.path_for(batch, *part)))
            .collect()
    }

    fn path_for(&mut self, batch: &BatchId, part: FilePart) -> PathBuf {
        if let Some(path) = self.files.get(&(batch.clone(), part)) {
            return path.clone();
        }

        let mut path = self
            .directory
            .join(format!("{}{}.txt", part.file_prefix(), batch.file_suffix()));
        // Distinct ids can sanitize to the same suffix
        if self.files.values().any(|taken| taken == &path) {
            path = self.directory.join(format!(
                "{}{}-{}.txt",
                part.file_prefix(),
                batch.file_suffix(),
                uuid::Uuid::new_v4().simple()
            ));
        }

        self.files.insert((batch.clone(), part), path.clone());
        path
    }

    /// Batch files of a part that exist on disk, sorted by name
    pub fn files_for(&self, part: FilePart) -> Result<Vec<PathBuf>> {
        let mut matches = Vec::new();
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(matches),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(part.file_prefix()) && entry.file_type()?.is_file()
            {
                matches.push(entry.path());
            }
        }
        matches.sort();
        Ok(matches)
    }

    /// Fold a batch's counts into the running totals
    pub fn fold(&mut self, occurrence: &PartCounts, event: &PartCounts) {
        self.occurrence_counts.merge(occurrence);
        self.event_counts.merge(event);
    }

    /// Row counts for a layout
    pub fn counts(&self, kind: ArchiveKind) -> &PartCounts {
        match kind {
            ArchiveKind::Occurrence => &self.occurrence_counts,
            ArchiveKind::Event => &self.event_counts,
        }
    }

    /// Delete the working directory; missing directories are not an error
    pub fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&self.directory) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
