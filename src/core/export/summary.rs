//! Publication summary and reporting

use crate::core::archive::{ArchiveKind, Fingerprint, PartCounts};
use std::path::PathBuf;
use std::time::Duration;

/// One bundle produced by a finalize
#[derive(Debug, Clone)]
pub struct BundleResult {
    /// Source identifier, `None` for the combined bundle
    pub source: Option<String>,

    pub kind: ArchiveKind,

    /// Location in the export folder; only written when `changed`
    pub path: PathBuf,

    /// Row counts copied from the working set
    pub counts: PartCounts,

    /// Published upstream bundle instead of a generated one
    pub verbatim: bool,

    pub fingerprint: Option<Fingerprint>,

    /// Whether the bundle was published
    pub changed: bool,
}

impl BundleResult {
    pub fn is_combined(&self) -> bool {
        self.source.is_none()
    }
}

/// Type of publication error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationErrorType {
    /// A `write_batch` call failed
    Batch,
    /// Reading the upstream bundle or metadata failed
    Storage,
    /// Persisting a publication record failed
    State,
    Unknown,
}

/// Non-fatal problem encountered during a run
#[derive(Debug, Clone)]
pub struct PublicationError {
    pub error_type: PublicationErrorType,
    pub message: String,

    /// Optional context, e.g. source identifier and batch id
    pub context: Option<String>,
}

impl PublicationError {
    pub fn new(error_type: PublicationErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            context: None,
        }
    }

    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}

/// Summary of a publication run
#[derive(Debug, Clone, Default)]
pub struct PublicationSummary {
    /// Sources that had a working set in this run
    pub sources_processed: usize,

    /// Batches accepted by `write_batch`
    pub batches_written: usize,

    /// Batches that failed in `write_batch`
    pub batches_failed: usize,

    /// Every bundle produced, changed or not
    pub bundles: Vec<BundleResult>,

    pub duration: Duration,

    pub errors: Vec<PublicationError>,
}

impl PublicationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn add_error(&mut self, error: PublicationError) {
        self.errors.push(error);
    }

    /// Paths of the bundles that were published
    pub fn changed_bundles(&self) -> Vec<PathBuf> {
        self.bundles
            .iter()
            .filter(|b| b.changed)
            .map(|b| b.path.clone())
            .collect()
    }

    /// Bundle for a source and layout
    pub fn bundle(&self, source: &str, kind: ArchiveKind) -> Option<&BundleResult> {
        self.bundles
            .iter()
            .find(|b| b.source.as_deref() == Some(source) && b.kind == kind)
    }

    pub fn combined(&self) -> Option<&BundleResult> {
        self.bundles.iter().find(|b| b.is_combined())
    }

    /// True when every batch was written and nothing was reported
    pub fn is_successful(&self) -> bool {
        self.batches_failed == 0 && self.errors.is_empty()
    }

    pub fn log_summary(&self) {
        let changed = self.bundles.iter().filter(|b| b.changed).count();
        tracing::info!(
            sources = self.sources_processed,
            batches_written = self.batches_written,
            batches_failed = self.batches_failed,
            bundles = self.bundles.len(),
            changed,
            duration_secs = self.duration.as_secs(),
            "Publication completed"
        );

        for bundle in self.bundles.iter().filter(|b| b.changed) {
            tracing::info!(
                source = bundle.source.as_deref().unwrap_or("combined"),
                kind = %bundle.kind,
                path = %bundle.path.display(),
                occurrences = bundle.counts.occurrence,
                events = bundle.counts.event,
                "Bundle published"
            );
        }

        if !self.errors.is_empty() {
            tracing::warn!(
                error_count = self.errors.len(),
                "Publication completed with errors"
            );
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    message = %error.message,
                    context = error.context.as_deref().unwrap_or(""),
                    "Publication error"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(source: Option<&str>, changed: bool) -> BundleResult {
        BundleResult {
            source: source.map(str::to_string),
            kind: ArchiveKind::Occurrence,
            path: PathBuf::from(format!("/out/{}.zip", source.unwrap_or("all"))),
            counts: PartCounts::default(),
            verbatim: false,
            fingerprint: None,
            changed,
        }
    }

    #[test]
    fn test_changed_bundles() {
        let mut summary = PublicationSummary::new();
        summary.bundles = vec![
            bundle(Some("a"), true),
            bundle(Some("b"), false),
            bundle(None, true),
        ];

        assert_eq!(
            summary.changed_bundles(),
            vec![PathBuf::from("/out/a.zip"), PathBuf::from("/out/all.zip")]
        );
        assert!(summary.combined().unwrap().is_combined());
        assert!(summary.bundle("b", ArchiveKind::Occurrence).is_some());
        assert!(summary.bundle("b", ArchiveKind::Event).is_none());
    }

    #[test]
    fn test_is_successful() {
        let mut summary = PublicationSummary::new().with_duration(Duration::from_secs(3));
        assert!(summary.is_successful());

        summary.add_error(
            PublicationError::new(PublicationErrorType::Batch, "disk full".to_string())
                .with_context("source=a batch=b1".to_string()),
        );
        assert!(!summary.is_successful());
        assert_eq!(summary.errors[0].context.as_deref(), Some("source=a batch=b1"));
    }
}
