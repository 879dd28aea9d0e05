//! Publication orchestration
//!
//! This module provides:
//! - The publication coordinator (`begin_run` / `write_batch` / `finalize_run`)
//! - The run-wide dedup ledger and per-source working sets
//! - Single-shot export from the search backend
//! - Summary and reporting

pub mod coordinator;
pub mod ledger;
pub mod search;
pub mod summary;
pub mod working_set;

pub use coordinator::{check_bundle_names, PublicationCoordinator};
pub use ledger::{DedupKey, DedupLedger, KeyAdmission};
pub use search::{ExportOutcome, SearchExporter};
pub use summary::{BundleResult, PublicationError, PublicationErrorType, PublicationSummary};
pub use working_set::WorkingSet;
