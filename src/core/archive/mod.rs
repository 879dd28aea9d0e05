//! Darwin Core Archive building blocks
//!
//! - [`schema`]: file parts, row types and ordered columns
//! - [`rows`]: tab-delimited row writer and record views
//! - [`writers`]: part writers for batch-append and full-export modes
//! - [`descriptor`], [`metadata`]: `meta.xml`, `eml.xml`, `processinfo.xml`
//! - [`assembly`]: zip bundle assembly
//! - [`fingerprint`]: change detection signature

pub mod assembly;
pub mod descriptor;
pub mod fingerprint;
pub mod metadata;
pub mod rows;
pub mod schema;
pub mod writers;

pub use assembly::{ArchiveAssembler, BundleSource, BundleSpec, PartContent};
pub use fingerprint::Fingerprint;
pub use metadata::ProcessInfo;
pub use schema::{ArchiveKind, FilePart};
pub use writers::{ArchiveWriter, ExportQuery, PartCounts, PartWriter, StreamOutcome};
