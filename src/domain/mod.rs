//! Domain models and types for the publisher.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`EventId`], [`OccurrenceId`], [`BatchId`])
//! - **Domain models** ([`Observation`], [`DataProvider`])
//! - **Error types** ([`DwcaError`], [`SearchError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, DwcaError>`]:
//!
//! ```rust
//! use dwca_publisher::domain::{DwcaError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(DwcaError::Validation("missing occurrence id".to_string()))
//! }
//! ```

pub mod errors;
pub mod ids;
pub mod observation;
pub mod provider;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{DwcaError, SearchError};
pub use ids::{BatchId, EventId, OccurrenceId};
pub use observation::{Event, Location, Measurement, Multimedia, Observation, Occurrence, Taxon};
pub use provider::DataProvider;
pub use result::Result;
