//! Observation search backend
//!
//! [`SearchBackend`] is the seam used by full-export mode;
//! [`ElasticsearchBackend`] is the production implementation.

pub mod elasticsearch;
pub mod traits;

pub use elasticsearch::ElasticsearchBackend;
pub use traits::{PointInTime, SearchAfter, SearchBackend, SearchFilter, SearchPage};

use crate::config::SearchConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Create the search backend for the configuration
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be created
pub fn create_search_backend(config: &SearchConfig) -> Result<Arc<dyn SearchBackend>> {
    tracing::info!(url = %config.url, index = %config.index, "Creating Elasticsearch backend");
    Ok(Arc::new(ElasticsearchBackend::new(config.clone())?))
}
