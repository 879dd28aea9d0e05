//! Search backend trait definition
//!
//! Abstracts the observation search backend used by full-export mode. Pages
//! are read against a point-in-time snapshot with an opaque continuation
//! token, so concurrent writes to the index do not shift page boundaries.

use crate::domain::{Observation, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observation query filter
///
/// Restricted observations are always excluded by backends; there is no way
/// to ask for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// Only observations from these providers (empty means all)
    #[serde(default)]
    pub data_provider_ids: Vec<i32>,

    /// Only observations of these taxa (empty means all)
    #[serde(default)]
    pub taxon_ids: Vec<String>,

    /// Only events starting on or after this instant
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    /// Only events ending on or before this instant
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,

    /// ISO 3166 country code
    #[serde(default)]
    pub country_code: Option<String>,
}

impl SearchFilter {
    /// Filter matching every published observation of one provider
    pub fn for_provider(provider_id: i32) -> Self {
        Self {
            data_provider_ids: vec![provider_id],
            ..Default::default()
        }
    }
}

/// Handle of an open point-in-time snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointInTime {
    pub id: String,
}

/// Opaque continuation token returned with each page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchAfter(pub serde_json::Value);

/// One page of results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub records: Vec<Observation>,

    /// Token for the page after this one; `None` on the last page
    pub search_after: Option<SearchAfter>,

    /// Backends may rotate the snapshot id between pages
    pub point_in_time: Option<PointInTime>,

    /// Total hits as reported with the page, if the backend tracks it
    pub total_hint: Option<u64>,
}

/// Trait for observation search backends
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Open a snapshot that subsequent pages are read against
    async fn open_point_in_time(&self) -> Result<PointInTime>;

    /// Fetch one page of observations
    ///
    /// `search_after` is `None` for the first page and the previous page's
    /// token afterwards.
    async fn search_page(
        &self,
        filter: &SearchFilter,
        pit: &PointInTime,
        search_after: Option<&SearchAfter>,
        size: usize,
    ) -> Result<SearchPage>;

    /// Independent count of observations matching the filter
    async fn count(&self, filter: &SearchFilter) -> Result<u64>;

    /// Release a snapshot
    async fn close_point_in_time(&self, pit: &PointInTime) -> Result<()>;

    /// Check connectivity; used by `validate-config`
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
