//! Publication record model
//!
//! One record per source, holding the fingerprint of the last bundle that was
//! actually published. The coordinator compares new bundles against it.

use crate::core::archive::Fingerprint;
use crate::domain::DataProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the last finalize for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    /// No bundle has been published yet
    #[default]
    NeverPublished,
    /// The last run produced a changed bundle that was published
    Published,
    /// The last run produced a bundle identical to the published one
    Unchanged,
    /// The last run failed for this source
    Failed,
}

/// Persisted publication state of one source
///
/// # Examples
///
/// ```
/// use dwca_publisher::core::state::{PublicationRecordBuilder, PublicationStatus};
/// use dwca_publisher::domain::DataProvider;
///
/// let record = PublicationRecordBuilder::new(&DataProvider::new(7, "artportalen"))
///     .publications_count(3)
///     .build();
///
/// assert_eq!(record.id, "artportalen");
/// assert_eq!(record.status, PublicationStatus::NeverPublished);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    /// Source identifier, also the storage key
    pub id: String,

    /// Numeric provider id
    pub provider_id: i32,

    /// Fingerprint of the last published bundle(s)
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,

    /// When a changed bundle was last published
    #[serde(default)]
    pub last_published_at: Option<DateTime<Utc>>,

    /// When the source was last checked by a run
    pub last_checked_at: DateTime<Utc>,

    /// Number of times a changed bundle was published
    #[serde(default)]
    pub publications_count: u64,

    #[serde(default)]
    pub status: PublicationStatus,
}

impl PublicationRecord {
    /// Whether a new fingerprint differs from the published one
    ///
    /// A missing new fingerprint counts as unchanged.
    pub fn is_changed(&self, fingerprint: Option<Fingerprint>) -> bool {
        match fingerprint {
            Some(fingerprint) => self.fingerprint != Some(fingerprint),
            None => false,
        }
    }

    /// Record a published bundle
    pub fn mark_published(&mut self, fingerprint: Fingerprint) {
        let now = Utc::now();
        self.fingerprint = Some(fingerprint);
        self.last_published_at = Some(now);
        self.last_checked_at = now;
        self.publications_count += 1;
        self.status = PublicationStatus::Published;
    }

    /// Record a run whose bundle matched the published one
    pub fn mark_unchanged(&mut self) {
        self.last_checked_at = Utc::now();
        self.status = PublicationStatus::Unchanged;
    }

    pub fn mark_failed(&mut self) {
        self.last_checked_at = Utc::now();
        self.status = PublicationStatus::Failed;
    }
}

/// Builder for [`PublicationRecord`]
pub struct PublicationRecordBuilder {
    id: String,
    provider_id: i32,
    fingerprint: Option<Fingerprint>,
    last_published_at: Option<DateTime<Utc>>,
    last_checked_at: Option<DateTime<Utc>>,
    publications_count: u64,
    status: PublicationStatus,
}

impl PublicationRecordBuilder {
    pub fn new(provider: &DataProvider) -> Self {
        Self {
            id: provider.identifier.clone(),
            provider_id: provider.id,
            fingerprint: None,
            last_published_at: None,
            last_checked_at: None,
            publications_count: 0,
            status: PublicationStatus::NeverPublished,
        }
    }

    pub fn fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn last_published_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.last_published_at = Some(timestamp);
        self
    }

    pub fn last_checked_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.last_checked_at = Some(timestamp);
        self
    }

    pub fn publications_count(mut self, count: u64) -> Self {
        self.publications_count = count;
        self
    }

    pub fn status(mut self, status: PublicationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn build(self) -> PublicationRecord {
        PublicationRecord {
            id: self.id,
            provider_id: self.provider_id,
            fingerprint: self.fingerprint,
            last_published_at: self.last_published_at,
            last_checked_at: self.last_checked_at.unwrap_or_else(Utc::now),
            publications_count: self.publications_count,
            status: self.status,
        }
    }
}
