//! Run-scoped deduplication ledger
//!
//! Shared sub-records (events, event measurements, event media) may be
//! referenced by many observations spread over many batches. The ledger
//! remembers every composite key already written during a run so each one
//! lands in its output file at most once.

use crate::domain::Result;
use std::collections::HashSet;
use std::sync::Mutex;

/// Composite key of a shared sub-record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Event id
    Event(String),
    /// Event id, occurrence id (empty for event-level rows), measurement type
    Measurement(String, String, String),
    /// Event id, occurrence id (empty for event-level rows), media identifier
    Media(String, String, String),
}

/// Previously seen keys, one set per sub-record kind
#[derive(Debug, Default)]
pub struct DedupLedger {
    events: HashSet<String>,
    measurements: HashSet<(String, String, String)>,
    media: HashSet<(String, String, String)>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key; returns true the first time it is seen
    pub fn check_and_insert(&mut self, key: &DedupKey) -> bool {
        match key {
            DedupKey::Event(event_id) => self.events.insert(event_id.clone()),
            DedupKey::Measurement(e, o, t) => {
                self.measurements.insert((e.clone(), o.clone(), t.clone()))
            }
            DedupKey::Media(e, o, i) => self.media.insert((e.clone(), o.clone(), i.clone())),
        }
    }

    /// Number of keys recorded across all sets
    pub fn len(&self) -> usize {
        self.events.len() + self.measurements.len() + self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.measurements.clear();
        self.media.clear();
    }
}

/// Gate deciding which keyed rows may be written
///
/// `admit` returns one flag per key, in order. Keys repeated within the same
/// slice are admitted once.
pub trait KeyAdmission: Send + Sync {
    fn admit(&self, keys: &[DedupKey]) -> Result<Vec<bool>>;
}

impl KeyAdmission for Mutex<DedupLedger> {
    fn admit(&self, keys: &[DedupKey]) -> Result<Vec<bool>> {
        let mut ledger = self.lock().map_err(|_| {
            crate::domain::DwcaError::State("Dedup ledger lock poisoned".to_string())
        })?;
        Ok(keys.iter().map(|key| ledger.check_and_insert(key)).collect())
    }
}
