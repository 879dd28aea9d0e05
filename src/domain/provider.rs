//! Data provider (source) model

use serde::{Deserialize, Serialize};

/// An upstream organization or system contributing observations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataProvider {
    /// Numeric provider id, matches `Observation::data_provider_id`
    pub id: i32,

    /// Stable identifier used for bundle and metadata file names
    pub identifier: String,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Whether an event-core bundle is produced for this provider
    #[serde(default)]
    pub emits_event_records: bool,

    /// Publish the provider's own upstream bundle instead of regenerating one
    #[serde(default)]
    pub use_upstream_archive_verbatim: bool,
}

impl DataProvider {
    /// Create a provider with both flags cleared
    pub fn new(id: i32, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            id,
            name: identifier.clone(),
            identifier,
            emits_event_records: false,
            use_upstream_archive_verbatim: false,
        }
    }

    /// Enable event-core bundles
    pub fn with_event_records(mut self) -> Self {
        self.emits_event_records = true;
        self
    }

    /// Publish the upstream bundle verbatim
    pub fn with_upstream_verbatim(mut self) -> Self {
        self.use_upstream_archive_verbatim = true;
        self
    }

    /// Occurrence-core bundle file name
    pub fn bundle_file_name(&self) -> String {
        format!("{}.zip", self.identifier)
    }

    /// Event-core bundle file name
    pub fn event_bundle_file_name(&self) -> String {
        format!("{}-event.zip", self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_names() {
        let provider = DataProvider::new(7, "artportalen");
        assert_eq!(provider.bundle_file_name(), "artportalen.zip");
        assert_eq!(provider.event_bundle_file_name(), "artportalen-event.zip");
    }

    #[test]
    fn test_builder_flags() {
        let provider = DataProvider::new(1, "nors")
            .with_event_records()
            .with_upstream_verbatim();
        assert!(provider.emits_event_records);
        assert!(provider.use_upstream_archive_verbatim);
    }

    #[test]
    fn test_deserialize_defaults() {
        let provider: DataProvider =
            serde_json::from_str(r#"{ "id": 3, "identifier": "sers" }"#).unwrap();
        assert!(!provider.emits_event_records);
        assert!(!provider.use_upstream_archive_verbatim);
        assert_eq!(provider.name, "");
    }
}
