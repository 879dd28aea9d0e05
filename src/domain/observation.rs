//! Observation record model
//!
//! The subset of an observation document needed to key deduplication and to
//! populate archive rows. Documents arrive either from the search backend or
//! from JSON-lines input; both use camelCase field names.

use super::ids::{EventId, OccurrenceId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A single biodiversity observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Numeric id of the data provider that contributed the record
    pub data_provider_id: i32,

    /// Occurrence-level fields
    pub occurrence: Occurrence,

    /// Sampling event the observation belongs to, if any
    #[serde(default)]
    pub event: Option<Event>,

    /// Where the observation was made
    #[serde(default)]
    pub location: Location,

    /// What was observed
    #[serde(default)]
    pub taxon: Taxon,

    #[serde(default)]
    pub dataset_name: Option<String>,

    #[serde(default)]
    pub institution_code: Option<String>,

    #[serde(default)]
    pub collection_code: Option<String>,

    #[serde(default)]
    pub license: Option<String>,

    #[serde(default)]
    pub rights_holder: Option<String>,

    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,

    /// Records flagged here must never be published
    #[serde(default)]
    pub restricted: bool,

    /// Occurrence-level measurements
    #[serde(default)]
    pub measurements: Vec<Measurement>,

    /// Media attached to the occurrence
    #[serde(default)]
    pub media: Vec<Multimedia>,
}

impl Observation {
    /// The occurrence id, if it is present and non-empty
    pub fn occurrence_id(&self) -> Option<OccurrenceId> {
        OccurrenceId::new(self.occurrence.occurrence_id.clone()).ok()
    }

    /// The event id, if the observation belongs to an event
    pub fn event_id(&self) -> Option<EventId> {
        self.event
            .as_ref()
            .and_then(|event| EventId::new(event.event_id.clone()).ok())
    }

    /// `dwc:eventDate` rendered as an ISO 8601 instant or interval
    pub fn event_date(&self) -> Option<String> {
        self.event.as_ref().and_then(Event::event_date)
    }
}

/// Occurrence-level fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub occurrence_id: String,

    #[serde(default = "default_basis_of_record")]
    pub basis_of_record: String,

    #[serde(default)]
    pub catalog_number: Option<String>,

    #[serde(default)]
    pub individual_count: Option<String>,

    #[serde(default)]
    pub occurrence_status: Option<String>,

    #[serde(default)]
    pub recorded_by: Option<String>,

    #[serde(default)]
    pub occurrence_remarks: Option<String>,
}

/// Sampling event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,

    #[serde(default)]
    pub parent_event_id: Option<String>,

    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sampling_protocol: Option<String>,

    #[serde(default)]
    pub sample_size_value: Option<String>,

    #[serde(default)]
    pub sample_size_unit: Option<String>,

    #[serde(default)]
    pub event_remarks: Option<String>,

    /// Event-level measurements (not tied to one occurrence)
    #[serde(default)]
    pub measurements: Vec<Measurement>,
}

impl Event {
    /// ISO 8601 date or interval for the event
    pub fn event_date(&self) -> Option<String> {
        let format = |d: &DateTime<Utc>| d.to_rfc3339_opts(SecondsFormat::Secs, true);
        match (&self.start_date, &self.end_date) {
            (Some(start), Some(end)) if start != end => {
                Some(format!("{}/{}", format(start), format(end)))
            }
            (Some(start), _) => Some(format(start)),
            (None, Some(end)) => Some(format(end)),
            (None, None) => None,
        }
    }
}

/// Location fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub location_id: Option<String>,

    #[serde(default)]
    pub decimal_latitude: Option<f64>,

    #[serde(default)]
    pub decimal_longitude: Option<f64>,

    #[serde(default)]
    pub coordinate_uncertainty_in_meters: Option<i32>,

    #[serde(default)]
    pub country_code: Option<String>,

    #[serde(default)]
    pub locality: Option<String>,
}

/// Taxon fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxon {
    #[serde(default)]
    pub taxon_id: Option<String>,

    #[serde(default)]
    pub scientific_name: Option<String>,

    #[serde(default)]
    pub kingdom: Option<String>,

    #[serde(default)]
    pub taxon_rank: Option<String>,

    #[serde(default)]
    pub vernacular_name: Option<String>,
}

/// Extended measurement or fact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(default)]
    pub measurement_id: Option<String>,

    pub measurement_type: String,

    #[serde(default)]
    pub measurement_value: Option<String>,

    #[serde(default)]
    pub measurement_unit: Option<String>,

    #[serde(default)]
    pub measurement_accuracy: Option<String>,

    #[serde(default)]
    pub measurement_method: Option<String>,

    #[serde(default)]
    pub measurement_determined_date: Option<String>,

    #[serde(default)]
    pub measurement_remarks: Option<String>,
}

/// Simple multimedia item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Multimedia {
    /// Media URL; keys multimedia deduplication
    pub identifier: String,

    #[serde(default, rename = "type")]
    pub media_type: Option<String>,

    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub references: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub created: Option<String>,

    #[serde(default)]
    pub creator: Option<String>,

    #[serde(default)]
    pub license: Option<String>,

    #[serde(default)]
    pub rights_holder: Option<String>,
}

fn default_basis_of_record() -> String {
    "HumanObservation".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_deserialize_minimal_observation() {
        let json = r#"{
            "dataProviderId": 1,
            "occurrence": { "occurrenceId": "occ-1" }
        }"#;

        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.data_provider_id, 1);
        assert_eq!(obs.occurrence.basis_of_record, "HumanObservation");
        assert!(obs.event.is_none());
        assert!(obs.event_id().is_none());
        assert!(!obs.restricted);
        assert_eq!(obs.occurrence_id().unwrap().as_str(), "occ-1");
    }

    #[test]
    fn test_event_date_interval() {
        let event = Event {
            event_id: "ev-1".to_string(),
            start_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()),
            end_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            ..Default::default()
        };

        assert_eq!(
            event.event_date().unwrap(),
            "2024-05-01T08:00:00Z/2024-05-01T10:00:00Z"
        );
    }

    #[test]
    fn test_event_date_single_instant() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let event = Event {
            event_id: "ev-1".to_string(),
            start_date: Some(instant),
            end_date: Some(instant),
            ..Default::default()
        };

        assert_eq!(event.event_date().unwrap(), "2024-05-01T08:00:00Z");
    }

    #[test]
    fn test_multimedia_type_rename() {
        let json = r#"{ "identifier": "https://img/1.jpg", "type": "StillImage" }"#;
        let media: Multimedia = serde_json::from_str(json).unwrap();
        assert_eq!(media.media_type.as_deref(), Some("StillImage"));
    }
}
