//! Delimited row writer and record views
//!
//! Rows are tab separated, never quoted, and terminated by `\n`. Field values
//! have embedded tabs and line breaks replaced by a space so a row always
//! stays on one line and positional parsing against the descriptor holds.

use super::schema::{Column, FilePart};
use crate::domain::{Event, Measurement, Multimedia, Observation, Result};
use chrono::SecondsFormat;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::io::Write;

/// Writes fixed-order rows to a delimited stream
pub struct DelimitedRowWriter<W: Write> {
    inner: csv::Writer<W>,
}

impl<W: Write> DelimitedRowWriter<W> {
    pub fn new(sink: W) -> Self {
        let inner = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .flexible(false)
            .from_writer(sink);
        Self { inner }
    }

    /// Write the header row for a part
    pub fn write_header(&mut self, part: FilePart) -> Result<()> {
        self.inner.write_record(part.header())?;
        Ok(())
    }

    /// Write one data row, sanitizing each field
    pub fn write_row<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        self.inner
            .write_record(values.iter().map(|v| sanitize(v.as_ref())))?;
        Ok(())
    }

    /// Flush buffered rows to the underlying sink
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and return the underlying sink
    pub fn into_inner(self) -> Result<W> {
        self.inner
            .into_inner()
            .map_err(|e| crate::domain::DwcaError::Archive(format!("Failed to flush rows: {e}")))
    }
}

fn sanitize(value: &str) -> String {
    if value.contains(['\t', '\r', '\n']) {
        value.replace(['\t', '\r', '\n'], " ")
    } else {
        value.to_string()
    }
}

/// Something that can supply a value for a named column
pub trait RowSource {
    fn value(&self, column: &str) -> Option<String>;
}

/// Project a source onto the columns of a part, in declared order
pub fn build_row(part: FilePart, source: &dyn RowSource) -> Vec<String> {
    build_row_from(&part.columns(), source)
}

/// Project a source onto an already resolved column list
pub fn build_row_from(columns: &[Column], source: &dyn RowSource) -> Vec<String> {
    columns
        .iter()
        .map(|column| source.value(column.name).unwrap_or_default())
        .collect()
}

fn float(value: Option<f64>) -> Option<String> {
    value.map(|v| v.to_string())
}

/// Occurrence row view
pub struct OccurrenceRow<'a>(pub &'a Observation);

impl RowSource for OccurrenceRow<'_> {
    fn value(&self, column: &str) -> Option<String> {
        let obs = self.0;
        let occ = &obs.occurrence;
        match column {
            "occurrenceID" => Some(occ.occurrence_id.clone()),
            "basisOfRecord" => Some(occ.basis_of_record.clone()),
            "institutionCode" => obs.institution_code.clone(),
            "collectionCode" => obs.collection_code.clone(),
            "catalogNumber" => occ.catalog_number.clone(),
            "datasetName" => obs.dataset_name.clone(),
            "eventID" => obs.event.as_ref().map(|e| e.event_id.clone()),
            "eventDate" => obs.event_date(),
            "decimalLatitude" => float(obs.location.decimal_latitude),
            "decimalLongitude" => float(obs.location.decimal_longitude),
            "coordinateUncertaintyInMeters" => obs
                .location
                .coordinate_uncertainty_in_meters
                .map(|v| v.to_string()),
            "countryCode" => obs.location.country_code.clone(),
            "locality" => obs.location.locality.clone(),
            "scientificName" => obs.taxon.scientific_name.clone(),
            "taxonID" => obs.taxon.taxon_id.clone(),
            "kingdom" => obs.taxon.kingdom.clone(),
            "taxonRank" => obs.taxon.taxon_rank.clone(),
            "vernacularName" => obs.taxon.vernacular_name.clone(),
            "individualCount" => occ.individual_count.clone(),
            "occurrenceStatus" => occ.occurrence_status.clone(),
            "recordedBy" => occ.recorded_by.clone(),
            "occurrenceRemarks" => occ.occurrence_remarks.clone(),
            "license" => obs.license.clone(),
            "rightsHolder" => obs.rights_holder.clone(),
            "modified" => obs
                .modified
                .map(|m| m.to_rfc3339_opts(SecondsFormat::Secs, true)),
            _ => None,
        }
    }
}

/// Event row view; location and dataset fields come from the observation
pub struct EventRow<'a> {
    pub event: &'a Event,
    pub observation: &'a Observation,
}

impl RowSource for EventRow<'_> {
    fn value(&self, column: &str) -> Option<String> {
        let event = self.event;
        let obs = self.observation;
        match column {
            "eventID" => Some(event.event_id.clone()),
            "parentEventID" => event.parent_event_id.clone(),
            "eventDate" => event.event_date(),
            "samplingProtocol" => event.sampling_protocol.clone(),
            "sampleSizeValue" => event.sample_size_value.clone(),
            "sampleSizeUnit" => event.sample_size_unit.clone(),
            "locationID" => obs.location.location_id.clone(),
            "decimalLatitude" => float(obs.location.decimal_latitude),
            "decimalLongitude" => float(obs.location.decimal_longitude),
            "coordinateUncertaintyInMeters" => obs
                .location
                .coordinate_uncertainty_in_meters
                .map(|v| v.to_string()),
            "countryCode" => obs.location.country_code.clone(),
            "locality" => obs.location.locality.clone(),
            "datasetName" => obs.dataset_name.clone(),
            "institutionCode" => obs.institution_code.clone(),
            "eventRemarks" => event.event_remarks.clone(),
            "license" => obs.license.clone(),
            "rightsHolder" => obs.rights_holder.clone(),
            _ => None,
        }
    }
}

/// Measurement row view
pub struct MeasurementRow<'a> {
    pub event_id: Option<&'a str>,
    pub occurrence_id: Option<&'a str>,
    pub measurement: &'a Measurement,
}

impl RowSource for MeasurementRow<'_> {
    fn value(&self, column: &str) -> Option<String> {
        let m = self.measurement;
        match column {
            "eventID" => self.event_id.map(str::to_string),
            "occurrenceID" => self.occurrence_id.map(str::to_string),
            "measurementID" => m.measurement_id.clone(),
            "measurementType" => Some(m.measurement_type.clone()),
            "measurementValue" => m.measurement_value.clone(),
            "measurementUnit" => m.measurement_unit.clone(),
            "measurementAccuracy" => m.measurement_accuracy.clone(),
            "measurementMethod" => m.measurement_method.clone(),
            "measurementDeterminedDate" => m.measurement_determined_date.clone(),
            "measurementRemarks" => m.measurement_remarks.clone(),
            _ => None,
        }
    }
}

/// Multimedia row view
pub struct MultimediaRow<'a> {
    pub event_id: Option<&'a str>,
    pub occurrence_id: Option<&'a str>,
    pub media: &'a Multimedia,
}

impl RowSource for MultimediaRow<'_> {
    fn value(&self, column: &str) -> Option<String> {
        let m = self.media;
        match column {
            "eventID" => self.event_id.map(str::to_string),
            "occurrenceID" => self.occurrence_id.map(str::to_string),
            "type" => m.media_type.clone(),
            "format" => m.format.clone(),
            "identifier" => Some(m.identifier.clone()),
            "references" => m.references.clone(),
            "title" => m.title.clone(),
            "description" => m.description.clone(),
            "created" => m.created.clone(),
            "creator" => m.creator.clone(),
            "license" => m.license.clone(),
            "rightsHolder" => m.rights_holder.clone(),
            _ => None,
        }
    }
}
