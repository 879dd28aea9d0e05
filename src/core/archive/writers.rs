//! Streaming part writers
//!
//! A [`PartWriter`] turns observations into rows of one file part. It runs in
//! two modes:
//!
//! - **Batch append**: rows derived from an in-memory batch are appended,
//!   without a header, to the batch's own file. Keyed rows (events and
//!   event-scoped measurements and media) pass through a [`KeyAdmission`]
//!   gate first so shared sub-records are written once per run.
//! - **Full export**: the part is streamed from the search backend page by
//!   page into a sink, header first. The next page is requested before the
//!   current one is written so the network round-trip overlaps the write.
//!   The number of observations retrieved must reach
//!   [`COMPLETENESS_THRESHOLD`] of an independent count.

use super::rows::{
    build_row_from, DelimitedRowWriter, EventRow, MeasurementRow, MultimediaRow, OccurrenceRow,
};
use super::schema::{ArchiveKind, Column, FilePart, RowCategory};
use crate::adapters::search::{PointInTime, SearchBackend, SearchFilter};
use crate::core::export::ledger::{DedupKey, DedupLedger, KeyAdmission};
use crate::domain::{DwcaError, Observation, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Minimum share of the expected observation count a full export must retrieve
pub const COMPLETENESS_THRESHOLD: f64 = 0.99;

/// Rows written per row category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartCounts {
    pub occurrence: u64,
    pub event: u64,
    pub measurement_or_fact: u64,
    pub multimedia: u64,
}

impl PartCounts {
    pub fn add(&mut self, part: FilePart, rows: u64) {
        *self.slot(part.category()) += rows;
    }

    pub fn get(&self, part: FilePart) -> u64 {
        match part.category() {
            RowCategory::Occurrence => self.occurrence,
            RowCategory::Event => self.event,
            RowCategory::MeasurementOrFact => self.measurement_or_fact,
            RowCategory::Multimedia => self.multimedia,
        }
    }

    pub fn merge(&mut self, other: &PartCounts) {
        self.occurrence += other.occurrence;
        self.event += other.event;
        self.measurement_or_fact += other.measurement_or_fact;
        self.multimedia += other.multimedia;
    }

    pub fn total(&self) -> u64 {
        self.occurrence + self.event + self.measurement_or_fact + self.multimedia
    }

    fn slot(&mut self, category: RowCategory) -> &mut u64 {
        match category {
            RowCategory::Occurrence => &mut self.occurrence,
            RowCategory::Event => &mut self.event,
            RowCategory::MeasurementOrFact => &mut self.measurement_or_fact,
            RowCategory::Multimedia => &mut self.multimedia,
        }
    }
}

/// A derived row and, for shared sub-records, its dedup key
#[derive(Debug, Clone)]
pub struct PartRow {
    pub key: Option<DedupKey>,
    pub values: Vec<String>,
}

/// Fail when fewer than 99% of the expected observations were retrieved
pub fn verify_completeness(retrieved: u64, expected: u64) -> Result<()> {
    if (retrieved as f64) < (expected as f64) * COMPLETENESS_THRESHOLD {
        return Err(DwcaError::Incomplete {
            retrieved,
            expected,
        });
    }
    Ok(())
}

/// Everything a full-export stream needs from the caller
#[derive(Clone)]
pub struct ExportQuery {
    pub backend: Arc<dyn SearchBackend>,
    pub filter: SearchFilter,
    pub page_size: usize,
    pub shutdown: watch::Receiver<bool>,
}

/// Result of streaming one part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    pub records_retrieved: u64,
    pub rows_written: u64,
}

impl StreamOutcome {
    /// Whether any data row was produced; extensions without rows are omitted
    pub fn created(&self) -> bool {
        self.rows_written > 0
    }
}

/// Row writer for one file part
#[derive(Debug, Clone)]
pub struct PartWriter {
    part: FilePart,
    columns: Vec<Column>,
}

impl PartWriter {
    pub fn new(part: FilePart) -> Self {
        Self {
            part,
            columns: part.columns(),
        }
    }

    pub fn part(&self) -> FilePart {
        self.part
    }

    /// Rows this part derives from one observation
    pub fn rows(&self, obs: &Observation) -> Vec<PartRow> {
        let plain = |values| PartRow { key: None, values };
        let occurrence_id = obs.occurrence.occurrence_id.as_str();

        match self.part {
            FilePart::Occurrence => vec![plain(self.project(&OccurrenceRow(obs)))],
            FilePart::MeasurementOrFact => obs
                .measurements
                .iter()
                .map(|measurement| {
                    plain(self.project(&MeasurementRow {
                        event_id: None,
                        occurrence_id: Some(occurrence_id),
                        measurement,
                    }))
                })
                .collect(),
            FilePart::Multimedia => obs
                .media
                .iter()
                .map(|media| {
                    plain(self.project(&MultimediaRow {
                        event_id: None,
                        occurrence_id: Some(occurrence_id),
                        media,
                    }))
                })
                .collect(),
            _ => self.event_rows(obs),
        }
    }

    fn event_rows(&self, obs: &Observation) -> Vec<PartRow> {
        // Event-archive rows only exist for observations tied to an event
        let (Some(event), Some(event_id)) = (obs.event.as_ref(), obs.event_id()) else {
            return Vec::new();
        };
        let event_id = event_id.as_str();
        let occurrence_id = obs.occurrence.occurrence_id.as_str();

        match self.part {
            FilePart::Event => vec![PartRow {
                key: Some(DedupKey::Event(event_id.to_string())),
                values: self.project(&EventRow {
                    event,
                    observation: obs,
                }),
            }],
            FilePart::EventOccurrence => vec![PartRow {
                key: None,
                values: self.project(&OccurrenceRow(obs)),
            }],
            FilePart::EventMeasurementOrFact => {
                let occurrence_level = obs.measurements.iter().map(|m| (Some(occurrence_id), m));
                let event_level = event.measurements.iter().map(|m| (None, m));
                occurrence_level
                    .chain(event_level)
                    .map(|(occurrence, measurement)| PartRow {
                        key: Some(DedupKey::Measurement(
                            event_id.to_string(),
                            occurrence.unwrap_or_default().to_string(),
                            measurement.measurement_type.clone(),
                        )),
                        values: self.project(&MeasurementRow {
                            event_id: Some(event_id),
                            occurrence_id: occurrence,
                            measurement,
                        }),
                    })
                    .collect()
            }
            FilePart::EventMultimedia => obs
                .media
                .iter()
                .map(|media| PartRow {
                    key: Some(DedupKey::Media(
                        event_id.to_string(),
                        occurrence_id.to_string(),
                        media.identifier.clone(),
                    )),
                    values: self.project(&MultimediaRow {
                        event_id: Some(event_id),
                        occurrence_id: Some(occurrence_id),
                        media,
                    }),
                })
                .collect(),
            FilePart::Occurrence | FilePart::MeasurementOrFact | FilePart::Multimedia => {
                Vec::new()
            }
        }
    }

    fn project(&self, source: &dyn super::rows::RowSource) -> Vec<String> {
        build_row_from(&self.columns, source)
    }

    /// Derive rows for a set of records and drop keyed rows the gate rejects
    pub fn admitted_rows(
        &self,
        records: &[Observation],
        admission: &dyn KeyAdmission,
    ) -> Result<Vec<PartRow>> {
        let rows: Vec<PartRow> = records.iter().flat_map(|obs| self.rows(obs)).collect();

        let keys: Vec<DedupKey> = rows.iter().filter_map(|row| row.key.clone()).collect();
        if keys.is_empty() {
            return Ok(rows);
        }

        let mut admitted = admission.admit(&keys)?.into_iter();
        Ok(rows
            .into_iter()
            .filter(|row| row.key.is_none() || admitted.next().unwrap_or(false))
            .collect())
    }

    /// Append headerless rows for a batch; returns rows written after dedup
    ///
    /// The file is only created when at least one row survives.
    pub fn append_batch(
        &self,
        records: &[Observation],
        path: &Path,
        admission: &dyn KeyAdmission,
    ) -> Result<u64> {
        let rows = self.admitted_rows(records, admission)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = DelimitedRowWriter::new(BufWriter::new(file));
        for row in &rows {
            writer.write_row(&row.values)?;
        }
        writer.flush()?;

        tracing::trace!(
            part = %self.part,
            rows = rows.len(),
            path = %path.display(),
            "Appended batch rows"
        );
        Ok(rows.len() as u64)
    }

    /// Stream the part from the search backend into `sink`, header first
    pub async fn stream<W: Write + Send>(
        &self,
        query: &ExportQuery,
        sink: W,
    ) -> Result<StreamOutcome> {
        let expected = query.backend.count(&query.filter).await?;
        let mut pit = query.backend.open_point_in_time().await?;

        let streamed = self.stream_pages(query, &mut pit, sink).await;

        if let Err(e) = query.backend.close_point_in_time(&pit).await {
            tracing::warn!(part = %self.part, error = %e, "Failed to close point-in-time");
        }

        let outcome = streamed?;
        verify_completeness(outcome.records_retrieved, expected)?;

        tracing::debug!(
            part = %self.part,
            records = outcome.records_retrieved,
            rows = outcome.rows_written,
            expected,
            "Streamed part"
        );
        Ok(outcome)
    }

    async fn stream_pages<W: Write + Send>(
        &self,
        query: &ExportQuery,
        pit: &mut PointInTime,
        sink: W,
    ) -> Result<StreamOutcome> {
        let page_size = query.page_size.max(1);
        let mut writer = DelimitedRowWriter::new(sink);
        writer.write_header(self.part)?;

        // Full exports see every observation of an event, so keyed rows are
        // deduplicated within the stream
        let ledger = Mutex::new(DedupLedger::new());
        let mut outcome = StreamOutcome::default();

        let mut page = query
            .backend
            .search_page(&query.filter, pit, None, page_size)
            .await?;

        loop {
            if *query.shutdown.borrow() {
                return Err(DwcaError::Cancelled(format!(
                    "Export of {} stopped after {} records",
                    self.part, outcome.records_retrieved
                )));
            }

            if let Some(rotated) = page.point_in_time.take() {
                *pit = rotated;
            }

            let is_last = page.records.len() < page_size || page.search_after.is_none();
            let next = if is_last {
                None
            } else {
                let backend = Arc::clone(&query.backend);
                let filter = query.filter.clone();
                let pit = pit.clone();
                let after = page.search_after.clone();
                Some(tokio::spawn(async move {
                    backend
                        .search_page(&filter, &pit, after.as_ref(), page_size)
                        .await
                }))
            };

            outcome.records_retrieved += page.records.len() as u64;
            let written = match self.write_page(&page.records, &ledger, &mut writer) {
                Ok(written) => written,
                Err(e) => {
                    abort_prefetch(next);
                    return Err(e);
                }
            };
            outcome.rows_written += written;

            if next.is_some() && *query.shutdown.borrow() {
                abort_prefetch(next);
                return Err(DwcaError::Cancelled(format!(
                    "Export of {} stopped after {} records",
                    self.part, outcome.records_retrieved
                )));
            }

            match next {
                Some(handle) => page = handle.await??,
                None => break,
            }
        }

        Ok(outcome)
    }

    /// Write one page of rows and flush; returns rows written after dedup
    fn write_page<W: Write>(
        &self,
        records: &[Observation],
        ledger: &Mutex<DedupLedger>,
        writer: &mut DelimitedRowWriter<W>,
    ) -> Result<u64> {
        let rows = self.admitted_rows(records, ledger)?;
        for row in &rows {
            writer.write_row(&row.values)?;
        }
        writer.flush()?;
        Ok(rows.len() as u64)
    }
}

/// Stop a next-page request that will never be consumed
fn abort_prefetch<T>(next: Option<tokio::task::JoinHandle<T>>) {
    if let Some(handle) = next {
        handle.abort();
    }
}

/// The part writers of one archive layout, used together for a batch
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    kind: ArchiveKind,
    parts: Vec<PartWriter>,
}

impl ArchiveWriter {
    pub fn new(kind: ArchiveKind) -> Self {
        Self {
            kind,
            parts: kind.parts().iter().copied().map(PartWriter::new).collect(),
        }
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    pub fn part_writers(&self) -> &[PartWriter] {
        &self.parts
    }

    /// Append a batch to the given per-part files and count the rows written
    pub fn append_batch(
        &self,
        records: &[Observation],
        files: &HashMap<FilePart, PathBuf>,
        admission: &dyn KeyAdmission,
    ) -> Result<PartCounts> {
        let mut counts = PartCounts::default();
        for writer in &self.parts {
            let path = files.get(&writer.part).ok_or_else(|| {
                DwcaError::Archive(format!("No batch file assigned for part {}", writer.part))
            })?;
            let rows = writer.append_batch(records, path, admission)?;
            counts.add(writer.part, rows);
        }
        Ok(counts)
    }
}
