//! Schema registry for archive file parts
//!
//! Static description of every file a bundle can contain: physical file name,
//! row type, and the ordered column list. The same column list drives the
//! header row, every data row and the descriptor block, so write order and
//! declared order cannot drift apart.

use std::fmt;

const DWC: &str = "http://rs.tdwg.org/dwc/terms/";
const DC: &str = "http://purl.org/dc/terms/";

/// Name of the schema descriptor entry inside a bundle
pub const DESCRIPTOR_FILE_NAME: &str = "meta.xml";

/// Name of the dataset metadata entry inside a bundle
pub const METADATA_FILE_NAME: &str = "eml.xml";

/// Name of the optional process metadata entry inside a bundle
pub const PROCESS_INFO_FILE_NAME: &str = "processinfo.xml";

/// The two bundle layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// Occurrence core with measurement and multimedia extensions
    Occurrence,
    /// Event core with occurrence, measurement and multimedia extensions
    Event,
}

impl ArchiveKind {
    /// Parts in bundle order, core first
    pub fn parts(self) -> &'static [FilePart] {
        match self {
            ArchiveKind::Occurrence => &[
                FilePart::Occurrence,
                FilePart::MeasurementOrFact,
                FilePart::Multimedia,
            ],
            ArchiveKind::Event => &[
                FilePart::Event,
                FilePart::EventOccurrence,
                FilePart::EventMeasurementOrFact,
                FilePart::EventMultimedia,
            ],
        }
    }

    /// The core part of this layout
    pub fn core(self) -> FilePart {
        self.parts()[0]
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Occurrence => write!(f, "occurrence"),
            ArchiveKind::Event => write!(f, "event"),
        }
    }
}

/// Row category used by the per-source counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowCategory {
    Occurrence,
    Event,
    MeasurementOrFact,
    Multimedia,
}

/// One logical file inside a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilePart {
    Occurrence,
    MeasurementOrFact,
    Multimedia,
    Event,
    EventOccurrence,
    EventMeasurementOrFact,
    EventMultimedia,
}

/// One column of a part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Full term IRI declared in the descriptor
    pub term: &'static str,
    /// Header name, also the key used to look the value up on a record
    pub name: &'static str,
    /// Linking columns are written but not declared as fields
    pub exclude_from_descriptor: bool,
}

impl Column {
    const fn dwc(name: &'static str, term: &'static str) -> Self {
        Self {
            term,
            name,
            exclude_from_descriptor: false,
        }
    }
}

macro_rules! dwc {
    ($name:literal) => {
        Column::dwc($name, concat!("http://rs.tdwg.org/dwc/terms/", $name))
    };
}

macro_rules! dc {
    ($name:literal) => {
        Column::dwc($name, concat!("http://purl.org/dc/terms/", $name))
    };
}

/// Linking key prepended to every event-scoped extension
const EVENT_LINK: Column = Column {
    term: "http://rs.tdwg.org/dwc/terms/eventID",
    name: "eventID",
    exclude_from_descriptor: true,
};

const OCCURRENCE_COLUMNS: &[Column] = &[
    dwc!("occurrenceID"),
    dwc!("basisOfRecord"),
    dwc!("institutionCode"),
    dwc!("collectionCode"),
    dwc!("catalogNumber"),
    dwc!("datasetName"),
    dwc!("eventID"),
    dwc!("eventDate"),
    dwc!("decimalLatitude"),
    dwc!("decimalLongitude"),
    dwc!("coordinateUncertaintyInMeters"),
    dwc!("countryCode"),
    dwc!("locality"),
    dwc!("scientificName"),
    dwc!("taxonID"),
    dwc!("kingdom"),
    dwc!("taxonRank"),
    dwc!("vernacularName"),
    dwc!("individualCount"),
    dwc!("occurrenceStatus"),
    dwc!("recordedBy"),
    dwc!("occurrenceRemarks"),
    dc!("license"),
    dc!("rightsHolder"),
    dc!("modified"),
];

const EVENT_COLUMNS: &[Column] = &[
    dwc!("eventID"),
    dwc!("parentEventID"),
    dwc!("eventDate"),
    dwc!("samplingProtocol"),
    dwc!("sampleSizeValue"),
    dwc!("sampleSizeUnit"),
    dwc!("locationID"),
    dwc!("decimalLatitude"),
    dwc!("decimalLongitude"),
    dwc!("coordinateUncertaintyInMeters"),
    dwc!("countryCode"),
    dwc!("locality"),
    dwc!("datasetName"),
    dwc!("institutionCode"),
    dwc!("eventRemarks"),
    dc!("license"),
    dc!("rightsHolder"),
];

const MEASUREMENT_COLUMNS: &[Column] = &[
    dwc!("occurrenceID"),
    dwc!("measurementID"),
    dwc!("measurementType"),
    dwc!("measurementValue"),
    dwc!("measurementUnit"),
    dwc!("measurementAccuracy"),
    dwc!("measurementMethod"),
    dwc!("measurementDeterminedDate"),
    dwc!("measurementRemarks"),
];

const MULTIMEDIA_COLUMNS: &[Column] = &[
    dwc!("occurrenceID"),
    dc!("type"),
    dc!("format"),
    dc!("identifier"),
    dc!("references"),
    dc!("title"),
    dc!("description"),
    dc!("created"),
    dc!("creator"),
    dc!("license"),
    dc!("rightsHolder"),
];

impl FilePart {
    /// Entry name inside the bundle
    pub fn file_name(self) -> &'static str {
        match self {
            FilePart::Occurrence | FilePart::EventOccurrence => "occurrence.txt",
            FilePart::MeasurementOrFact | FilePart::EventMeasurementOrFact => {
                "extendedMeasurementOrFact.txt"
            }
            FilePart::Multimedia | FilePart::EventMultimedia => "multimedia.txt",
            FilePart::Event => "event.txt",
        }
    }

    /// Prefix of the per-batch intermediate files; no prefix is a prefix of another
    pub fn file_prefix(self) -> &'static str {
        match self {
            FilePart::Occurrence => "occurrence_",
            FilePart::MeasurementOrFact => "emof_",
            FilePart::Multimedia => "multimedia_",
            FilePart::Event => "event_",
            FilePart::EventOccurrence => "eventoccurrence_",
            FilePart::EventMeasurementOrFact => "eventemof_",
            FilePart::EventMultimedia => "eventmultimedia_",
        }
    }

    /// Row type IRI declared in the descriptor
    pub fn row_type(self) -> &'static str {
        match self {
            FilePart::Occurrence | FilePart::EventOccurrence => {
                "http://rs.tdwg.org/dwc/terms/Occurrence"
            }
            FilePart::Event => "http://rs.tdwg.org/dwc/terms/Event",
            FilePart::MeasurementOrFact | FilePart::EventMeasurementOrFact => {
                "http://rs.iobis.org/obis/terms/ExtendedMeasurementOrFact"
            }
            FilePart::Multimedia | FilePart::EventMultimedia => {
                "http://rs.gbif.org/terms/1.0/Multimedia"
            }
        }
    }

    /// Archive layout this part belongs to
    pub fn archive_kind(self) -> ArchiveKind {
        match self {
            FilePart::Occurrence | FilePart::MeasurementOrFact | FilePart::Multimedia => {
                ArchiveKind::Occurrence
            }
            _ => ArchiveKind::Event,
        }
    }

    /// Whether this part is the core file of its layout
    pub fn is_core(self) -> bool {
        self.archive_kind().core() == self
    }

    /// Event-scoped extensions carry a leading event id linking column
    pub fn is_event_scoped(self) -> bool {
        matches!(
            self,
            FilePart::EventOccurrence
                | FilePart::EventMeasurementOrFact
                | FilePart::EventMultimedia
        )
    }

    /// Counter bucket for rows of this part
    pub fn category(self) -> RowCategory {
        match self {
            FilePart::Occurrence | FilePart::EventOccurrence => RowCategory::Occurrence,
            FilePart::Event => RowCategory::Event,
            FilePart::MeasurementOrFact | FilePart::EventMeasurementOrFact => {
                RowCategory::MeasurementOrFact
            }
            FilePart::Multimedia | FilePart::EventMultimedia => RowCategory::Multimedia,
        }
    }

    fn base_columns(self) -> &'static [Column] {
        match self.category() {
            RowCategory::Occurrence => OCCURRENCE_COLUMNS,
            RowCategory::Event => EVENT_COLUMNS,
            RowCategory::MeasurementOrFact => MEASUREMENT_COLUMNS,
            RowCategory::Multimedia => MULTIMEDIA_COLUMNS,
        }
    }

    /// Ordered columns in write order
    pub fn columns(self) -> Vec<Column> {
        let mut columns = Vec::with_capacity(self.base_columns().len() + 1);
        if self.is_event_scoped() {
            columns.push(EVENT_LINK);
        }
        columns.extend_from_slice(self.base_columns());
        columns
    }

    /// Header row values
    pub fn header(self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name).collect()
    }
}

impl fmt::Display for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilePart::Occurrence => "occurrence",
            FilePart::MeasurementOrFact => "measurement_or_fact",
            FilePart::Multimedia => "multimedia",
            FilePart::Event => "event",
            FilePart::EventOccurrence => "event_occurrence",
            FilePart::EventMeasurementOrFact => "event_measurement_or_fact",
            FilePart::EventMultimedia => "event_multimedia",
        };
        write!(f, "{name}")
    }
}

/// Namespace IRIs used by the registry
pub fn namespaces() -> [&'static str; 2] {
    [DWC, DC]
}
