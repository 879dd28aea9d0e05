//! Schema descriptor (`meta.xml`) generation
//!
//! One block per included part. Field indexes are positions in the part's
//! column list, which is also the order rows are written in.

use super::schema::{ArchiveKind, FilePart, METADATA_FILE_NAME};
use crate::domain::Result;
use serde::{Deserialize, Serialize};

const TEXT_NAMESPACE: &str = "http://rs.tdwg.org/dwc/text/";

/// Root `<archive>` element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "archive")]
pub struct ArchiveDescriptor {
    #[serde(rename = "@xmlns", default)]
    pub xmlns: String,

    #[serde(rename = "@metadata", default)]
    pub metadata: String,

    pub core: FileBlock,

    #[serde(rename = "extension", default)]
    pub extensions: Vec<FileBlock>,
}

/// A `<core>` or `<extension>` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileBlock {
    #[serde(rename = "@encoding")]
    pub encoding: String,

    #[serde(rename = "@fieldsTerminatedBy")]
    pub fields_terminated_by: String,

    #[serde(rename = "@linesTerminatedBy")]
    pub lines_terminated_by: String,

    #[serde(rename = "@fieldsEnclosedBy", default)]
    pub fields_enclosed_by: String,

    #[serde(rename = "@ignoreHeaderLines")]
    pub ignore_header_lines: u32,

    #[serde(rename = "@rowType")]
    pub row_type: String,

    pub files: Files,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<IndexRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coreid: Option<IndexRef>,

    #[serde(rename = "field", default)]
    pub fields: Vec<FieldRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Files {
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRef {
    #[serde(rename = "@index")]
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    #[serde(rename = "@index")]
    pub index: usize,

    #[serde(rename = "@term")]
    pub term: String,
}

impl FileBlock {
    fn for_part(part: FilePart) -> Self {
        let fields = part
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| !column.exclude_from_descriptor)
            .map(|(index, column)| FieldRef {
                index,
                term: column.term.to_string(),
            })
            .collect();

        let (id, coreid) = if part.is_core() {
            (Some(IndexRef { index: 0 }), None)
        } else {
            (None, Some(IndexRef { index: 0 }))
        };

        Self {
            encoding: "UTF-8".to_string(),
            fields_terminated_by: "\\t".to_string(),
            lines_terminated_by: "\\n".to_string(),
            fields_enclosed_by: String::new(),
            ignore_header_lines: 1,
            row_type: part.row_type().to_string(),
            files: Files {
                location: part.file_name().to_string(),
            },
            id,
            coreid,
            fields,
        }
    }

    /// Declared terms in index order
    pub fn terms(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.term.as_str()).collect()
    }
}

impl ArchiveDescriptor {
    /// Descriptor for a layout; the core is always declared, extensions only
    /// when listed in `included`
    pub fn new(kind: ArchiveKind, included: &[FilePart]) -> Self {
        let extensions = kind
            .parts()
            .iter()
            .filter(|part| !part.is_core() && included.contains(part))
            .map(|part| FileBlock::for_part(*part))
            .collect();

        Self {
            xmlns: TEXT_NAMESPACE.to_string(),
            metadata: METADATA_FILE_NAME.to_string(),
            core: FileBlock::for_part(kind.core()),
            extensions,
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let body = quick_xml::se::to_string(self)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    /// Block declaring the given entry name, core or extension
    pub fn block_for(&self, location: &str) -> Option<&FileBlock> {
        std::iter::once(&self.core)
            .chain(self.extensions.iter())
            .find(|block| block.files.location == location)
    }
}

/// Render `meta.xml` for a layout and the parts actually present
pub fn build_descriptor(kind: ArchiveKind, included: &[FilePart]) -> Result<String> {
    ArchiveDescriptor::new(kind, included).to_xml()
}
