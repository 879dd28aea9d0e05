//! Bundle change fingerprint
//!
//! The fingerprint of a bundle is the sum of its entries' compressed sizes,
//! except that the metadata entry contributes the length of its text with the
//! publication date removed, and the process-info entry is left out since it
//! describes the run rather than the data. Reruns that only move the
//! publication date or the run timestamps therefore produce the same value.

use super::metadata::strip_pub_date;
use super::schema::{METADATA_FILE_NAME, PROCESS_INFO_FILE_NAME};
use crate::domain::{DwcaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn value(self) -> u64 {
        self.0
    }

    /// Fingerprint of a source publishing several bundles
    pub fn combine(parts: impl IntoIterator<Item = Fingerprint>) -> Fingerprint {
        Fingerprint(parts.into_iter().map(|f| f.0).sum())
    }

    /// Compute the fingerprint of a finished bundle
    pub fn of_bundle(path: &Path) -> Result<Fingerprint> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

        let mut total = 0u64;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.name() == PROCESS_INFO_FILE_NAME {
                continue;
            }
            if entry.name() == METADATA_FILE_NAME {
                let mut content = String::new();
                entry.read_to_string(&mut content)?;
                total += strip_pub_date(&content).len() as u64;
            } else {
                total += entry.compressed_size();
            }
        }
        Ok(Fingerprint(total))
    }

    /// Like [`Fingerprint::of_bundle`] but failures yield `None`
    ///
    /// An absent fingerprint is treated as "unchanged" by the coordinator.
    pub fn of_bundle_or_empty(path: &Path) -> Option<Fingerprint> {
        match Self::of_bundle(path) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to compute bundle fingerprint"
                );
                None
            }
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = DwcaError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(Fingerprint)
            .map_err(|e| DwcaError::State(format!("Invalid fingerprint '{s}': {e}")))
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DwcaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn bundle(dir: &Path, name: &str, entries: &[(&str, &str)]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (entry, content) in entries {
            zip.start_file(*entry, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    const ROWS: &str = "occurrenceID\tbasisOfRecord\nocc-1\tHumanObservation\n";

    #[test]
    fn test_publication_date_does_not_change_fingerprint() {
        let dir = TempDir::new().unwrap();
        let a = bundle(
            dir.path(),
            "a.zip",
            &[
                ("occurrence.txt", ROWS),
                ("eml.xml", "<eml><pubDate>2024-01-01</pubDate></eml>"),
            ],
        );
        let b = bundle(
            dir.path(),
            "b.zip",
            &[
                ("occurrence.txt", ROWS),
                ("eml.xml", "<eml><pubDate>2026-10-16</pubDate></eml>"),
            ],
        );

        assert_eq!(
            Fingerprint::of_bundle(&a).unwrap(),
            Fingerprint::of_bundle(&b).unwrap()
        );
    }

    #[test]
    fn test_process_info_does_not_change_fingerprint() {
        let dir = TempDir::new().unwrap();
        let plain = bundle(dir.path(), "plain.zip", &[("occurrence.txt", ROWS)]);
        let with_info = bundle(
            dir.path(),
            "info.zip",
            &[
                ("occurrence.txt", ROWS),
                (
                    "processinfo.xml",
                    "<processInfo id=\"8a1f\" start=\"2026-10-16T06:00:00.123456789Z\"/>",
                ),
            ],
        );

        assert_eq!(
            Fingerprint::of_bundle(&plain).unwrap(),
            Fingerprint::of_bundle(&with_info).unwrap()
        );
    }

    #[test]
    fn test_additional_row_changes_fingerprint() {
        let dir = TempDir::new().unwrap();
        let more = format!("{ROWS}occ-2\tHumanObservation\n");
        let a = bundle(dir.path(), "a.zip", &[("occurrence.txt", ROWS)]);
        let b = bundle(dir.path(), "b.zip", &[("occurrence.txt", &more)]);

        assert_ne!(
            Fingerprint::of_bundle(&a).unwrap(),
            Fingerprint::of_bundle(&b).unwrap()
        );
    }

    #[test]
    fn test_metadata_counts_uncompressed_stripped_length() {
        let dir = TempDir::new().unwrap();
        let eml = "<eml><title>t</title><pubDate>2024-01-01</pubDate></eml>";
        let path = bundle(dir.path(), "m.zip", &[("eml.xml", eml)]);

        let expected = "<eml><title>t</title></eml>".len() as u64;
        assert_eq!(Fingerprint::of_bundle(&path).unwrap().value(), expected);
    }

    #[test]
    fn test_unreadable_bundle_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(Fingerprint::of_bundle_or_empty(&path).is_none());
        assert!(Fingerprint::of_bundle_or_empty(&dir.path().join("missing.zip")).is_none());
    }

    #[test]
    fn test_string_round_trip_and_combine() {
        let f: Fingerprint = "1234".parse().unwrap();
        assert_eq!(String::from(f), "1234");
        assert!("".parse::<Fingerprint>().is_err());
        assert_eq!(
            Fingerprint::combine([Fingerprint(1), Fingerprint(2)]).value(),
            3
        );
    }
}
