//! Bundle assembly
//!
//! Writes the data parts, then `meta.xml`, `eml.xml` and optionally
//! `processinfo.xml` into a deflated zip. Output goes to a `.partial` file that
//! is renamed into place only after the archive is complete.
//!
//! Run bundles are assembled from per-batch files in one go. Single-shot
//! exports use a [`StreamedBundle`] instead and write each part straight into
//! its zip entry.

use super::descriptor::build_descriptor;
use super::rows::DelimitedRowWriter;
use super::schema::{
    ArchiveKind, FilePart, DESCRIPTOR_FILE_NAME, METADATA_FILE_NAME, PROCESS_INFO_FILE_NAME,
};
use crate::domain::{DwcaError, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Where a part's rows come from
#[derive(Debug, Clone)]
pub enum PartContent {
    /// Headerless per-batch files, concatenated after a generated header
    BatchFiles(Vec<PathBuf>),
}

impl PartContent {
    fn has_rows(&self) -> bool {
        match self {
            PartContent::BatchFiles(files) => !files.is_empty(),
        }
    }
}

/// Inputs of one generated bundle
#[derive(Debug, Clone)]
pub struct BundleSpec {
    pub kind: ArchiveKind,
    pub parts: Vec<(FilePart, PartContent)>,
    pub metadata: String,
    pub process_info: Option<String>,
}

/// What a bundle is built from
#[derive(Debug, Clone)]
pub enum BundleSource {
    /// The provider's own upstream bundle, published byte for byte
    Verbatim(Vec<u8>),
    /// Regenerated from part files
    Generated(BundleSpec),
}

/// Assembles bundles; cancellation is checked between entries
#[derive(Debug, Clone)]
pub struct ArchiveAssembler {
    compression_level: Option<i64>,
    shutdown: watch::Receiver<bool>,
}

impl ArchiveAssembler {
    pub fn new(compression_level: Option<i64>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            compression_level,
            shutdown,
        }
    }

    /// Build `output` from `source`; returns the data parts included
    pub fn assemble(&self, source: &BundleSource, output: &Path) -> Result<Vec<FilePart>> {
        let spec = match source {
            BundleSource::Verbatim(bytes) => {
                write_atomically(output, |mut file| Ok(file.write_all(bytes)?))?;
                tracing::debug!(path = %output.display(), bytes = bytes.len(), "Copied upstream bundle");
                return Ok(Vec::new());
            }
            BundleSource::Generated(spec) => spec,
        };

        let mut included = Vec::new();
        let result = write_atomically(output, |file| {
            included = self.write_zip(spec, file)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::debug!(
                    path = %output.display(),
                    kind = %spec.kind,
                    parts = included.len(),
                    "Assembled bundle"
                );
                Ok(included)
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(path = %output.display(), "Bundle assembly cancelled");
                Err(e)
            }
            Err(e) => {
                tracing::error!(path = %output.display(), error = %e, "Bundle assembly failed");
                Err(e)
            }
        }
    }

    fn check_cancelled(&self, output: &str) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(DwcaError::Cancelled(format!("Assembly of {output} stopped")));
        }
        Ok(())
    }

    fn options(&self) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.compression_level)
    }

    /// Open `output` for a bundle whose parts the caller streams in
    pub fn begin_streamed(&self, kind: ArchiveKind, output: &Path) -> Result<StreamedBundle> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let partial = partial_path(output);
        let zip = ZipWriter::new(BufWriter::new(File::create(&partial)?));
        Ok(StreamedBundle {
            zip: Some(zip),
            options: self.options(),
            kind,
            partial,
            output: output.to_path_buf(),
            included: Vec::new(),
        })
    }

    fn write_zip(&self, spec: &BundleSpec, file: File) -> Result<Vec<FilePart>> {
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = self.options();

        let mut included = Vec::new();
        for part in spec.kind.parts() {
            let content = spec.parts.iter().find(|(p, _)| p == part).map(|(_, c)| c);
            let content = match content {
                Some(content) if content.has_rows() => Some(content),
                _ if part.is_core() => None,
                _ => continue,
            };

            self.check_cancelled(part.file_name())?;
            zip.start_file(part.file_name(), options)?;
            match content {
                Some(PartContent::BatchFiles(files)) => {
                    write_header(&mut zip, *part)?;
                    for path in files {
                        io::copy(&mut File::open(path)?, &mut zip)?;
                    }
                }
                // Core without rows still gets its header
                None => write_header(&mut zip, *part)?,
            }
            included.push(*part);
        }

        self.check_cancelled(DESCRIPTOR_FILE_NAME)?;
        write_trailer(
            &mut zip,
            options,
            spec.kind,
            &included,
            &spec.metadata,
            spec.process_info.as_deref(),
        )?;

        zip.finish()?.flush()?;
        Ok(included)
    }
}

/// A bundle being written part by part
///
/// Dropping it without [`StreamedBundle::finish`] removes the partial file.
pub struct StreamedBundle {
    zip: Option<ZipWriter<BufWriter<File>>>,
    options: SimpleFileOptions,
    kind: ArchiveKind,
    partial: PathBuf,
    output: PathBuf,
    included: Vec<FilePart>,
}

impl StreamedBundle {
    /// Sink for the next part; see [`LazyEntry`]
    pub fn entry(&mut self, part: FilePart) -> Result<LazyEntry<'_>> {
        let zip = self
            .zip
            .as_mut()
            .ok_or_else(|| DwcaError::Archive("Bundle already finished".to_string()))?;
        Ok(LazyEntry {
            zip,
            included: &mut self.included,
            part,
            options: self.options,
            header_len: header_bytes(part)?.len(),
            pending: Vec::new(),
            started: false,
        })
    }

    /// Write the descriptor and metadata and move the bundle into place
    pub fn finish(mut self, metadata: &str, process_info: Option<&str>) -> Result<Vec<FilePart>> {
        let zip = self
            .zip
            .take()
            .ok_or_else(|| DwcaError::Archive("Bundle already finished".to_string()))?;

        let result = close_streamed(zip, self.options, self.kind, &self.included, metadata, process_info)
            .and_then(|()| Ok(std::fs::rename(&self.partial, &self.output)?));
        if result.is_err() {
            let _ = std::fs::remove_file(&self.partial);
        }
        result?;

        tracing::debug!(
            path = %self.output.display(),
            kind = %self.kind,
            parts = self.included.len(),
            "Assembled streamed bundle"
        );
        Ok(std::mem::take(&mut self.included))
    }
}

impl Drop for StreamedBundle {
    fn drop(&mut self) {
        if let Some(zip) = self.zip.take() {
            drop(zip);
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}

fn close_streamed(
    mut zip: ZipWriter<BufWriter<File>>,
    options: SimpleFileOptions,
    kind: ArchiveKind,
    included: &[FilePart],
    metadata: &str,
    process_info: Option<&str>,
) -> Result<()> {
    write_trailer(&mut zip, options, kind, included, metadata, process_info)?;
    zip.finish()?.flush()?;
    Ok(())
}

/// Zip entry for one streamed part
///
/// The header is held back and the entry is only created once a data row
/// follows it, so an extension without rows never reaches the bundle. The
/// core entry is created on [`LazyEntry::finish`] even when empty.
pub struct LazyEntry<'a> {
    zip: &'a mut ZipWriter<BufWriter<File>>,
    included: &'a mut Vec<FilePart>,
    part: FilePart,
    options: SimpleFileOptions,
    header_len: usize,
    pending: Vec<u8>,
    started: bool,
}

impl LazyEntry<'_> {
    fn start(&mut self) -> io::Result<()> {
        self.zip
            .start_file(self.part.file_name(), self.options)
            .map_err(io::Error::other)?;
        self.zip.write_all(&self.pending)?;
        self.pending.clear();
        self.started = true;
        self.included.push(self.part);
        Ok(())
    }

    /// Close the entry; returns whether the part is in the bundle
    pub fn finish(mut self) -> Result<bool> {
        if !self.started && self.part.is_core() {
            if self.pending.is_empty() {
                self.pending = header_bytes(self.part)?;
            }
            self.start()?;
        }
        Ok(self.started)
    }
}

impl Write for LazyEntry<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.started {
            return self.zip.write(buf);
        }
        self.pending.extend_from_slice(buf);
        if self.pending.len() > self.header_len {
            self.start()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.started {
            self.zip.flush()
        } else {
            Ok(())
        }
    }
}

fn write_trailer<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    kind: ArchiveKind,
    included: &[FilePart],
    metadata: &str,
    process_info: Option<&str>,
) -> Result<()> {
    zip.start_file(DESCRIPTOR_FILE_NAME, options)?;
    zip.write_all(build_descriptor(kind, included)?.as_bytes())?;

    zip.start_file(METADATA_FILE_NAME, options)?;
    zip.write_all(metadata.as_bytes())?;

    if let Some(process_info) = process_info {
        zip.start_file(PROCESS_INFO_FILE_NAME, options)?;
        zip.write_all(process_info.as_bytes())?;
    }
    Ok(())
}

fn header_bytes(part: FilePart) -> Result<Vec<u8>> {
    let mut writer = DelimitedRowWriter::new(Vec::new());
    writer.write_header(part)?;
    writer.into_inner()
}

fn write_header<W: Write>(sink: &mut W, part: FilePart) -> Result<()> {
    sink.write_all(&header_bytes(part)?)?;
    Ok(())
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    output.with_file_name(name)
}

fn write_atomically(output: &Path, write: impl FnOnce(File) -> Result<()>) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = partial_path(output);
    let result = File::create(&partial)
        .map_err(DwcaError::from)
        .and_then(write)
        .and_then(|()| Ok(std::fs::rename(&partial, output)?));

    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::descriptor::ArchiveDescriptor;
    use std::io::Read;
    use tempfile::TempDir;

    fn assembler() -> (ArchiveAssembler, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (ArchiveAssembler::new(None, rx), tx)
    }

    fn entry(path: &Path, name: &str) -> Option<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        Some(content)
    }

    fn spec(parts: Vec<(FilePart, PartContent)>) -> BundleSource {
        BundleSource::Generated(BundleSpec {
            kind: ArchiveKind::Occurrence,
            parts,
            metadata: "<eml/>".to_string(),
            process_info: None,
        })
    }

    #[test]
    fn test_batch_files_are_concatenated_after_header() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("occurrence_a.txt");
        let b = dir.path().join("occurrence_b.txt");
        std::fs::write(&a, "occ-1\n").unwrap();
        std::fs::write(&b, "occ-2\nocc-3\n").unwrap();
        let out = dir.path().join("out/src.zip");

        let (assembler, _tx) = assembler();
        let included = assembler
            .assemble(
                &spec(vec![(FilePart::Occurrence, PartContent::BatchFiles(vec![a, b]))]),
                &out,
            )
            .unwrap();

        assert_eq!(included, vec![FilePart::Occurrence]);
        let occurrences = entry(&out, "occurrence.txt").unwrap();
        let lines: Vec<&str> = occurrences.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("occurrenceID\t"));
        assert_eq!(&lines[1..], &["occ-1", "occ-2", "occ-3"]);
        assert_eq!(entry(&out, "eml.xml").unwrap(), "<eml/>");
        assert!(entry(&out, "processinfo.xml").is_none());
        assert!(!partial_path(&out).exists());
    }

    #[test]
    fn test_empty_extensions_are_omitted() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("src.zip");
        let (assembler, _tx) = assembler();

        let included = assembler
            .assemble(
                &spec(vec![
                    (FilePart::Occurrence, PartContent::BatchFiles(vec![])),
                    (FilePart::MeasurementOrFact, PartContent::BatchFiles(vec![])),
                ]),
                &out,
            )
            .unwrap();

        assert_eq!(included, vec![FilePart::Occurrence]);
        assert!(entry(&out, "extendedMeasurementOrFact.txt").is_none());
        let descriptor = ArchiveDescriptor::from_xml(&entry(&out, "meta.xml").unwrap()).unwrap();
        assert!(descriptor.extensions.is_empty());
    }

    #[test]
    fn test_verbatim_copies_bytes() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("upstream.zip");
        let (assembler, _tx) = assembler();

        let included = assembler
            .assemble(&BundleSource::Verbatim(b"PK-upstream".to_vec()), &out)
            .unwrap();

        assert!(included.is_empty());
        assert_eq!(std::fs::read(&out).unwrap(), b"PK-upstream");
    }

    #[test]
    fn test_cancelled_assembly_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("src.zip");
        let (assembler, tx) = assembler();
        tx.send(true).unwrap();

        let err = assembler
            .assemble(&spec(vec![]), &out)
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!out.exists());
        assert!(!partial_path(&out).exists());
    }

    #[test]
    fn test_missing_batch_file_fails() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("src.zip");
        let (assembler, _tx) = assembler();

        let err = assembler
            .assemble(
                &spec(vec![(
                    FilePart::Occurrence,
                    PartContent::BatchFiles(vec![dir.path().join("gone.txt")]),
                )]),
                &out,
            )
            .unwrap_err();

        assert!(matches!(err, DwcaError::Io(_)));
        assert!(!out.exists());
    }

    fn stream_part(bundle: &mut StreamedBundle, part: FilePart, rows: &[&str]) -> bool {
        let mut entry = bundle.entry(part).unwrap();
        {
            let mut writer = DelimitedRowWriter::new(&mut entry);
            writer.write_header(part).unwrap();
            for row in rows {
                let mut values = vec![""; part.header().len()];
                values[0] = row;
                writer.write_row(&values).unwrap();
            }
            writer.flush().unwrap();
        }
        entry.finish().unwrap()
    }

    #[test]
    fn test_streamed_bundle_skips_extensions_without_rows() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("export/full.zip");
        let (assembler, _tx) = assembler();

        let mut bundle = assembler
            .begin_streamed(ArchiveKind::Occurrence, &out)
            .unwrap();
        assert!(stream_part(&mut bundle, FilePart::Occurrence, &["occ-1", "occ-2"]));
        assert!(!stream_part(&mut bundle, FilePart::MeasurementOrFact, &[]));
        assert!(stream_part(&mut bundle, FilePart::Multimedia, &["img-1"]));
        let included = bundle.finish("<eml/>", None).unwrap();

        assert_eq!(included, vec![FilePart::Occurrence, FilePart::Multimedia]);
        assert_eq!(entry(&out, "occurrence.txt").unwrap().lines().count(), 3);
        assert!(entry(&out, "extendedMeasurementOrFact.txt").is_none());
        let descriptor = ArchiveDescriptor::from_xml(&entry(&out, "meta.xml").unwrap()).unwrap();
        assert_eq!(descriptor.extensions.len(), 1);
        assert!(!partial_path(&out).exists());
    }

    #[test]
    fn test_streamed_core_keeps_header_when_empty() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("empty.zip");
        let (assembler, _tx) = assembler();

        let mut bundle = assembler
            .begin_streamed(ArchiveKind::Occurrence, &out)
            .unwrap();
        assert!(stream_part(&mut bundle, FilePart::Occurrence, &[]));
        bundle.finish("<eml/>", None).unwrap();

        let core = entry(&out, "occurrence.txt").unwrap();
        assert_eq!(core.lines().count(), 1);
        assert!(core.starts_with("occurrenceID\t"));
    }

    #[test]
    fn test_abandoned_streamed_bundle_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("full.zip");
        let (assembler, _tx) = assembler();

        let mut bundle = assembler
            .begin_streamed(ArchiveKind::Occurrence, &out)
            .unwrap();
        stream_part(&mut bundle, FilePart::Occurrence, &["occ-1"]);
        drop(bundle);

        assert!(!out.exists());
        assert!(!partial_path(&out).exists());
    }
}
