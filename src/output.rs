//! Output persistence: the enriched NDJSON artifact and the per-file
//! summary CSV.

use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::FileSummary;
use crate::record::EnrichedRecord;

/// Streams enriched records to a newline-delimited JSON file.
pub struct EnrichedWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

impl EnrichedWriter {
    /// Creates (or truncates) the artifact at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write(&mut self, record: &EnrichedRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out
            .write_all(b"\n")
            .map_err(|e| PipelineError::io(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    /// Flushes buffered lines and syncs the file to disk.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.out.flush().map_err(|e| PipelineError::io(&self.path, e))?;
        self.out
            .get_ref()
            .sync_all()
            .map_err(|e| PipelineError::io(&self.path, e))?;
        debug!(path = %self.path.display(), records = self.written, "Enriched artifact complete");
        Ok(self.path)
    }
}

/// Appends a [`FileSummary`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_summary(path: &Path, summary: &FileSummary) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending summary row");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| PipelineError::io(path, e))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(summary)?;
    writer.flush().map_err(|e| PipelineError::io(path, e))?;

    Ok(())
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FileState;
    use crate::record::WorkRecord;
    use std::fs;

    fn enriched(id: &str) -> EnrichedRecord {
        EnrichedRecord {
            record: WorkRecord {
                id: id.to_string(),
                text: "sel".to_string(),
                ts: "t".to_string(),
                city: None,
                district: None,
            },
            sentiment: None,
            topics: vec!["sel".to_string()],
        }
    }

    #[test]
    fn test_enriched_writer_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = EnrichedWriter::create(dir.path().join("a.jsonl.enriched")).unwrap();
        writer.write(&enriched("1")).unwrap();
        writer.write(&enriched("2")).unwrap();
        let path = writer.finish().unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["id"], "2");
    }

    #[test]
    fn test_append_summary_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");

        let summary = FileSummary::new("a.jsonl").finish(FileState::Archive);
        append_summary(&path, &summary).unwrap();
        append_summary(&path, &summary).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("skipped_400")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_append_summary_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");

        let summary = FileSummary::new("b.jsonl")
            .with_error("disk full")
            .finish(FileState::Failed);
        append_summary(&path, &summary).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("failed"));
        assert!(content.contains("disk full"));
    }
}
