//! Directory-based work queue.
//!
//! Work files move `inbox/ → processing/ → archive/` (or `failed/`). Lines
//! are validated, grouped into fixed-size chunks, enriched, and streamed to
//! an `.enriched` artifact that lands in `archive/` beside the raw file.
//! Failures are contained per line, per chunk, and per file; the discovery
//! loop itself never stops because one file failed.

mod state;
mod summary;

pub use state::{DirLayout, FileState, WorkFile, move_file, unique_target};
pub use summary::FileSummary;

use chrono::Utc;
use std::collections::HashSet;
use std::fs::{self, File};
use std::future::Future;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::aggregate::AggregationStore;
use crate::config::PipelineConfig;
use crate::enrich::BatchEnricher;
use crate::error::{PipelineError, Result};
use crate::output::{EnrichedWriter, append_summary};
use crate::record::{WorkRecord, parse_line};
use crate::validate::{RejectReason, ValidationOutcome, validate};

const ENRICHED_SUFFIX: &str = "enriched";

/// Verdict for one raw line of a work file.
#[derive(Debug)]
enum LineVerdict {
    Blank,
    Malformed,
    Duplicate(String),
    Rejected(RejectReason),
    Valid(WorkRecord),
}

fn judge_line(raw: &[u8], max_chars: usize, seen: &mut HashSet<String>) -> LineVerdict {
    let Ok(line) = std::str::from_utf8(raw) else {
        return LineVerdict::Malformed;
    };
    if line.trim().is_empty() {
        return LineVerdict::Blank;
    }
    let Ok(value) = parse_line(line) else {
        return LineVerdict::Malformed;
    };
    match validate(&value, max_chars) {
        ValidationOutcome::Rejected { reason } => LineVerdict::Rejected(reason),
        ValidationOutcome::Valid(record) => {
            if seen.insert(record.id.clone()) {
                LineVerdict::Valid(record)
            } else {
                LineVerdict::Duplicate(record.id)
            }
        }
    }
}

/// Reads the next `\n`-terminated line into `buf`. Returns `false` at EOF.
fn next_line(reader: &mut impl BufRead, buf: &mut Vec<u8>, path: &Path) -> Result<bool> {
    buf.clear();
    let n = reader
        .read_until(b'\n', buf)
        .map_err(|e| PipelineError::io(path, e))?;
    Ok(n > 0)
}

/// Validates every line of `path` without moving or enriching anything.
pub fn check_file(path: &Path, max_chars: usize) -> Result<FileSummary> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut summary = FileSummary::new(&name);
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut seen = HashSet::new();
    let mut buf = Vec::new();

    while next_line(&mut reader, &mut buf, path)? {
        match judge_line(&buf, max_chars, &mut seen) {
            LineVerdict::Blank => {}
            LineVerdict::Malformed | LineVerdict::Duplicate(_) => summary.other_err += 1,
            LineVerdict::Rejected(reason) => summary.count_reject(reason),
            LineVerdict::Valid(_) => summary.ok += 1,
        }
    }
    Ok(summary)
}

pub struct Pipeline {
    config: PipelineConfig,
    layout: DirLayout,
    enricher: BatchEnricher,
    store: Arc<AggregationStore>,
}

impl Pipeline {
    /// Builds the pipeline and creates the stage directories.
    pub fn new(
        config: PipelineConfig,
        enricher: BatchEnricher,
        store: Arc<AggregationStore>,
    ) -> Result<Self> {
        let layout = DirLayout::new(&config.root);
        layout.ensure()?;
        Ok(Self {
            config,
            layout,
            enricher,
            store,
        })
    }

    pub fn layout(&self) -> &DirLayout {
        &self.layout
    }

    fn is_work_file(&self, path: &Path) -> bool {
        path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(self.config.extension.as_str())
    }

    /// Lists finished work files in the inbox, in lexical order. Files
    /// still being written carry another extension and are skipped.
    pub fn discover(&self) -> Result<Vec<WorkFile>> {
        let inbox = self.layout.dir(FileState::Inbox);
        let mut paths = Vec::new();
        for entry in fs::read_dir(&inbox).map_err(|e| PipelineError::io(&inbox, e))? {
            let path = entry.map_err(|e| PipelineError::io(&inbox, e))?.path();
            if self.is_work_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|p| WorkFile::new(p, FileState::Inbox))
            .collect())
    }

    /// Moves raw work files stranded in `processing/` by an earlier process
    /// to `failed/`. Partial `.enriched` outputs stay where they are.
    pub fn recover_stranded(&self) -> Result<usize> {
        let processing = self.layout.dir(FileState::Processing);
        let mut stranded = Vec::new();
        for entry in fs::read_dir(&processing).map_err(|e| PipelineError::io(&processing, e))? {
            let path = entry.map_err(|e| PipelineError::io(&processing, e))?.path();
            if self.is_work_file(&path) {
                stranded.push(path);
            }
        }
        stranded.sort();

        for path in &stranded {
            let failed = WorkFile::new(path, FileState::Processing).quarantine(&self.layout)?;
            warn!(path = %failed.path.display(), "Recovered stranded work file into quarantine");
        }
        Ok(stranded.len())
    }

    /// One discovery pass: processes every ready inbox file in order.
    pub async fn scan_once(&self) -> Vec<FileSummary> {
        let files = match self.discover() {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "Inbox scan failed");
                return Vec::new();
            }
        };
        if !files.is_empty() {
            debug!(count = files.len(), "Work files discovered");
        }

        let mut summaries = Vec::with_capacity(files.len());
        for file in files {
            if let Some(summary) = self.process(&file).await {
                summaries.push(summary);
            }
        }
        summaries
    }

    /// Runs one work file through its lifecycle. Returns `None` if the file
    /// could not be claimed (it stays in the inbox).
    #[tracing::instrument(skip(self, file), fields(file = %file.name()))]
    pub async fn process(&self, file: &WorkFile) -> Option<FileSummary> {
        let claimed = match file.claim(&self.layout) {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(error = %e, "Could not claim work file");
                return None;
            }
        };

        let mut summary = FileSummary::new(&file.name());
        let output_path = unique_target(
            &self.layout.dir(FileState::Processing),
            &format!("{}.{}", claimed.name(), ENRICHED_SUFFIX),
        );

        let driven = self.drive(&claimed, &output_path, &mut summary).await;
        let summary = match driven {
            Ok(()) => self.settle_archive(&claimed, &output_path, summary),
            Err(e) => self.settle_failed(&claimed, summary, &e),
        };

        info!(
            outcome = ?summary.outcome,
            ok = summary.ok,
            skipped_400 = summary.skipped_400,
            skipped_413 = summary.skipped_413,
            other_err = summary.other_err,
            chunks = summary.chunks,
            "Work file finished"
        );
        if let Err(e) = append_summary(&self.layout.summary_path(), &summary) {
            warn!(error = %e, "Could not append to summary log");
        }
        Some(summary)
    }

    /// Reads, validates, and enriches every line of a claimed file.
    async fn drive(&self, claimed: &WorkFile, output_path: &Path, summary: &mut FileSummary) -> Result<()> {
        let file = File::open(&claimed.path).map_err(|e| PipelineError::io(&claimed.path, e))?;
        let mut reader = BufReader::new(file);
        let mut writer = EnrichedWriter::create(output_path)?;

        let mut seen = HashSet::new();
        let mut chunk: Vec<WorkRecord> = Vec::with_capacity(self.config.chunk_size);
        let mut buf = Vec::new();

        while next_line(&mut reader, &mut buf, &claimed.path)? {
            match judge_line(&buf, self.config.max_line_chars, &mut seen) {
                LineVerdict::Blank => {}
                LineVerdict::Malformed => summary.other_err += 1,
                LineVerdict::Duplicate(id) => {
                    warn!(id = %id, "Duplicate id in work file, line skipped");
                    summary.other_err += 1;
                }
                LineVerdict::Rejected(reason) => {
                    debug!(reason = %reason, "Line rejected");
                    summary.count_reject(reason);
                }
                LineVerdict::Valid(record) => {
                    chunk.push(record);
                    if chunk.len() >= self.config.chunk_size {
                        self.flush_chunk(&mut chunk, &mut writer, summary).await?;
                    }
                }
            }
        }
        self.flush_chunk(&mut chunk, &mut writer, summary).await?;
        writer.finish()?;
        Ok(())
    }

    async fn flush_chunk(
        &self,
        chunk: &mut Vec<WorkRecord>,
        writer: &mut EnrichedWriter,
        summary: &mut FileSummary,
    ) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = chunk.iter().map(|r| r.id.clone()).collect();
        let mut enriched = self.enricher.enrich(std::mem::take(chunk)).await;
        summary.chunks += 1;

        for id in ids {
            match enriched.remove(&id) {
                Some(record) => {
                    writer.write(&record)?;
                    summary.ok += 1;
                }
                None => {
                    warn!(id = %id, "Enricher returned no record for id");
                    summary.other_err += 1;
                }
            }
        }
        Ok(())
    }

    fn settle_archive(&self, claimed: &WorkFile, output_path: &Path, summary: FileSummary) -> FileSummary {
        let archived = match claimed.archive(&self.layout) {
            Ok(archived) => archived,
            Err(e) => return self.settle_failed(claimed, summary, &e),
        };

        let target = unique_target(
            &self.layout.dir(FileState::Archive),
            &format!("{}.{}", archived.name(), ENRICHED_SUFFIX),
        );
        match move_file(output_path, &target) {
            Ok(()) => summary.finish(FileState::Archive),
            Err(e) => {
                error!(error = %e, "Raw file archived but enriched output could not follow");
                summary.with_error(&e.to_string()).finish(FileState::Archive)
            }
        }
    }

    fn settle_failed(&self, claimed: &WorkFile, summary: FileSummary, cause: &PipelineError) -> FileSummary {
        error!(error = %cause, "Work file failed, moving to quarantine");
        if let Err(e) = claimed.quarantine(&self.layout) {
            error!(error = %e, "Quarantine move failed, file left in processing");
        }
        summary
            .with_error(&cause.to_string())
            .finish(FileState::Failed)
    }

    /// Discovery loop: scan, sweep stale aggregates, sleep, repeat.
    ///
    /// Stops after `max_polls` scans (0 = run forever) or when `shutdown`
    /// resolves. Shutdown is only observed between scans, so a file in
    /// flight always reaches Archive or Failed.
    pub async fn run(&self, max_polls: usize, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut polls = 0usize;

        info!(
            root = %self.config.root.display(),
            poll_secs = self.config.poll_interval.as_secs_f64(),
            chunk_size = self.config.chunk_size,
            "Ingestion worker started"
        );

        loop {
            polls += 1;
            let summaries = self.scan_once().await;
            let purged = self.store.purge(Utc::now());
            if !summaries.is_empty() || purged > 0 {
                debug!(files = summaries.len(), purged, "Scan complete");
            }

            if max_polls > 0 && polls >= max_polls {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping worker");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(polls, "Ingestion worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge_line_variants() {
        let mut seen = HashSet::new();
        assert!(matches!(judge_line(b"   \n", 100, &mut seen), LineVerdict::Blank));
        assert!(matches!(judge_line(b"{oops", 100, &mut seen), LineVerdict::Malformed));
        assert!(matches!(judge_line(&[0xff, 0xfe, b'\n'], 100, &mut seen), LineVerdict::Malformed));
        assert!(matches!(
            judge_line(br#"{"id":"1","text":"","ts":"t"}"#, 100, &mut seen),
            LineVerdict::Rejected(RejectReason::EmptyText)
        ));
        assert!(matches!(
            judge_line(br#"{"id":"1","text":"a","ts":"t"}"#, 100, &mut seen),
            LineVerdict::Valid(_)
        ));
        assert!(matches!(
            judge_line(br#"{"id":"1","text":"b","ts":"t"}"#, 100, &mut seen),
            LineVerdict::Duplicate(_)
        ));
    }

    #[test]
    fn test_check_file_counts_without_moving() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.jsonl");
        let long = "a".repeat(20);
        fs::write(
            &path,
            format!(
                "{}\n{}\n{}\n\nnot json\n",
                r#"{"id":"1","text":"ok","ts":"t"}"#,
                r#"{"id":"2","text":" ","ts":"t"}"#,
                format!(r#"{{"id":"3","text":"{long}","ts":"t"}}"#),
            ),
        )
        .unwrap();

        let summary = check_file(&path, 10).unwrap();
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.skipped_400, 1);
        assert_eq!(summary.skipped_413, 1);
        assert_eq!(summary.other_err, 1);
        assert!(path.exists());
    }
}
