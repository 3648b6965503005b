use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::FileState;
use crate::validate::RejectReason;

/// Per-file processing counters, logged and appended to the summary CSV
/// once the file reaches a terminal stage.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub file: String,
    pub outcome: FileState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub ok: usize,
    /// Rejected for empty text.
    pub skipped_400: usize,
    /// Rejected for text over the length bound.
    pub skipped_413: usize,
    /// Malformed lines, other reject reasons, duplicate ids.
    pub other_err: usize,
    pub chunks: usize,

    pub error: Option<String>,
}

impl FileSummary {
    pub fn new(file: &str) -> Self {
        FileSummary {
            file: file.to_string(),
            outcome: FileState::Processing,
            started_at: Utc::now(),
            finished_at: None,
            ok: 0,
            skipped_400: 0,
            skipped_413: 0,
            other_err: 0,
            chunks: 0,
            error: None,
        }
    }

    pub fn count_reject(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::EmptyText => self.skipped_400 += 1,
            RejectReason::TextTooLong => self.skipped_413 += 1,
            RejectReason::NotARecord | RejectReason::MissingId | RejectReason::MissingTimestamp => {
                self.other_err += 1
            }
        }
    }

    pub fn rejected(&self) -> usize {
        self.skipped_400 + self.skipped_413 + self.other_err
    }

    /// Attach the error that sent the file to quarantine.
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn finish(mut self, outcome: FileState) -> Self {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
        self
    }
}
