//! Minimal schema checks for decoded work-file lines.
//!
//! Checks run in a fixed order and stop at the first failure, so a record
//! that breaks two rules always reports the earlier one:
//! object type, `id`, blank `text`, `text` length, `ts`.

use serde_json::Value;

use crate::record::WorkRecord;

/// Default upper bound on `text` length, in characters.
pub const MAX_LINE_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    NotARecord,
    MissingId,
    EmptyText,
    TextTooLong,
    MissingTimestamp,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotARecord => "not_a_record",
            RejectReason::MissingId => "missing_id",
            RejectReason::EmptyText => "empty_text",
            RejectReason::TextTooLong => "text_too_long",
            RejectReason::MissingTimestamp => "missing_timestamp",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(WorkRecord),
    Rejected { reason: RejectReason },
}

impl ValidationOutcome {
    fn reject(reason: RejectReason) -> Self {
        ValidationOutcome::Rejected { reason }
    }
}

/// Validates a decoded line against the work-record schema.
///
/// Never fails: malformed input comes back as [`ValidationOutcome::Rejected`].
pub fn validate(value: &Value, max_chars: usize) -> ValidationOutcome {
    let Some(obj) = value.as_object() else {
        return ValidationOutcome::reject(RejectReason::NotARecord);
    };

    let id = match obj.get("id").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => id,
        _ => return ValidationOutcome::reject(RejectReason::MissingId),
    };

    let text = obj.get("text").and_then(Value::as_str).unwrap_or("");
    if text.trim().is_empty() {
        return ValidationOutcome::reject(RejectReason::EmptyText);
    }
    if text.chars().count() > max_chars {
        return ValidationOutcome::reject(RejectReason::TextTooLong);
    }

    // `ts` is opaque; any non-null value counts as present.
    let ts = match obj.get("ts") {
        None | Some(Value::Null) => {
            return ValidationOutcome::reject(RejectReason::MissingTimestamp);
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    ValidationOutcome::Valid(WorkRecord {
        id: id.to_string(),
        text: text.to_string(),
        ts,
        city: optional_str(obj.get("city")),
        district: optional_str(obj.get("district")),
    })
}

fn optional_str(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}
