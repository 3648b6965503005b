//! Record types flowing through ingestion: raw work lines, classifier
//! output, and the enriched copy written to the output artifact.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One validated line of a work file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: String,
    pub text: String,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
}

impl WorkRecord {
    /// City used for aggregation, if the record carries a non-blank one.
    pub fn aggregation_city(&self) -> Option<&str> {
        non_blank(self.city.as_deref())
    }

    /// District used for aggregation. A blank district counts as absent.
    pub fn aggregation_district(&self) -> Option<&str> {
        non_blank(self.district.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

/// Sentiment classification for a single record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

/// A raw `(label, score)` pair proposed by the topic classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCandidate {
    pub label: String,
    pub score: f64,
}

impl TopicCandidate {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// A work record plus its sentiment and accepted topic labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: WorkRecord,
    pub sentiment: Option<Sentiment>,
    pub topics: Vec<String>,
}

/// Decodes one line of a work file into a generic JSON value.
///
/// Schema checks happen later in [`crate::validate`]; this only rejects
/// input that is not JSON at all.
pub fn parse_line(line: &str) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(line)?)
}
