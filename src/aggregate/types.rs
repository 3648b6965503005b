//! Data types used by the aggregation store and its snapshot output.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

use crate::record::SentimentLabel;

/// Series identity. A `None` district is the city-level series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregationKey {
    pub city: String,
    pub district: Option<String>,
    pub topic: String,
}

impl AggregationKey {
    pub fn city_level(city: &str, topic: &str) -> Self {
        Self {
            city: city.to_string(),
            district: None,
            topic: topic.to_string(),
        }
    }

    pub fn district_level(city: &str, district: &str, topic: &str) -> Self {
        Self {
            city: city.to_string(),
            district: Some(district.to_string()),
            topic: topic.to_string(),
        }
    }

    pub fn level(&self) -> Level {
        if self.district.is_some() {
            Level::District
        } else {
            Level::City
        }
    }
}

/// One observation in a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Observation {
    pub(crate) at: DateTime<Utc>,
    pub(crate) sentiment: Option<SentimentLabel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    City,
    District,
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "city" => Ok(Level::City),
            "district" => Ok(Level::District),
            other => Err(anyhow!("unknown aggregation level '{other}', expected city or district")),
        }
    }
}

/// Sentiment tally for one series; unlabeled observations are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentSummary {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentSummary {
    pub(crate) fn tally(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
    }
}

/// Aggregate for a single key within the requested window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateItem {
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub topic: String,
    pub count: usize,
    pub sentiment_summary: SentimentSummary,
}

/// Point-in-time read of the store for one level and window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub level: Level,
    pub window_sec: u64,
    pub items: Vec<AggregateItem>,
    pub purged_count: usize,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Sum of `count` across all items.
    pub fn total_count(&self) -> usize {
        self.items.iter().map(|i| i.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parses_case_insensitively() {
        assert_eq!("city".parse::<Level>().unwrap(), Level::City);
        assert_eq!(" District ".parse::<Level>().unwrap(), Level::District);
    }

    #[test]
    fn test_unknown_level_rejected() {
        let err = "province".parse::<Level>().unwrap_err();
        assert!(err.to_string().contains("province"));
    }
}
