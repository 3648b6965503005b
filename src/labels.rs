//! Topic label post-processing.
//!
//! Turns the raw candidate list from the topic classifier into a short
//! label set: threshold, relative margin around the leader, top-k, then
//! grouped de-duplication so overlapping topics are reported once.

use anyhow::{Context, Result};
use std::collections::HashSet;

use crate::record::TopicCandidate;

/// Thresholds applied by [`select`].
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPolicy {
    pub top_k: usize,
    pub min_score: f64,
    pub rel_margin: f64,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.35,
            rel_margin: 0.02,
        }
    }
}

/// Sets of labels that describe the same thing; at most one label per set
/// survives [`select`].
///
/// Stored on disk as a JSON array of arrays:
/// ```json
/// [["trafik", "ulaşım"], ["yağış", "sel"]]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TopicGroups {
    groups: Vec<HashSet<String>>,
}

impl Default for TopicGroups {
    fn default() -> Self {
        Self::from_sets(vec![
            vec!["trafik", "ulaşım"],
            vec!["yağış", "sel"],
            vec!["enerji", "elektrik kesintisi"],
        ])
    }
}

impl TopicGroups {
    pub fn from_sets<S: Into<String>>(sets: Vec<Vec<S>>) -> Self {
        Self {
            groups: sets
                .into_iter()
                .map(|set| set.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self { groups: Vec::new() }
    }

    /// Loads the group table from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading topic groups from '{path}'"))?;
        let sets: Vec<Vec<String>> = serde_json::from_str(&content)
            .with_context(|| format!("parsing topic groups in '{path}'"))?;
        Ok(Self::from_sets(sets))
    }

    /// True if `a` and `b` are both members of one group.
    pub fn overlap(&self, a: &str, b: &str) -> bool {
        self.groups
            .iter()
            .any(|g| g.contains(a) && g.contains(b))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Applies the label policy to `candidates` and returns accepted labels,
/// best first.
///
/// Ties keep their input order (stable sort), so the result is a pure
/// function of the candidate order the classifier produced.
pub fn select(candidates: &[TopicCandidate], policy: &LabelPolicy, groups: &TopicGroups) -> Vec<String> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<&TopicCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    ranked.retain(|c| c.score.is_finite() && c.score >= policy.min_score);
    let Some(top) = ranked.first().map(|c| c.score) else {
        return Vec::new();
    };

    ranked.retain(|c| c.score >= top - policy.rel_margin);
    ranked.truncate(policy.top_k);

    let mut kept: Vec<String> = Vec::with_capacity(ranked.len());
    for candidate in ranked {
        let label = candidate.label.as_str();
        let clashes = kept
            .iter()
            .any(|k| k == label || groups.overlap(k, label));
        if !clashes {
            kept.push(label.to_string());
        }
    }
    kept
}
