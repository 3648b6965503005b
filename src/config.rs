//! Startup configuration. Read once; nothing here reloads at runtime.

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::aggregate::{DEFAULT_WINDOW_SECS, parse_window};
use crate::error::{PipelineError, Result};
use crate::labels::{LabelPolicy, TopicGroups};
use crate::validate::MAX_LINE_CHARS;

/// Settings that drive the directory work queue.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding `inbox/`, `processing/`, `archive/`, `failed/`.
    pub root: PathBuf,
    pub poll_interval: Duration,
    /// Records per enrichment call.
    pub chunk_size: usize,
    pub max_line_chars: usize,
    /// Extension (without the dot) that marks a finished work file.
    pub extension: String,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: Duration::from_secs(1),
            chunk_size: 10,
            max_line_chars: MAX_LINE_CHARS,
            extension: "jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub label_policy: LabelPolicy,
    pub groups: TopicGroups,
    /// Window used for reports; also the store's initial retention.
    pub default_window: String,
    pub nlp_url: Option<String>,
    pub nlp_api_key: Option<String>,
}

impl Config {
    pub fn default_window_secs(&self) -> u64 {
        parse_window(&self.default_window).unwrap_or(DEFAULT_WINDOW_SECS)
    }
}

/// Configuration flags shared by every subcommand. Each flag falls back to
/// an environment variable, which `.env` may provide.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Root directory of the work queue
    #[arg(long, env = "CITY_PULSE_ROOT", default_value = "data")]
    pub root: PathBuf,

    /// Seconds between inbox scans
    #[arg(long, env = "CITY_PULSE_POLL_SECS", default_value_t = 1)]
    pub poll_secs: u64,

    /// Records per enrichment batch
    #[arg(long, env = "CITY_PULSE_CHUNK_SIZE", default_value_t = 10)]
    pub chunk_size: usize,

    /// Maximum `text` length in characters
    #[arg(long, env = "CITY_PULSE_MAX_LINE_CHARS", default_value_t = MAX_LINE_CHARS)]
    pub max_line_chars: usize,

    /// Extension of finished work files
    #[arg(long, env = "CITY_PULSE_EXTENSION", default_value = "jsonl")]
    pub extension: String,

    /// Maximum topic labels per record
    #[arg(long, env = "CITY_PULSE_TOP_K", default_value_t = 3)]
    pub top_k: usize,

    /// Minimum topic score
    #[arg(long, env = "CITY_PULSE_MIN_SCORE", default_value_t = 0.35)]
    pub min_score: f64,

    /// Keep topics scoring within this distance of the best one
    #[arg(long, env = "CITY_PULSE_REL_MARGIN", default_value_t = 0.02)]
    pub rel_margin: f64,

    /// JSON file with topic de-duplication groups (built-in table if unset)
    #[arg(long, env = "CITY_PULSE_GROUPS_FILE")]
    pub groups_file: Option<String>,

    /// Default aggregation window, e.g. 15m or 1h
    #[arg(long, env = "CITY_PULSE_WINDOW", default_value = "15m")]
    pub window: String,

    /// Base URL of the NLP inference service (offline lexicon if unset)
    #[arg(long, env = "CITY_PULSE_NLP_URL")]
    pub nlp_url: Option<String>,

    /// Bearer token for the NLP inference service
    #[arg(long, env = "CITY_PULSE_NLP_API_KEY", hide_env_values = true)]
    pub nlp_api_key: Option<String>,
}

impl ConfigArgs {
    /// Validates the flags and loads the group table.
    pub fn into_config(self) -> Result<Config> {
        if self.chunk_size == 0 {
            return Err(PipelineError::Config("chunk size must be at least 1".into()));
        }
        if self.top_k == 0 {
            return Err(PipelineError::Config("top-k must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(PipelineError::Config(format!(
                "min score {} is outside [0, 1]",
                self.min_score
            )));
        }
        if !(0.0..=1.0).contains(&self.rel_margin) {
            return Err(PipelineError::Config(format!(
                "relative margin {} is outside [0, 1]",
                self.rel_margin
            )));
        }
        let extension = self.extension.trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(PipelineError::Config("work-file extension is empty".into()));
        }

        let groups = match &self.groups_file {
            Some(path) => {
                TopicGroups::load(path).map_err(|e| PipelineError::Config(format!("{e:#}")))?
            }
            None => TopicGroups::default(),
        };

        Ok(Config {
            pipeline: PipelineConfig {
                root: self.root,
                poll_interval: Duration::from_secs(self.poll_secs),
                chunk_size: self.chunk_size,
                max_line_chars: self.max_line_chars,
                extension,
            },
            label_policy: LabelPolicy {
                top_k: self.top_k,
                min_score: self.min_score,
                rel_margin: self.rel_margin,
            },
            groups,
            default_window: self.window,
            nlp_url: self.nlp_url,
            nlp_api_key: self.nlp_api_key,
        })
    }
}
