use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::FileState;

/// Failures that end processing of one work file, or reject startup
/// configuration.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot move '{}' to '{}': {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("copy of '{}' did not verify: expected {expected} bytes, found {found}", to.display())]
    CopyMismatch {
        to: PathBuf,
        expected: u64,
        found: u64,
    },
    #[error("work file '{}' cannot go from {from:?} to {to:?}", path.display())]
    IllegalTransition {
        path: PathBuf,
        from: FileState,
        to: FileState,
    },
    #[error("failed to encode enriched record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("summary log error: {0}")]
    Summary(#[from] csv::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
