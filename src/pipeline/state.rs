use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Lifecycle stage of a work file; each stage is a directory under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Inbox,
    Processing,
    Archive,
    Failed,
}

/// Directory layout of the work queue.
#[derive(Debug, Clone)]
pub struct DirLayout {
    pub root: PathBuf,
}

impl DirLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir(&self, state: FileState) -> PathBuf {
        let name = match state {
            FileState::Inbox => "inbox",
            FileState::Processing => "processing",
            FileState::Archive => "archive",
            FileState::Failed => "failed",
        };
        self.root.join(name)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("ingest_summary.csv")
    }

    /// Creates all stage directories if missing.
    pub fn ensure(&self) -> Result<()> {
        for state in [
            FileState::Inbox,
            FileState::Processing,
            FileState::Archive,
            FileState::Failed,
        ] {
            let dir = self.dir(state);
            fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// A work file and the stage it currently sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFile {
    pub path: PathBuf,
    pub state: FileState,
}

impl WorkFile {
    pub fn new(path: impl Into<PathBuf>, state: FileState) -> Self {
        Self {
            path: path.into(),
            state,
        }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Inbox → Processing.
    pub fn claim(&self, layout: &DirLayout) -> Result<WorkFile> {
        self.transition(layout, FileState::Inbox, FileState::Processing)
    }

    /// Processing → Archive.
    pub fn archive(&self, layout: &DirLayout) -> Result<WorkFile> {
        self.transition(layout, FileState::Processing, FileState::Archive)
    }

    /// Processing → Failed.
    pub fn quarantine(&self, layout: &DirLayout) -> Result<WorkFile> {
        self.transition(layout, FileState::Processing, FileState::Failed)
    }

    fn transition(&self, layout: &DirLayout, from: FileState, to: FileState) -> Result<WorkFile> {
        if self.state != from {
            return Err(PipelineError::IllegalTransition {
                path: self.path.clone(),
                from: self.state,
                to,
            });
        }
        let target = unique_target(&layout.dir(to), &self.name());
        move_file(&self.path, &target)?;
        debug!(from = ?from, to = ?to, path = %target.display(), "Work file moved");
        Ok(WorkFile::new(target, to))
    }
}

/// Returns `dir/name`, or a timestamp-suffixed variant if that name is taken.
pub fn unique_target(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");

    let mut n = 0u32;
    loop {
        let suffix = if n == 0 {
            format!("{stem}-{stamp}{ext}")
        } else {
            format!("{stem}-{stamp}-{n}{ext}")
        };
        let candidate = dir.join(suffix);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Moves `from` to `to`, atomically when both sit on one filesystem.
///
/// Across filesystems the file is copied, the copy's length checked against
/// the source, and only then is the source removed.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            warn!(from = %from.display(), to = %to.display(), "Rename crosses devices, copying instead");
            copy_then_delete(from, to)
        }
        Err(source) => Err(PipelineError::Move {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}

fn copy_then_delete(from: &Path, to: &Path) -> Result<()> {
    let move_err = |source| PipelineError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let expected = fs::metadata(from).map_err(move_err)?.len();
    fs::copy(from, to).map_err(move_err)?;

    verify_copy(to, expected)?;
    fs::remove_file(from).map_err(move_err)
}

/// Checks the copy at `to` holds `expected` bytes; a short or long copy is
/// removed so only the source remains.
fn verify_copy(to: &Path, expected: u64) -> Result<()> {
    let found = fs::metadata(to).map_err(|e| PipelineError::io(to, e))?.len();
    if found != expected {
        let _ = fs::remove_file(to);
        return Err(PipelineError::CopyMismatch {
            to: to.to_path_buf(),
            expected,
            found,
        });
    }
    Ok(())
}
