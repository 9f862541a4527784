//! Input records
//!
//! One JSON document per generation step, read once at pipeline start from
//! `json/<target>/` in file-name order.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::InputError;

/// One structured unit of work with its ordinal position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputRecord {
    pub position: usize,
    pub source: PathBuf,
    pub payload: serde_json::Value,
}

impl InputRecord {
    pub fn new(position: usize, payload: serde_json::Value) -> Self {
        Self {
            position,
            source: PathBuf::new(),
            payload,
        }
    }

    /// Deterministic pretty JSON (object keys are kept sorted by serde_json)
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.payload).unwrap_or_else(|_| self.payload.to_string())
    }

    /// User turn sent to the drafter
    pub fn prompt(&self) -> String {
        format!(
            "Here is JSON number {}:\n\n{}",
            self.position,
            self.to_pretty_json()
        )
    }

    /// Label used in the post-drafting summary turn
    pub fn summary(&self) -> String {
        format!("JSON {}:\n{}", self.position, self.to_pretty_json())
    }
}

/// Default input directory for a target
pub fn default_input_dir(root: &Path, target: &str) -> PathBuf {
    root.join("json").join(target)
}

/// Read every regular file in `dir` as one record, ordered by file name
pub fn read_records(dir: &Path) -> Result<Vec<InputRecord>, InputError> {
    let unreadable = |source| InputError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut records = Vec::with_capacity(paths.len());
    for (position, path) in paths.into_iter().enumerate() {
        let text = std::fs::read_to_string(&path).map_err(|source| InputError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let payload =
            serde_json::from_str(&text).map_err(|source| InputError::InvalidJson {
                path: path.clone(),
                source,
            })?;
        debug!(position, path = %path.display(), "loaded input record");
        records.push(InputRecord {
            position,
            source: path,
            payload,
        });
    }

    info!(dir = %dir.display(), count = records.len(), "input records loaded");
    Ok(records)
}
