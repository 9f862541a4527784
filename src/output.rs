//! Durable output
//!
//! The final script is written only on COMPLETE and the transcript only on
//! FAILED, both under names keyed by target.

use std::path::{Path, PathBuf};

use cdw_agentic::Conversation;
use tracing::info;

use crate::error::OutputError;
use crate::fragment_store::FragmentStore;

pub trait OutputSink: Send + Sync {
    /// Persist the final rendered script; returns where it went
    fn persist_script(&self, target: &str, store: &FragmentStore) -> Result<PathBuf, OutputError>;

    /// Persist the full conversation as a round-trippable error log
    fn persist_transcript(
        &self,
        target: &str,
        conversation: &Conversation,
    ) -> Result<PathBuf, OutputError>;
}

/// Writes `<sql_dir>/<target>_insert.sql` and `<log_dir>/<target>_error.json`
#[derive(Debug, Clone)]
pub struct FileSink {
    sql_dir: PathBuf,
    log_dir: PathBuf,
}

impl FileSink {
    pub fn new(sql_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            sql_dir: sql_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn script_path(&self, target: &str) -> PathBuf {
        self.sql_dir.join(format!("{}_insert.sql", target))
    }

    pub fn transcript_path(&self, target: &str) -> PathBuf {
        self.log_dir.join(format!("{}_error.json", target))
    }
}

fn write(path: &Path, contents: &str) -> Result<(), OutputError> {
    let to_err = |source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(to_err)?;
    }
    std::fs::write(path, contents).map_err(to_err)
}

impl OutputSink for FileSink {
    fn persist_script(&self, target: &str, store: &FragmentStore) -> Result<PathBuf, OutputError> {
        let path = self.script_path(target);
        write(&path, &store.render())?;
        info!(path = %path.display(), fragments = store.len(), "final script written");
        Ok(path)
    }

    fn persist_transcript(
        &self,
        target: &str,
        conversation: &Conversation,
    ) -> Result<PathBuf, OutputError> {
        let path = self.transcript_path(target);
        let json = conversation
            .to_json_pretty()
            .map_err(|e| OutputError::Transcript(e.to_string()))?;
        write(&path, &json)?;
        info!(path = %path.display(), messages = conversation.len(), "error log written");
        Ok(path)
    }
}
