//! Pipeline configuration
//!
//! Optional YAML file; every field has a default so an empty file (or none at
//! all) gives the stock layout: `json/<target>/` in, `SQL/` and `logs/` out.

use std::path::{Path, PathBuf};

use cdw_agentic::LlmSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::drafter::DEFAULT_SYSTEM_PROMPT;
use crate::error::PipelineError;
use crate::executor::DatabaseConfig;
use crate::orchestrator::DEFAULT_RETRY_CEILING;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target: Option<String>,
    /// Defaults to `json/<target>`
    pub input_dir: Option<PathBuf>,
    /// System prompt file; the embedded prompt is used when unset
    pub prompt_path: Option<PathBuf>,
    pub sql_dir: PathBuf,
    pub log_dir: PathBuf,
    pub retry_ceiling: u32,
    pub database: DatabaseConfig,
    pub llm: LlmSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: None,
            input_dir: None,
            prompt_path: None,
            sql_dir: PathBuf::from("SQL"),
            log_dir: PathBuf::from("logs"),
            retry_ceiling: DEFAULT_RETRY_CEILING,
            database: DatabaseConfig::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded pipeline config");
        Self::from_yaml(&content)
    }

    pub fn input_dir_for(&self, target: &str) -> PathBuf {
        self.input_dir
            .clone()
            .unwrap_or_else(|| crate::input::default_input_dir(Path::new("."), target))
    }

    pub fn system_prompt(&self) -> Result<String, PipelineError> {
        match &self.prompt_path {
            Some(path) => std::fs::read_to_string(path)
                .map(|p| p.trim().to_string())
                .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e))),
            None => Ok(DEFAULT_SYSTEM_PROMPT.trim().to_string()),
        }
    }
}
