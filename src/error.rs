//! Error types for the generation pipeline
//!
//! Every failure is classified as fatal (abort the run), retryable (consume a
//! repair attempt) or soft (log and continue).

use std::path::PathBuf;

use thiserror::Error;

/// How the orchestrator reacts to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Abort the run, no retry
    Fatal,
    /// Consumes one retry attempt and routes to repair
    Retryable,
    /// Logged, never aborts and never costs an extra retry
    Soft,
}

/// Fragment store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Step '{step_id}' already exists in the fragment store")]
    DuplicateStepId { step_id: String },

    #[error("Step '{step_id}' not found in the fragment store")]
    StepNotFound { step_id: String },

    #[error("Corrupt fragment store: {reason}")]
    CorruptStore { reason: String },

    #[error("Fragment store I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Input source errors
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input directory not readable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Executor errors that are not a verdict on the script itself
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("SQL file not found: {path}")]
    ScriptNotFound { path: PathBuf },

    #[error("Invalid connection descriptor: {0}")]
    Descriptor(String),

    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Cannot read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Durable output errors
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serialize transcript: {0}")]
    Transcript(String),
}

/// Top-level pipeline error
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Fragment store error: {0}")]
    Store(#[from] StoreError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(#[source] anyhow::Error),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Executor(ExecutorError::Connection(_)) => ErrorClass::Retryable,
            PipelineError::Llm(_) => ErrorClass::Retryable,
            PipelineError::Store(StoreError::DuplicateStepId { .. })
            | PipelineError::Store(StoreError::StepNotFound { .. }) => ErrorClass::Soft,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
