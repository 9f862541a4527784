//! SQL generation for a clinical data warehouse
//!
//! Input records are drafted into SQL fragments by a language model, the
//! concatenated script is executed in one transaction and checked against
//! per-table predicates, and failures are fed back to a repair step that
//! rewrites only the fragments it names. The loop stops at COMPLETE or after a
//! bounded number of repairs.
//!
//! ```text
//! json/<target>/*.json -> Drafter -> FragmentStore -> Executor + Validator
//!                                          ^                 |
//!                                          +---- Repairer <--+ (retry)
//! ```
//!
//! Model-facing pieces (clients, conversation, response parsing) live in the
//! `cdw-agentic` crate.

pub mod config;
pub mod database;
pub mod drafter;
pub mod error;
pub mod executor;
pub mod fragment_store;
pub mod input;
pub mod orchestrator;
pub mod output;
pub mod repairer;
pub mod validator;

pub use config::PipelineConfig;
pub use drafter::{Drafter, LlmDrafter, DEFAULT_SYSTEM_PROMPT};
pub use error::{ErrorClass, PipelineError, Result};
pub use executor::{DatabaseConfig, ExecutionVerdict, RunOutcome, ScriptExecutor, SqlExecutor};
pub use fragment_store::{Fragment, FragmentStore};
pub use input::{read_records, InputRecord};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, Phase, RunReport, RunState};
pub use output::{FileSink, OutputSink};
pub use repairer::{LlmRepairer, Repairer};
pub use validator::{omop_registry, CheckSet, ValidationVerdict, ValidatorRegistry};
