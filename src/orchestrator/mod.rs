//! Orchestrator
//!
//! Drives one target through DRAFTING, then EXECUTING and REPAIRING until the
//! run is COMPLETE or the retry ceiling sends it to FAILED. Everything it talks
//! to is injected, so the loop runs the same against stubs and against a live
//! model and database.

pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drafter::{Drafter, DEFAULT_SYSTEM_PROMPT};
use crate::error::{OutputError, PipelineError, Result};
use crate::executor::ScriptExecutor;
use crate::input::InputRecord;
use crate::output::OutputSink;
use crate::repairer::Repairer;
use crate::validator::ValidatorRegistry;

pub use state::{Decision, Phase, RunState};

pub const DEFAULT_RETRY_CEILING: u32 = 5;

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target: String,
    pub state: Phase,
    pub repair_attempts: u32,
    pub fragments: usize,
    /// Final script on COMPLETE, error log on FAILED
    pub persisted: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.state == Phase::Complete
    }
}

/// Generation-validation-repair loop for one target
pub struct Orchestrator {
    drafter: Arc<dyn Drafter>,
    executor: Arc<dyn ScriptExecutor>,
    repairer: Arc<dyn Repairer>,
    sink: Arc<dyn OutputSink>,
    registry: ValidatorRegistry,
    retry_ceiling: u32,
    system_prompt: String,
    work_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn retry_ceiling(&self) -> u32 {
        self.retry_ceiling
    }

    /// Run the whole loop and return the terminal state
    pub async fn run_state(&self, target: &str, records: &[InputRecord]) -> Result<RunState> {
        let working = match &self.work_dir {
            Some(dir) => tempfile::Builder::new().suffix(".sql").tempfile_in(dir),
            None => tempfile::Builder::new().suffix(".sql").tempfile(),
        }
        .map_err(|source| OutputError::Write {
            path: self.work_dir.clone().unwrap_or_else(std::env::temp_dir),
            source,
        })?
        .into_temp_path();

        let checks = self.registry.checks_for(target);
        let mut state = RunState::new(target, &self.system_prompt, working.to_path_buf());

        state = state::draft(state, records, self.drafter.as_ref()).await?;
        loop {
            state = state::execute(state, self.executor.as_ref(), &checks).await?;
            state = state.route(self.retry_ceiling);
            let phase = state.phase;
            match phase {
                Phase::Complete => return state::complete(state, self.sink.as_ref()),
                Phase::Failed => {
                    warn!(
                        target_table = target,
                        attempts = state.retry_count,
                        "retry ceiling reached"
                    );
                    return state::fail(state, self.sink.as_ref());
                }
                _ => {
                    state = state::repair(state, self.repairer.as_ref()).await?;
                }
            }
        }
    }

    /// Run the loop and summarise it
    pub async fn run(&self, target: &str, records: &[InputRecord]) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, target_table = target, records = records.len(), "run started");

        let state = self.run_state(target, records).await?;

        let report = RunReport {
            run_id,
            target: target.to_string(),
            state: state.phase,
            repair_attempts: state.retry_count,
            fragments: state.store.len(),
            persisted: state.persisted,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            %run_id,
            target_table = target,
            state = %report.state,
            repair_attempts = report.repair_attempts,
            "run finished"
        );
        Ok(report)
    }
}

/// Builder for [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    drafter: Option<Arc<dyn Drafter>>,
    executor: Option<Arc<dyn ScriptExecutor>>,
    repairer: Option<Arc<dyn Repairer>>,
    sink: Option<Arc<dyn OutputSink>>,
    registry: ValidatorRegistry,
    retry_ceiling: Option<u32>,
    system_prompt: Option<String>,
    work_dir: Option<PathBuf>,
}

impl OrchestratorBuilder {
    pub fn drafter(mut self, drafter: Arc<dyn Drafter>) -> Self {
        self.drafter = Some(drafter);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn repairer(mut self, repairer: Arc<dyn Repairer>) -> Self {
        self.repairer = Some(repairer);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Target to check-set mapping; targets missing here run without checks
    pub fn registry(mut self, registry: ValidatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = Some(ceiling);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Directory for the working script (system temp dir otherwise)
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let missing = |what: &str| PipelineError::Config(format!("orchestrator needs a {}", what));
        Ok(Orchestrator {
            drafter: self.drafter.ok_or_else(|| missing("drafter"))?,
            executor: self.executor.ok_or_else(|| missing("executor"))?,
            repairer: self.repairer.ok_or_else(|| missing("repairer"))?,
            sink: self.sink.ok_or_else(|| missing("output sink"))?,
            registry: self.registry,
            retry_ceiling: self.retry_ceiling.unwrap_or(DEFAULT_RETRY_CEILING),
            system_prompt: self
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            work_dir: self.work_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cdw_agentic::Conversation;
    use serde_json::json;

    use super::*;
    use crate::drafter::{append_blocks, DraftOutcome};
    use crate::error::{ErrorClass, ExecutorError};
    use crate::executor::{ExecutionVerdict, RunOutcome};
    use crate::fragment_store::FragmentStore;
    use crate::output::FileSink;
    use crate::repairer::RepairOutcome;
    use crate::validator::{CheckResult, CheckSet, CheckStatus, ValidationVerdict};

    struct OneBlockDrafter;

    #[async_trait]
    impl Drafter for OneBlockDrafter {
        async fn draft(
            &self,
            record: &InputRecord,
            conversation: &mut Conversation,
            store: &mut FragmentStore,
        ) -> DraftOutcome {
            conversation.push_user(record.prompt());
            let body = format!("INSERT INTO t VALUES ({});", record.position);
            conversation.push_assistant(format!("```sql\n{}\n```", body));
            append_blocks(record.position, &[body], store)
        }
    }

    /// Replays scripted results; `None` stands for a lost connection
    struct ScriptedExecutor {
        results: Mutex<Vec<Option<bool>>>,
        calls: AtomicU32,
    }

    impl ScriptedExecutor {
        fn new(results: Vec<Option<bool>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                calls: AtomicU32::new(0),
            })
        }

        fn always_failing() -> Arc<Self> {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl ScriptExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _script: &str,
            _checks: &CheckSet,
        ) -> std::result::Result<RunOutcome, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut results = self.results.lock().unwrap();
                if results.is_empty() {
                    Some(false)
                } else {
                    results.remove(0)
                }
            };
            let Some(passed) = next else {
                return Err(ExecutorError::Connection(sqlx::Error::PoolTimedOut));
            };
            Ok(RunOutcome {
                execution: ExecutionVerdict::ran("SQL executed successfully with no results."),
                validation: ValidationVerdict::from_results(vec![CheckResult {
                    name: "location_address_duplicates".into(),
                    status: if passed {
                        CheckStatus::Passed
                    } else {
                        CheckStatus::Failed
                    },
                    detail: "Found 1 duplicate entries".into(),
                }]),
                committed: passed,
            })
        }
    }

    #[derive(Default)]
    struct CountingRepairer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Repairer for CountingRepairer {
        async fn repair(
            &self,
            conversation: &mut Conversation,
            _store: &mut FragmentStore,
        ) -> RepairOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            conversation.push_assistant("no idea");
            RepairOutcome::default()
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        executor: Arc<ScriptedExecutor>,
        repairer: Arc<CountingRepairer>,
        dir: tempfile::TempDir,
    }

    fn harness(executor: Arc<ScriptedExecutor>, ceiling: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let repairer = Arc::new(CountingRepairer::default());
        let orchestrator = Orchestrator::builder()
            .drafter(Arc::new(OneBlockDrafter))
            .executor(executor.clone())
            .repairer(repairer.clone())
            .sink(Arc::new(FileSink::new(
                dir.path().join("SQL"),
                dir.path().join("logs"),
            )))
            .retry_ceiling(ceiling)
            .system_prompt("system")
            .work_dir(dir.path())
            .build()
            .unwrap();
        Harness {
            orchestrator,
            executor,
            repairer,
            dir,
        }
    }

    fn records() -> Vec<InputRecord> {
        vec![
            InputRecord::new(0, json!({"city": "Boston"})),
            InputRecord::new(1, json!({"city": "Boston"})),
        ]
    }

    #[tokio::test]
    async fn test_retry_ceiling_is_exact() {
        let h = harness(ScriptedExecutor::always_failing(), 5);

        let report = h.orchestrator.run("location", &records()).await.unwrap();

        assert_eq!(report.state, Phase::Failed);
        assert_eq!(report.repair_attempts, 5);
        assert_eq!(h.repairer.calls.load(Ordering::SeqCst), 5);
        // initial pass plus one per repair
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 6);

        let log = report.persisted.unwrap();
        assert_eq!(log, h.dir.path().join("logs").join("location_error.json"));
        let transcript = Conversation::from_json(&std::fs::read_to_string(log).unwrap()).unwrap();
        assert_eq!(transcript.messages()[0].content, "system");
        assert!(!h.dir.path().join("SQL").exists());
    }

    #[tokio::test]
    async fn test_first_pass_success_needs_no_repair() {
        let h = harness(ScriptedExecutor::new(vec![Some(true)]), 5);

        let state = h.orchestrator.run_state("location", &records()).await.unwrap();

        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(h.repairer.calls.load(Ordering::SeqCst), 0);
        let script = std::fs::read_to_string(state.persisted.unwrap()).unwrap();
        assert_eq!(FragmentStore::parse(&script).unwrap().step_ids(), vec!["0", "1"]);
        assert!(state
            .conversation
            .last()
            .unwrap()
            .content
            .starts_with("SQL saved to "));
    }

    #[tokio::test]
    async fn test_connection_error_consumes_a_retry() {
        let h = harness(ScriptedExecutor::new(vec![None, Some(true)]), 5);

        let state = h.orchestrator.run_state("location", &records()).await.unwrap();

        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.retry_count, 1);
        let feedback = &state.conversation.messages();
        assert!(feedback
            .iter()
            .any(|m| m.content.starts_with("Database connection error:")));
    }

    #[tokio::test]
    async fn test_zero_ceiling_fails_without_repair() {
        let h = harness(ScriptedExecutor::always_failing(), 0);

        let report = h.orchestrator.run("location", &records()).await.unwrap();

        assert_eq!(report.state, Phase::Failed);
        assert_eq!(h.repairer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_script_is_fatal() {
        let h = harness(ScriptedExecutor::always_failing(), 5);
        let state = RunState::new("location", "system", h.dir.path().join("gone.sql"));

        let err = state::execute(
            state,
            h.executor.as_ref(),
            &CheckSet::empty("location"),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Executor(ExecutorError::ScriptNotFound { .. })
        ));
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_corrupt_working_script_is_fatal() {
        let h = harness(ScriptedExecutor::always_failing(), 5);
        let path = h.dir.path().join("work.sql");
        std::fs::write(&path, "-- BEGIN STEP: 0\nSELECT 1;\n").unwrap();
        let state = RunState::new("location", "system", path);

        let err = state::repair(state, h.repairer.as_ref()).await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(h.repairer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = Orchestrator::builder().build().err().unwrap();
        assert!(err.to_string().contains("drafter"));
    }
}
