//! Run state and transitions
//!
//! `RunState` is threaded by value through the transition functions below; each
//! takes the current state and returns the next one. [`RunState::decide`] is
//! pure and carries the retry policy.

use std::path::PathBuf;

use cdw_agentic::Conversation;
use serde::Serialize;
use tracing::{info, warn};

use crate::drafter::Drafter;
use crate::error::{ExecutorError, PipelineError, Result};
use crate::executor::{ExecutionVerdict, RunOutcome, ScriptExecutor};
use crate::fragment_store::FragmentStore;
use crate::input::InputRecord;
use crate::output::OutputSink;
use crate::repairer::Repairer;
use crate::validator::{CheckSet, ValidationVerdict};

/// Appended to the feedback turn whenever the pass did not succeed
pub const REPAIR_REQUEST: &str = "The script or its checks failed. Fix the affected steps by \
calling edit_sql_file with the step id and the full corrected SQL for that step.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Drafting,
    Executing,
    Retrying,
    Repairing,
    Complete,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Drafting => "DRAFTING",
            Phase::Executing => "EXECUTING",
            Phase::Retrying => "RETRYING",
            Phase::Repairing => "REPAIRING",
            Phase::Complete => "COMPLETE",
            Phase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Where to go after an Execute+Validate pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Complete,
    Retry,
    Fail,
}

#[derive(Debug, Clone)]
pub struct RunState {
    pub conversation: Conversation,
    pub target: String,
    pub last_execution: Option<ExecutionVerdict>,
    pub last_validation: Option<ValidationVerdict>,
    pub store: FragmentStore,
    /// Repair attempts so far; never decreases
    pub retry_count: u32,
    /// Working script the executor reads
    pub script_path: PathBuf,
    pub phase: Phase,
    /// Final script or error log, once terminal
    pub persisted: Option<PathBuf>,
}

impl RunState {
    pub fn new(target: impl Into<String>, system_prompt: &str, script_path: PathBuf) -> Self {
        Self {
            conversation: Conversation::with_system(system_prompt),
            target: target.into(),
            last_execution: None,
            last_validation: None,
            store: FragmentStore::new(),
            retry_count: 0,
            script_path,
            phase: Phase::Drafting,
            persisted: None,
        }
    }

    fn passed(&self) -> bool {
        let ran = self
            .last_execution
            .as_ref()
            .is_some_and(|e| e.script_ran);
        let valid = self
            .last_validation
            .as_ref()
            .is_some_and(|v| v.all_passed);
        ran && valid
    }

    /// The ceiling is checked before another repair is attempted, so a run
    /// makes at most `ceiling` repairs.
    pub fn decide(&self, ceiling: u32) -> Decision {
        if self.passed() {
            Decision::Complete
        } else if self.retry_count >= ceiling {
            Decision::Fail
        } else {
            Decision::Retry
        }
    }

    /// Record the decision as the next phase
    pub fn route(mut self, ceiling: u32) -> Self {
        self.phase = match self.decide(ceiling) {
            Decision::Complete => Phase::Complete,
            Decision::Retry => Phase::Retrying,
            Decision::Fail => Phase::Failed,
        };
        self
    }
}

/// User turn carrying every input and the drafted script
pub fn summary_turn(records: &[InputRecord], store: &FragmentStore) -> String {
    let inputs = records
        .iter()
        .map(InputRecord::summary)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\nSQL Code:\n{}", inputs, store.render())
}

/// User turn describing one Execute+Validate pass
pub fn feedback_turn(outcome: &RunOutcome) -> String {
    let mut text = outcome.execution.script_output_or_error.clone();
    if outcome.execution.script_ran {
        text.push('\n');
        text.push_str(&outcome.validation.report());
    }
    if !outcome.succeeded() {
        text.push_str("\n\n");
        text.push_str(REPAIR_REQUEST);
    }
    text
}

/// DRAFTING: every record in input order, then the summary turn
pub async fn draft(
    mut state: RunState,
    records: &[InputRecord],
    drafter: &dyn Drafter,
) -> Result<RunState> {
    state.phase = Phase::Drafting;
    let mut degraded = 0usize;
    for record in records {
        let outcome = drafter
            .draft(record, &mut state.conversation, &mut state.store)
            .await;
        if outcome.is_soft_failure() {
            degraded += 1;
        }
    }

    state.store.save(&state.script_path)?;
    let summary = summary_turn(records, &state.store);
    state.conversation.push_user(summary);

    info!(
        target_table = %state.target,
        records = records.len(),
        fragments = state.store.len(),
        degraded,
        "drafting finished"
    );
    state.phase = Phase::Executing;
    Ok(state)
}

/// EXECUTING: run the working script with the target's checks.
///
/// A connection failure becomes a failed verdict and goes through the normal
/// retry path; a missing script is fatal.
pub async fn execute(
    mut state: RunState,
    executor: &dyn ScriptExecutor,
    checks: &CheckSet,
) -> Result<RunState> {
    state.phase = Phase::Executing;
    let outcome = match executor.execute_file(&state.script_path, checks).await {
        Ok(outcome) => outcome,
        Err(e @ ExecutorError::Connection(_)) => {
            warn!(error = %e, attempt = state.retry_count, "execution could not reach the database");
            RunOutcome {
                execution: ExecutionVerdict::failed(e.to_string()),
                validation: ValidationVerdict::not_run(),
                committed: false,
            }
        }
        Err(e) => return Err(PipelineError::from(e)),
    };

    state.conversation.push_user(feedback_turn(&outcome));
    info!(
        target_table = %state.target,
        attempt = state.retry_count,
        script_ran = outcome.execution.script_ran,
        all_passed = outcome.validation.all_passed,
        committed = outcome.committed,
        "execution pass finished"
    );
    state.last_execution = Some(outcome.execution);
    state.last_validation = Some(outcome.validation);
    Ok(state)
}

/// REPAIRING: reload the working script, apply the model's edits, save it back.
///
/// A working script that no longer parses is fatal. The attempt is counted
/// whether or not any edit applied.
pub async fn repair(mut state: RunState, repairer: &dyn Repairer) -> Result<RunState> {
    state.phase = Phase::Repairing;
    state.store = FragmentStore::load(&state.script_path)?;

    let outcome = repairer
        .repair(&mut state.conversation, &mut state.store)
        .await;
    state.store.save(&state.script_path)?;
    state.retry_count += 1;

    info!(
        target_table = %state.target,
        attempt = state.retry_count,
        applied = outcome.applied.len(),
        "repair attempt finished"
    );
    state.phase = Phase::Executing;
    Ok(state)
}

/// COMPLETE: persist the final script and confirm it in the conversation
pub fn complete(mut state: RunState, sink: &dyn OutputSink) -> Result<RunState> {
    let path = sink.persist_script(&state.target, &state.store)?;
    state
        .conversation
        .push_user(format!("SQL saved to {}", path.display()));
    state.persisted = Some(path);
    state.phase = Phase::Complete;
    Ok(state)
}

/// FAILED: persist the transcript, then note where it went
pub fn fail(mut state: RunState, sink: &dyn OutputSink) -> Result<RunState> {
    let path = sink.persist_transcript(&state.target, &state.conversation)?;
    state
        .conversation
        .push_user(format!("Error log saved to {}", path.display()));
    state.persisted = Some(path);
    state.phase = Phase::Failed;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::validator::{CheckResult, CheckStatus};

    fn state() -> RunState {
        RunState::new("location", "system", PathBuf::from("/tmp/unused.sql"))
    }

    fn outcome(script_ran: bool, all_passed: bool) -> RunOutcome {
        let validation = if script_ran {
            ValidationVerdict::from_results(vec![CheckResult {
                name: "location_address_duplicates".into(),
                status: if all_passed {
                    CheckStatus::Passed
                } else {
                    CheckStatus::Failed
                },
                detail: "detail".into(),
            }])
        } else {
            ValidationVerdict::not_run()
        };
        RunOutcome {
            execution: if script_ran {
                ExecutionVerdict::ran("SQL executed successfully with no results.")
            } else {
                ExecutionVerdict::failed("SQL Execution Error: syntax error")
            },
            validation,
            committed: script_ran && all_passed,
        }
    }

    fn with_outcome(mut state: RunState, outcome: RunOutcome) -> RunState {
        state.last_execution = Some(outcome.execution);
        state.last_validation = Some(outcome.validation);
        state
    }

    #[test]
    fn test_decide() {
        let passed = with_outcome(state(), outcome(true, true));
        assert_eq!(passed.decide(5), Decision::Complete);

        let failed = with_outcome(state(), outcome(true, false));
        assert_eq!(failed.decide(5), Decision::Retry);

        let mut exhausted = with_outcome(state(), outcome(false, false));
        exhausted.retry_count = 5;
        assert_eq!(exhausted.decide(5), Decision::Fail);

        // success wins even at the ceiling
        let mut late = with_outcome(state(), outcome(true, true));
        late.retry_count = 5;
        assert_eq!(late.route(5).phase, Phase::Complete);
    }

    #[test]
    fn test_not_yet_executed_is_not_complete() {
        assert_eq!(state().decide(5), Decision::Retry);
        assert_eq!(state().decide(0), Decision::Fail);
    }

    #[test]
    fn test_feedback_turn() {
        let text = feedback_turn(&outcome(true, true));
        assert_eq!(
            text,
            "SQL executed successfully with no results.\n[passed] location_address_duplicates: detail"
        );

        let text = feedback_turn(&outcome(false, false));
        assert!(text.starts_with("SQL Execution Error: syntax error\n\n"));
        assert!(text.ends_with(REPAIR_REQUEST));
        assert!(!text.contains("[failed]"));
    }

    #[test]
    fn test_summary_turn() {
        let records = vec![
            InputRecord::new(0, json!({"city": "Boston"})),
            InputRecord::new(1, json!({"city": "Lyon"})),
        ];
        let mut store = FragmentStore::new();
        store.append("0", "SELECT 1;").unwrap();

        let text = summary_turn(&records, &store);
        assert!(text.starts_with("JSON 0:\n{\n  \"city\": \"Boston\"\n}\n\nJSON 1:"));
        assert!(text.contains("\n\nSQL Code:\n-- BEGIN STEP: 0\nSELECT 1;\n-- END STEP: 0\n"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Retrying.to_string(), "RETRYING");
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Repairing.is_terminal());
    }
}
