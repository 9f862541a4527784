//! Validator
//!
//! Named, ordered, read-only predicate checks run against post-execution
//! database state, inside the executor's transaction. Each check reports a
//! status and a human-readable detail (violating row counts) that is fed back
//! to the repair step.
//!
//! Check sets are selected per target through an explicit [`ValidatorRegistry`]
//! handed to the orchestrator. A target with no registered set gets an empty
//! set, which passes vacuously.

mod omop;
mod predicates;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::DbTransaction;

pub use omop::omop_registry;
pub use predicates::{
    concept_domain, date_order, foreign_key_exists, primary_key_unique, CountPredicate,
};

/// Outcome of one predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// The check itself could not run (missing table, syntax error, ...)
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::Error => "error",
        }
    }
}

/// Result of one named check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

/// Aggregate verdict over a check set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub all_passed: bool,
    pub per_check_results: Vec<CheckResult>,
}

impl ValidationVerdict {
    /// `all_passed` is the AND over every result; true for an empty set
    pub fn from_results(per_check_results: Vec<CheckResult>) -> Self {
        Self {
            all_passed: per_check_results.iter().all(CheckResult::passed),
            per_check_results,
        }
    }

    /// Verdict when the script itself failed and no check ran
    pub fn not_run() -> Self {
        Self {
            all_passed: false,
            per_check_results: Vec::new(),
        }
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.per_check_results.iter().filter(|r| !r.passed())
    }

    /// Plain-text report for the conversation
    pub fn report(&self) -> String {
        if self.per_check_results.is_empty() {
            return "No tests provided.".to_string();
        }
        self.per_check_results
            .iter()
            .map(|r| format!("[{}] {}: {}", r.status.as_str(), r.name, r.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A read-only check against database state
#[async_trait]
pub trait Predicate: Send + Sync {
    fn name(&self) -> &str;

    /// Must not modify data; may run inside the executor's transaction
    async fn check(&self, tx: &mut DbTransaction<'_>) -> CheckResult;
}

/// Ordered predicates for one target
#[derive(Clone, Default)]
pub struct CheckSet {
    target: String,
    predicates: Vec<Arc<dyn Predicate>>,
}

impl std::fmt::Debug for CheckSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckSet")
            .field("target", &self.target)
            .field("checks", &self.names())
            .finish()
    }
}

impl CheckSet {
    pub fn new(target: impl Into<String>, predicates: Vec<Arc<dyn Predicate>>) -> Self {
        Self {
            target: target.into(),
            predicates,
        }
    }

    pub fn empty(target: impl Into<String>) -> Self {
        Self::new(target, Vec::new())
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn names(&self) -> Vec<&str> {
        self.predicates.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Run every predicate in order; each is independent of the others
    pub async fn evaluate(&self, tx: &mut DbTransaction<'_>) -> ValidationVerdict {
        let mut results = Vec::with_capacity(self.predicates.len());
        for predicate in &self.predicates {
            let result = predicate.check(tx).await;
            debug!(
                target_table = %self.target,
                check = %result.name,
                status = result.status.as_str(),
                "check evaluated"
            );
            results.push(result);
        }
        ValidationVerdict::from_results(results)
    }
}

/// Explicit target -> check set mapping
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    sets: BTreeMap<String, Vec<Arc<dyn Predicate>>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: impl Into<String>, predicates: Vec<Arc<dyn Predicate>>) {
        self.sets.insert(target.into(), predicates);
    }

    pub fn with(mut self, target: impl Into<String>, predicates: Vec<Arc<dyn Predicate>>) -> Self {
        self.register(target, predicates);
        self
    }

    pub fn is_registered(&self, target: &str) -> bool {
        self.sets.contains_key(target)
    }

    pub fn targets(&self) -> Vec<&str> {
        self.sets.keys().map(String::as_str).collect()
    }

    /// Checks for `target`.
    ///
    /// An unregistered target yields an empty set that passes vacuously. This
    /// also silently skips validation for a misspelled target, so it is logged.
    pub fn checks_for(&self, target: &str) -> CheckSet {
        match self.sets.get(target) {
            Some(predicates) => CheckSet::new(target, predicates.clone()),
            None => {
                warn!(
                    target_table = target,
                    "no validation checks registered for target; verdict passes vacuously"
                );
                CheckSet::empty(target)
            }
        }
    }
}
