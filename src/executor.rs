//! Transactional script executor
//!
//! Runs a rendered script as one batch inside a single transaction, evaluates
//! the target's checks against the uncommitted state, and commits only when the
//! script ran and every check passed. Anything else is rolled back, so a failed
//! attempt leaves the database exactly as it was.
//!
//! A connection is opened per invocation and closed on every exit path; there
//! is no pooling across attempts.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::database::DbConnection;
use crate::error::ExecutorError;
use crate::validator::{CheckSet, ValidationVerdict};

pub use crate::database::{mask_database_url, DatabaseConfig, ResultTable, NO_RESULTS};

/// Whether the script ran, with its output or the database error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionVerdict {
    pub script_ran: bool,
    pub script_output_or_error: String,
}

impl ExecutionVerdict {
    pub fn ran(output: impl Into<String>) -> Self {
        Self {
            script_ran: true,
            script_output_or_error: output.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            script_ran: false,
            script_output_or_error: error.into(),
        }
    }
}

/// Result of one Execute+Validate pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub execution: ExecutionVerdict,
    pub validation: ValidationVerdict,
    pub committed: bool,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.execution.script_ran && self.validation.all_passed
    }
}

#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Run `script` and `checks` in one transaction.
    ///
    /// Script failures and failed checks are verdicts, not errors. `Err` is
    /// reserved for problems reaching the database.
    async fn execute(&self, script: &str, checks: &CheckSet) -> Result<RunOutcome, ExecutorError>;

    /// Same as [`execute`](Self::execute) for a script on disk
    async fn execute_file(
        &self,
        path: &Path,
        checks: &CheckSet,
    ) -> Result<RunOutcome, ExecutorError> {
        if !path.is_file() {
            return Err(ExecutorError::ScriptNotFound {
                path: path.to_path_buf(),
            });
        }
        let script = std::fs::read_to_string(path).map_err(|source| ExecutorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.execute(&script, checks).await
    }
}

/// sqlx-backed executor (Postgres, or SQLite for local runs)
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    config: DatabaseConfig,
}

impl SqlExecutor {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    async fn connect(&self) -> Result<DbConnection, ExecutorError> {
        let url = self.config.connection_url()?;
        debug!(url = %mask_database_url(&url), "opening database connection");
        DbConnection::connect(&url).await.map_err(|e| {
            warn!(error = %e, "database connection failed");
            e
        })
    }

    async fn run(
        conn: &mut DbConnection,
        script: &str,
        checks: &CheckSet,
    ) -> Result<RunOutcome, ExecutorError> {
        let mut tx = conn.begin().await.map_err(ExecutorError::Connection)?;

        let table = if script.trim().is_empty() {
            Ok(ResultTable::default())
        } else {
            tx.run_batch(script).await
        };

        let table = match table {
            Ok(table) => table,
            Err(e) => {
                info!(error = %e, "script failed, rolling back");
                tx.rollback().await.map_err(ExecutorError::Connection)?;
                return Ok(RunOutcome {
                    execution: ExecutionVerdict::failed(format!("SQL Execution Error: {}", e)),
                    validation: ValidationVerdict::not_run(),
                    committed: false,
                });
            }
        };

        let execution = ExecutionVerdict::ran(table.render());
        let validation = checks.evaluate(&mut tx).await;

        let committed = if validation.all_passed {
            tx.commit().await.map_err(ExecutorError::Connection)?;
            true
        } else {
            tx.rollback().await.map_err(ExecutorError::Connection)?;
            false
        };
        info!(
            target_table = checks.target(),
            checks = checks.len(),
            rows = table.rows.len(),
            failed = validation.failed_checks().count(),
            committed,
            "script executed"
        );

        Ok(RunOutcome {
            execution,
            validation,
            committed,
        })
    }
}

#[async_trait]
impl ScriptExecutor for SqlExecutor {
    async fn execute(&self, script: &str, checks: &CheckSet) -> Result<RunOutcome, ExecutorError> {
        let mut conn = self.connect().await?;
        let outcome = Self::run(&mut conn, script, checks).await;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "error closing database connection");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_succeeded() {
        let outcome = RunOutcome {
            execution: ExecutionVerdict::ran(NO_RESULTS),
            validation: ValidationVerdict::not_run(),
            committed: false,
        };
        assert!(!outcome.succeeded());

        let outcome = RunOutcome {
            validation: ValidationVerdict::from_results(Vec::new()),
            ..outcome
        };
        assert!(outcome.succeeded());
    }

    #[tokio::test]
    async fn test_missing_script_is_fatal() {
        let executor = SqlExecutor::new(DatabaseConfig::default());
        let err = executor
            .execute_file(Path::new("/nonexistent/x_insert.sql"), &CheckSet::empty("location"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ScriptNotFound { .. }));
    }
}
