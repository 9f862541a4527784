//! Count-based predicates
//!
//! Every check is a single query returning the number of violating rows.
//! Zero passes; anything else fails with a message naming the count.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CheckResult, CheckStatus, Predicate};
use crate::database::DbTransaction;

const SUCCESS_DETAIL: &str = "Test completed successfully.";

type FailureMessage = Box<dyn Fn(i64) -> String + Send + Sync>;

/// A named `SELECT <count>` check
pub struct CountPredicate {
    name: String,
    sql: String,
    on_failure: FailureMessage,
}

impl CountPredicate {
    pub fn new(
        name: impl Into<String>,
        sql: impl Into<String>,
        on_failure: impl Fn(i64) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            on_failure: Box::new(on_failure),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn into_arc(self) -> Arc<dyn Predicate> {
        Arc::new(self)
    }
}

#[async_trait]
impl Predicate for CountPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, tx: &mut DbTransaction<'_>) -> CheckResult {
        let (status, detail) = match tx.count_in_savepoint(&self.sql).await {
            Ok(0) => (CheckStatus::Passed, SUCCESS_DETAIL.to_string()),
            Ok(count) => (
                CheckStatus::Failed,
                format!("Test failed: {}", (self.on_failure)(count)),
            ),
            Err(e) => (
                CheckStatus::Error,
                format!("Check query failed: {}. Verify table structure and permissions.", e),
            ),
        };
        CheckResult {
            name: self.name.clone(),
            status,
            detail,
        }
    }
}

fn short_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// No duplicate values in a key column
pub fn primary_key_unique(table: &str, pk_column: &str) -> Arc<dyn Predicate> {
    let (t, c) = (table.to_string(), pk_column.to_string());
    CountPredicate::new(
        format!("{}_primary_key", short_name(table)),
        format!("SELECT COUNT(*) - COUNT(DISTINCT {pk_column}) FROM {table}"),
        move |n| {
            format!(
                "Column '{}' in table '{}' contains {} duplicate values.",
                c, t, n
            )
        },
    )
    .into_arc()
}

/// Every non-null foreign key has a parent row
pub fn foreign_key_exists(
    child_table: &str,
    fk_column: &str,
    parent_table: &str,
    parent_pk_column: &str,
) -> Arc<dyn Predicate> {
    let detail = (
        format!("{}.{}", child_table, fk_column),
        format!("{}.{}", parent_table, parent_pk_column),
    );
    CountPredicate::new(
        format!("{}_{}_fk", short_name(child_table), fk_column),
        format!(
            "SELECT COUNT(*) FROM {child_table} c \
             LEFT JOIN {parent_table} p ON c.{fk_column} = p.{parent_pk_column} \
             WHERE c.{fk_column} IS NOT NULL AND p.{parent_pk_column} IS NULL"
        ),
        move |n| {
            format!(
                "Found {} orphan records in '{}' not present in '{}'.",
                n, detail.0, detail.1
            )
        },
    )
    .into_arc()
}

/// Start never after end
pub fn date_order(table: &str, start_column: &str, end_column: &str) -> Arc<dyn Predicate> {
    let (t, s, e) = (
        table.to_string(),
        start_column.to_string(),
        end_column.to_string(),
    );
    CountPredicate::new(
        format!("{}_date_order", short_name(table)),
        format!("SELECT COUNT(*) FROM {table} WHERE {start_column} > {end_column}"),
        move |n| {
            format!(
                "Found {} records in '{}' where '{}' is after '{}'.",
                n, t, s, e
            )
        },
    )
    .into_arc()
}

/// Concepts referenced by `concept_column` belong to one of `domains`
pub fn concept_domain(
    table: &str,
    concept_column: &str,
    concept_table: &str,
    domains: &[&str],
) -> Arc<dyn Predicate> {
    let allowed = domains
        .iter()
        .map(|d| sql_literal(d))
        .collect::<Vec<_>>()
        .join(", ");
    let (t, c, d) = (
        table.to_string(),
        concept_column.to_string(),
        domains.join("' or '"),
    );
    CountPredicate::new(
        format!("{}_{}_domain", short_name(table), concept_column),
        format!(
            "SELECT COUNT(*) FROM {table} t \
             JOIN {concept_table} c ON t.{concept_column} = c.concept_id \
             WHERE c.domain_id NOT IN ({allowed})"
        ),
        move |n| {
            format!(
                "Found {} concept IDs in column '{}' of table '{}' that do not belong to the expected domain '{}'.",
                n, c, t, d
            )
        },
    )
    .into_arc()
}
