//! Canned-results seam for exercising the mapping layer without a driver.
//!
//! When a filter is active, every statement an operation would send to the
//! driver is handed to the filter instead, and the filter's answer is
//! materialized exactly as driver output would be.
//!
//! A filter is active either explicitly (attached to one operation context)
//! or process-wide through [`install_results_filter`]. The process-wide slot
//! is meant for single-threaded tests: installs nest, and dropping the
//! returned guard restores whatever was installed before.

use crate::connection::Statement;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Answers statements in place of the driver.
pub trait ResultsFilter: Send + Sync {
    /// Rows returned by a query.
    fn query(&self, statement: &Statement) -> Result<Vec<Row>>;

    /// Rows affected by a write.
    fn execute(&self, statement: &Statement) -> Result<u64>;

    /// Single value returned by a scalar query.
    fn scalar(&self, statement: &Statement) -> Result<Value> {
        Ok(self
            .query(statement)?
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .unwrap_or(Value::Null))
    }

    /// Identity generated by the preceding insert.
    fn last_insert_id(&self, statement: &Statement) -> Result<i64> {
        Ok(self.scalar(statement)?.as_i64().unwrap_or(0))
    }
}

// ============================================================================
// Process-wide slot
// ============================================================================

static INSTALLED: RwLock<Option<Arc<dyn ResultsFilter>>> = RwLock::new(None);

/// Restores the previously installed filter when dropped.
#[must_use = "the filter is uninstalled as soon as the guard is dropped"]
pub struct ResultsFilterGuard {
    previous: Option<Arc<dyn ResultsFilter>>,
}

impl Drop for ResultsFilterGuard {
    fn drop(&mut self) {
        let mut slot = INSTALLED.write().unwrap_or_else(PoisonError::into_inner);
        *slot = self.previous.take();
        tracing::trace!(restored = slot.is_some(), "Results filter uninstalled");
    }
}

/// Install a process-wide filter until the returned guard is dropped.
pub fn install_results_filter(filter: Arc<dyn ResultsFilter>) -> ResultsFilterGuard {
    let mut slot = INSTALLED.write().unwrap_or_else(PoisonError::into_inner);
    let previous = slot.replace(filter);
    tracing::trace!(nested = previous.is_some(), "Results filter installed");
    ResultsFilterGuard { previous }
}

/// The currently installed process-wide filter, if any.
pub fn installed_results_filter() -> Option<Arc<dyn ResultsFilter>> {
    INSTALLED
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

// ============================================================================
// Implementations
// ============================================================================

/// Fixed answers, optionally chosen by a fragment of the statement's SQL.
///
/// # Example
///
/// ```ignore
/// let filter = CannedResults::new()
///     .with_rows(vec![customer_row])
///     .with_rows_for("\"Order\"", order_rows)
///     .with_last_insert_id(42);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CannedResults {
    rows: Vec<Row>,
    rows_for: Vec<(String, Vec<Row>)>,
    row_count: u64,
    scalar: Option<Value>,
    last_insert_id: Option<i64>,
}

impl CannedResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by any query without a more specific match.
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// Rows returned by queries whose SQL contains `sql_fragment`.
    ///
    /// Fragments are tried in registration order.
    pub fn with_rows_for(mut self, sql_fragment: impl Into<String>, rows: Vec<Row>) -> Self {
        self.rows_for.push((sql_fragment.into(), rows));
        self
    }

    /// Affected row count reported for every write.
    pub fn with_row_count(mut self, count: u64) -> Self {
        self.row_count = count;
        self
    }

    pub fn with_scalar(mut self, value: impl Into<Value>) -> Self {
        self.scalar = Some(value.into());
        self
    }

    pub fn with_last_insert_id(mut self, id: i64) -> Self {
        self.last_insert_id = Some(id);
        self
    }
}

impl ResultsFilter for CannedResults {
    fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        let rows = self
            .rows_for
            .iter()
            .find(|(fragment, _)| statement.sql.contains(fragment.as_str()))
            .map_or(&self.rows, |(_, rows)| rows);
        Ok(rows.clone())
    }

    fn execute(&self, _statement: &Statement) -> Result<u64> {
        Ok(self.row_count)
    }

    fn scalar(&self, statement: &Statement) -> Result<Value> {
        match &self.scalar {
            Some(value) => Ok(value.clone()),
            None => Ok(self
                .query(statement)?
                .into_iter()
                .next()
                .and_then(|row| row.into_values().into_iter().next())
                .unwrap_or(Value::Null)),
        }
    }

    fn last_insert_id(&self, statement: &Statement) -> Result<i64> {
        match self.last_insert_id {
            Some(id) => Ok(id),
            None => Ok(self.scalar(statement)?.as_i64().unwrap_or(0)),
        }
    }
}

/// Records every statement and answers from an inner [`CannedResults`].
#[derive(Debug, Default)]
pub struct CaptureSqlFilter {
    captured: Mutex<Vec<Statement>>,
    answers: CannedResults,
}

impl CaptureSqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture statements while answering with `answers`.
    pub fn answering(answers: CannedResults) -> Self {
        Self {
            captured: Mutex::new(Vec::new()),
            answers,
        }
    }

    /// Every statement seen so far, in issue order.
    pub fn statements(&self) -> Vec<Statement> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// SQL text of every statement seen so far.
    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }

    pub fn clear(&self) {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, statement: &Statement) {
        tracing::trace!(sql = %statement.sql, "Captured statement");
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement.clone());
    }
}

impl ResultsFilter for CaptureSqlFilter {
    fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
        self.record(statement);
        self.answers.query(statement)
    }

    fn execute(&self, statement: &Statement) -> Result<u64> {
        self.record(statement);
        self.answers.execute(statement)
    }

    fn scalar(&self, statement: &Statement) -> Result<Value> {
        self.record(statement);
        self.answers.scalar(statement)
    }

    fn last_insert_id(&self, statement: &Statement) -> Result<i64> {
        self.record(statement);
        self.answers.last_insert_id(statement)
    }
}
