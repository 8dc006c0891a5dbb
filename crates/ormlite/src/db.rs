//! The operation context.
//!
//! A [`Db`] is cheap to clone and holds no connection. Operations borrow an
//! [`Executor`] (a connection or an open transaction) per call, so one `Db`
//! serves any number of connections.
//!
//! Every statement goes through one dispatch point: an explicitly attached
//! results filter answers first, then the process-wide installed filter,
//! and only then the driver.

use crate::config::{OrmConfig, default_dialect};
use asupersync::{Cx, Outcome};
use ormlite_core::{
    Connection, Error, Executor, ResultsFilter, Row, Statement, TransactionOps, Value,
    installed_results_filter,
};
use ormlite_query::DialectProvider;
use std::fmt;
use std::sync::Arc;

/// Dialect, results filter and configuration shared by a group of operations.
#[derive(Clone)]
pub struct Db {
    dialect: Arc<dyn DialectProvider>,
    filter: Option<Arc<dyn ResultsFilter>>,
    config: OrmConfig,
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.dialect.name())
            .field("results_filter", &self.filter.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Db {
    /// A context on the process-wide default dialect.
    pub fn new() -> Self {
        Self::from_shared(default_dialect())
    }

    pub fn with_dialect(dialect: impl DialectProvider + 'static) -> Self {
        Self::from_shared(Arc::new(dialect))
    }

    pub fn from_shared(dialect: Arc<dyn DialectProvider>) -> Self {
        Self {
            dialect,
            filter: None,
            config: OrmConfig::default(),
        }
    }

    /// Answer every statement of this context from `filter`.
    #[must_use]
    pub fn with_results_filter(mut self, filter: Arc<dyn ResultsFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dialect(&self) -> &dyn DialectProvider {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    /// The filter answering this context's statements, if any.
    pub fn results_filter(&self) -> Option<Arc<dyn ResultsFilter>> {
        self.filter.clone().or_else(installed_results_filter)
    }

    fn trace_statement(&self, kind: &'static str, statement: &Statement) {
        if self.config.log_sql {
            tracing::debug!(
                dialect = self.dialect.name(),
                kind,
                sql = %statement.sql,
                params = ?statement.params,
                "Dispatching statement"
            );
        } else {
            tracing::trace!(kind, sql = %statement.sql, "Dispatching statement");
        }
    }

    /// Run a statement for its rows.
    pub(crate) async fn fetch<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        statement: &Statement,
    ) -> Outcome<Vec<Row>, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        self.trace_statement("query", statement);
        if let Some(filter) = self.results_filter() {
            return outcome_of(filter.query(statement));
        }
        exec.query(cx, &statement.sql, &statement.params).await
    }

    /// Run a statement for its affected row count.
    pub(crate) async fn run<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        statement: &Statement,
    ) -> Outcome<u64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        self.trace_statement("execute", statement);
        if let Some(filter) = self.results_filter() {
            return outcome_of(filter.execute(statement));
        }
        exec.execute(cx, &statement.sql, &statement.params).await
    }

    /// First column of the first row, NULL when there is none.
    pub(crate) async fn fetch_scalar<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        statement: &Statement,
    ) -> Outcome<Value, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        self.trace_statement("scalar", statement);
        if let Some(filter) = self.results_filter() {
            return outcome_of(filter.scalar(statement));
        }
        let rows = try_outcome!(exec.query(cx, &statement.sql, &statement.params).await);
        Outcome::Ok(
            rows.into_iter()
                .next()
                .and_then(|row| row.into_values().into_iter().next())
                .unwrap_or(Value::Null),
        )
    }

    /// Identity generated by an insert, read by `statement`.
    pub(crate) async fn fetch_identity<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        statement: &Statement,
    ) -> Outcome<i64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        self.trace_statement("identity", statement);
        if let Some(filter) = self.results_filter() {
            return outcome_of(filter.last_insert_id(statement));
        }
        let rows = try_outcome!(exec.query(cx, &statement.sql, &statement.params).await);
        let value = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .unwrap_or(Value::Null);
        match value.as_i64() {
            Some(id) => Outcome::Ok(id),
            None => Outcome::Err(Error::conversion(
                value.type_name(),
                "i64",
                format!("identity query returned {}", value),
            )),
        }
    }

    /// Whether a batch on `conn` should open its own transaction.
    pub(crate) fn needs_batch_transaction<C: Connection>(&self, conn: &C) -> bool {
        !conn.in_transaction() && self.results_filter().is_none()
    }
}

fn outcome_of<T>(result: ormlite_core::Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(e) => Outcome::Err(e),
    }
}

/// Commit a batch transaction on success, roll it back otherwise.
pub(crate) async fn finish_batch<T: TransactionOps, R>(
    cx: &Cx,
    tx: T,
    outcome: Outcome<R, Error>,
) -> Outcome<R, Error> {
    match outcome {
        Outcome::Ok(value) => {
            try_outcome!(tx.commit(cx).await);
            tracing::debug!("Batch committed");
            Outcome::Ok(value)
        }
        other => {
            if let Outcome::Err(e) = tx.rollback(cx).await {
                tracing::warn!(error = %e, "Batch rollback failed");
            } else {
                tracing::debug!("Batch rolled back");
            }
            other
        }
    }
}
