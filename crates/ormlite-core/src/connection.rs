//! The driver collaborator contract.
//!
//! The engine never depends on driver-specific types: a driver supplies an
//! [`Executor`] that runs SQL text with named parameters, a [`Connection`]
//! that can open transactions, and [`Row`]s that expose column names and
//! values by index.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A named, bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name without the dialect prefix.
    pub name: String,
    pub value: Value,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Bind another parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push(Param::new(name, value));
        self
    }

    /// Look up a bound parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

/// Something that can run SQL: a connection or an open transaction.
///
/// Statements on one executor run in issue order.
pub trait Executor: Send + Sync {
    /// Run a statement and return its rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Param],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Run a statement and return the affected row count.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Param],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;
}

/// A database connection.
pub trait Connection: Executor {
    /// Transaction type returned by [`Connection::begin`].
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// Begin a transaction.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send;

    /// Whether the caller already opened a transaction on this connection.
    ///
    /// Batch writes open their own transaction only when this is false.
    fn in_transaction(&self) -> bool {
        false
    }
}

/// An open transaction.
///
/// Dropping a transaction without calling [`TransactionOps::commit`] must
/// roll it back.
pub trait TransactionOps: Executor {
    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}
