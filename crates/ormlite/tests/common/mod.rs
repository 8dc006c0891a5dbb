//! Scripted in-memory connection shared by the integration tests.
//!
//! Statements are answered from rules matched on a fragment of their SQL;
//! every statement, including transaction boundaries, is logged in issue
//! order.

#![allow(clippy::manual_async_fn)]
#![allow(dead_code)]

use ormlite::{Connection, Cx, Error, Executor, Outcome, Param, Row, Statement, TransactionOps};
use ormlite_core::QueryErrorKind;
use std::future::Future;
use std::sync::Mutex;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}

/// Answer for a matched statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<Row>),
    Count(u64),
    Fail(String),
}

#[derive(Debug)]
struct Rule {
    fragment: String,
    reply: Reply,
    once: bool,
}

#[derive(Debug, Default)]
pub struct ScriptedConnection {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<Statement>>,
    open_transaction: bool,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection whose caller already opened a transaction.
    pub fn in_open_transaction() -> Self {
        Self {
            open_transaction: true,
            ..Self::default()
        }
    }

    /// Answer every statement containing `fragment` with `reply`.
    pub fn on(&self, fragment: &str, reply: Reply) -> &Self {
        self.push(fragment, reply, false);
        self
    }

    /// Answer the next statement containing `fragment` with `reply`.
    pub fn once(&self, fragment: &str, reply: Reply) -> &Self {
        self.push(fragment, reply, true);
        self
    }

    fn push(&self, fragment: &str, reply: Reply, once: bool) {
        self.rules.lock().expect("rules").push(Rule {
            fragment: fragment.to_string(),
            reply,
            once,
        });
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().expect("log").clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }

    fn record(&self, sql: &str, params: &[Param]) -> Option<Reply> {
        self.log
            .lock()
            .expect("log")
            .push(Statement::with_params(sql, params.to_vec()));
        let mut rules = self.rules.lock().expect("rules");
        let index = rules.iter().position(|r| sql.contains(r.fragment.as_str()))?;
        if rules[index].once {
            Some(rules.remove(index).reply)
        } else {
            Some(rules[index].reply.clone())
        }
    }

    fn answer_query(&self, sql: &str, params: &[Param]) -> Outcome<Vec<Row>, Error> {
        match self.record(sql, params) {
            Some(Reply::Rows(rows)) => Outcome::Ok(rows),
            Some(Reply::Fail(message)) => {
                Outcome::Err(Error::query(QueryErrorKind::Database, message))
            }
            Some(Reply::Count(_)) | None => Outcome::Ok(Vec::new()),
        }
    }

    fn answer_execute(&self, sql: &str, params: &[Param]) -> Outcome<u64, Error> {
        match self.record(sql, params) {
            Some(Reply::Count(n)) => Outcome::Ok(n),
            Some(Reply::Fail(message)) => {
                Outcome::Err(Error::query(QueryErrorKind::Database, message))
            }
            Some(Reply::Rows(_)) | None => Outcome::Ok(1),
        }
    }
}

impl Executor for ScriptedConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Param],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = self.answer_query(sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Param],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.answer_execute(sql, params);
        async move { outcome }
    }
}

impl Connection for ScriptedConnection {
    type Tx<'conn>
        = ScriptedTx<'conn>
    where
        Self: 'conn;

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.record("BEGIN", &[]);
        let tx = ScriptedTx {
            conn: self,
            finished: false,
        };
        async move { Outcome::Ok(tx) }
    }

    fn in_transaction(&self) -> bool {
        self.open_transaction
    }
}

/// Transaction on a [`ScriptedConnection`]; rolls back when dropped open.
pub struct ScriptedTx<'conn> {
    conn: &'conn ScriptedConnection,
    finished: bool,
}

impl Drop for ScriptedTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.record("ROLLBACK", &[]);
        }
    }
}

impl Executor for ScriptedTx<'_> {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Param],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = self.conn.answer_query(sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Param],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.conn.answer_execute(sql, params);
        async move { outcome }
    }
}

impl TransactionOps for ScriptedTx<'_> {
    fn commit(mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.finished = true;
        self.conn.record("COMMIT", &[]);
        async { Outcome::Ok(()) }
    }

    fn rollback(mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.finished = true;
        self.conn.record("ROLLBACK", &[]);
        async { Outcome::Ok(()) }
    }
}
