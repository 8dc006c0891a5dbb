//! Optimistic concurrency on row-version guarded writes.
//!
//! The statement builders put the row version into the WHERE clause of an
//! UPDATE or DELETE and report whether they did. A guarded write that
//! affects no row means another writer changed or removed the row first.

use crate::db::Db;
use asupersync::{Cx, Outcome};
use ormlite_core::{ConcurrencyError, Error, Executor, ModelDefinition, Result, Value};
use ormlite_query::{DialectProvider, StatementBuilder};
use std::any::Any;

/// Checks guarded writes and refreshes in-memory row versions.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyGuard<'a> {
    dialect: &'a dyn DialectProvider,
    def: &'a ModelDefinition,
}

impl<'a> ConcurrencyGuard<'a> {
    pub fn new(dialect: &'a dyn DialectProvider, def: &'a ModelDefinition) -> Self {
        Self { dialect, def }
    }

    /// Fail with a conflict when a guarded write affected nothing.
    pub fn check(&self, guarded: bool, affected: u64, key: Option<&Value>) -> Result<()> {
        if guarded && affected == 0 {
            let table = self.dialect.table_name(self.def);
            tracing::warn!(table = %table, key = ?key, "Optimistic concurrency conflict");
            return Err(Error::Concurrency(ConcurrencyError {
                table,
                key: key.map(ToString::to_string),
            }));
        }
        Ok(())
    }

    /// Primary key of an instance as a database value.
    pub fn key_of(&self, model: &dyn Any) -> Result<Value> {
        let pk = self.def.primary_key();
        self.dialect.converters().to_db_value(pk, pk.get_value(model))
    }

    /// Reload the row version of `model` after a write.
    ///
    /// A missing row or a NULL version leaves the instance unchanged.
    pub async fn refresh<E: Executor>(
        &self,
        db: &Db,
        cx: &Cx,
        exec: &E,
        model: &mut dyn Any,
    ) -> Outcome<(), Error> {
        let Some(row_version) = self.def.row_version() else {
            return Outcome::Ok(());
        };
        let key = try_result!(self.key_of(&*model));
        let Some(statement) = try_result!(self.dialect.row_version_statement(self.def, key)) else {
            return Outcome::Ok(());
        };
        let current = try_outcome!(db.fetch_scalar(cx, exec, &statement).await);
        if current.is_null() {
            return Outcome::Ok(());
        }
        let native = try_result!(self.dialect.converters().from_db_value(row_version, current));
        if !row_version.set_value(model, native) {
            tracing::warn!(model = %self.def.name, "Row version did not fit the field");
        }
        Outcome::Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlite_core::{Model, ModelBuilder};
    use ormlite_query::SqliteDialect;

    #[derive(Debug, Default)]
    struct Ticket {
        id: i64,
        row_version: u64,
    }

    impl Model for Ticket {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |t: &Self| &t.id, |t: &mut Self, v| t.id = v).field(
                "RowVersion",
                |t: &Self| &t.row_version,
                |t: &mut Self, v| t.row_version = v,
            )
        }
    }

    #[test]
    fn test_zero_rows_on_guarded_write_conflicts() {
        let def = Ticket::definition().expect("definition");
        let dialect = SqliteDialect::new();
        let guard = ConcurrencyGuard::new(&dialect, &def);
        let err = guard
            .check(true, 0, Some(&Value::BigInt(4)))
            .expect_err("conflict");
        assert!(err.is_concurrency_conflict());
        match err {
            Error::Concurrency(c) => {
                assert_eq!(c.table, "\"Ticket\"");
                assert_eq!(c.key.as_deref(), Some("4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unguarded_or_affected_write_passes() {
        let def = Ticket::definition().expect("definition");
        let dialect = SqliteDialect::new();
        let guard = ConcurrencyGuard::new(&dialect, &def);
        assert!(guard.check(false, 0, None).is_ok());
        assert!(guard.check(true, 1, None).is_ok());
    }

    #[test]
    fn test_key_of_instance() {
        let def = Ticket::definition().expect("definition");
        let dialect = SqliteDialect::new();
        let guard = ConcurrencyGuard::new(&dialect, &def);
        let ticket = Ticket {
            id: 9,
            row_version: 1,
        };
        assert_eq!(guard.key_of(&ticket).expect("key"), Value::BigInt(9));
    }
}
