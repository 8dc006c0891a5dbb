//! OrmLite Rust: typed object models mapped to dialect-correct SQL and back.
//!
//! `ormlite` is the facade crate. It ties the metadata catalog and converters
//! from `ormlite-core` to the statement builders from `ormlite-query` and runs
//! them against any driver implementing [`Executor`]/[`Connection`].
//!
//! # Role In The Architecture
//!
//! - **Operation context**: [`Db`] carries the dialect, an optional
//!   [`ResultsFilter`] and the [`OrmConfig`]. Every operation takes it
//!   explicitly; [`default_dialect`] only feeds [`Db::new`].
//! - **Materialization**: [`Materializer`] binds result columns to fields
//!   once per result set and populates one instance per row.
//! - **References**: reference fields (`Vec<C>` / `Option<C>`) are filled by
//!   one batched query per field and level.
//! - **Optimistic concurrency**: writes guarded by a row version report
//!   [`Error::Concurrency`] when nothing was affected.
//!
//! # Example
//!
//! ```ignore
//! use ormlite::prelude::*;
//!
//! #[derive(Model, Debug, Default)]
//! struct Person {
//!     #[ormlite(auto_increment)]
//!     id: i64,
//!     name: String,
//! }
//!
//! let db = Db::with_dialect(SqliteDialect::new());
//! let mut person = Person { name: "Ada".into(), ..Person::default() };
//! db.insert(&cx, &conn, &mut person, true).await;
//! let found: Option<Person> = db.select_by_id(&cx, &conn, person.id).await.unwrap();
//! ```

/// Unwrap an `Outcome`, returning early from the enclosing async operation
/// on anything but `Ok`.
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            ::asupersync::Outcome::Ok(value) => value,
            ::asupersync::Outcome::Err(e) => return ::asupersync::Outcome::Err(e),
            ::asupersync::Outcome::Cancelled(r) => return ::asupersync::Outcome::Cancelled(r),
            ::asupersync::Outcome::Panicked(p) => return ::asupersync::Outcome::Panicked(p),
        }
    };
}

/// Unwrap a composition `Result` inside an async operation.
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => return ::asupersync::Outcome::Err(e),
        }
    };
}

pub mod concurrency;
pub mod config;
pub mod db;
pub mod materialize;
mod read;
pub mod references;
mod schema;
mod write;

pub use concurrency::ConcurrencyGuard;
pub use config::{NullPolicy, OrmConfig, default_dialect, set_default_dialect};
pub use db::Db;
pub use materialize::{ColumnBinding, Materializer};

pub use ormlite_core::{
    CannedResults, CaptureSqlFilter, ColumnInfo, Connection, Cx, Error, Executor, FieldDefinition,
    FieldSpec, FieldType, ForeignKeyConstraint, Model, ModelBuilder, ModelCatalog,
    ModelDefinition, ModelRef, ModelingErrorKind, Outcome, Param, ReferentialAction, Result,
    ResultsFilter, ResultsFilterGuard, Row, SqlEnum, Statement, TransactionOps, Value,
    enum_field, install_results_filter, installed_results_filter, json_field, text_field,
};
pub use ormlite_macros::Model;
pub use ormlite_query::{
    AggregateFn, DdlBuilder, DialectProvider, Expr, ExprTranslator, IntoExpr, JoinKind, JoinPlan,
    LowerSnakeCase, MySqlDialect, NamingStrategy, PostgresDialect, SelectOptions,
    SqlServerDialect, SqliteDialect, StatementBuilder,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ormlite::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CannedResults, CaptureSqlFilter, Connection, Cx, Db, DialectProvider, Error, Executor,
        Expr, JoinPlan, Model, ModelBuilder, MySqlDialect, NullPolicy, OrmConfig, Outcome,
        PostgresDialect, ReferentialAction, Result, ResultsFilter, Row, SelectOptions,
        SqlServerDialect, SqliteDialect, Statement, Value, install_results_filter,
    };
}
