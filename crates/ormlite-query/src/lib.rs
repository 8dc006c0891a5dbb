//! SQL generation for OrmLite Rust.
//!
//! `ormlite-query` turns [`ModelDefinition`](ormlite_core::ModelDefinition)s
//! and typed expressions into SQL text with named parameters.
//!
//! # Role In The Architecture
//!
//! - **Dialects**: [`DialectProvider`] captures quoting, parameter prefix,
//!   paging, identity retrieval and DDL knobs for SQLite, PostgreSQL, MySQL
//!   and SQL Server.
//! - **Statements**: [`StatementBuilder`] and [`DdlBuilder`] compose INSERT,
//!   UPDATE, DELETE, SELECT and schema statements on any dialect.
//! - **Expressions**: [`Expr`] trees are rendered by [`ExprTranslator`] with
//!   every constant bound as a parameter.
//! - **Joins**: [`JoinPlan`] builds multi-table SELECTs with self-join
//!   aliasing.
//!
//! Nothing here talks to a database; the `ormlite` facade runs the
//! statements.

pub mod ddl;
pub mod dialect;
pub mod expr;
pub mod join;
pub mod naming;
pub mod statement;
pub mod visitor;

pub use ddl::DdlBuilder;
pub use dialect::{
    DialectProvider, MySqlDialect, PostgresDialect, SqlServerDialect, SqliteDialect,
    is_full_select, sanitize_param_name, verify_fragment,
};
pub use expr::{AggregateFn, BinaryOp, Expr, IntoExpr, LikeKind, Member, NativeConstant};
pub use join::{JoinKind, JoinPlan};
pub use naming::{IdentityNaming, LowerSnakeCase, NamingStrategy};
pub use statement::{GuardedStatement, SelectOptions, StatementBuilder};
pub use visitor::{ExprTranslator, table_alias};
