//! Core types and traits for OrmLite Rust.
//!
//! `ormlite-core` is the foundation layer the query builder and the facade
//! build on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`Model`] is implemented by user types (usually via
//!   `#[derive(Model)]`); [`Connection`] is implemented by database drivers.
//! - **Metadata**: [`ModelCatalog`] builds a [`ModelDefinition`] once per type
//!   and shares it process-wide.
//! - **Conversion**: [`ConverterRegistry`] maps native field values to and
//!   from [`Value`].
//! - **Test seam**: [`ResultsFilter`] answers statements in place of a driver.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync
//!   so every driver call is cancel-aware.
//!
//! Most applications should use the `ormlite` facade.

pub use asupersync::{Cx, Outcome};

pub mod catalog;
pub mod connection;
pub mod converter;
pub mod error;
pub mod field;
pub mod model;
pub mod results_filter;
pub mod row;
pub mod types;
pub mod value;

pub use catalog::{CowMap, ModelCatalog};
pub use connection::{Connection, Executor, Param, Statement, TransactionOps};
pub use converter::{
    BoolConverter, BytesConverter, CharConverter, Converter, ConverterRegistry, EnumConverter,
    FloatConverter, IntWire, IntegerConverter, RowVersionConverter, StringConverter,
    TextCodecConverter,
};
pub use error::{
    ConcurrencyError, ConnectionError, ConnectionErrorKind, ConversionError, Error,
    ModelingError, ModelingErrorKind, NotImplementedError, QueryError, QueryErrorKind, Result,
};
pub use field::{
    FieldDefinition, FieldSpec, ForeignKeyConstraint, ModelRef, ReferenceTarget,
    ReferentialAction,
};
pub use model::{
    CompositeIndex, Model, ModelBuilder, ModelDefinition, UniqueConstraint, normalize_name,
};
pub use results_filter::{
    CannedResults, CaptureSqlFilter, ResultsFilter, ResultsFilterGuard, install_results_filter,
    installed_results_filter,
};
pub use row::{ColumnInfo, Row};
pub use types::{FieldType, SqlEnum, TypeInfo, TypeKind};
pub use value::{Value, ValueKey};
