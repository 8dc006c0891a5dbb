//! Per-engine SQL dialects.
//!
//! A [`DialectProvider`] owns everything that differs between engines:
//! identifier quoting, the bound-parameter prefix, LIMIT/OFFSET syntax,
//! identity retrieval, auto-increment and row-version DDL, catalog queries,
//! and a [`ConverterRegistry`] with the engine's column types. Statement
//! composition on top of these knobs lives in
//! [`StatementBuilder`](crate::StatementBuilder) and
//! [`DdlBuilder`](crate::DdlBuilder).

mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::naming::NamingStrategy;
use ormlite_core::{ConverterRegistry, Error, FieldDefinition, ModelDefinition, Result, Statement};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Strategy object for one database engine.
pub trait DialectProvider: Send + Sync + fmt::Debug {
    /// Engine name used in logs and not-implemented errors.
    fn name(&self) -> &'static str;

    fn converters(&self) -> &ConverterRegistry;

    fn naming(&self) -> &dyn NamingStrategy;

    /// Prefix of bound parameter placeholders.
    fn param_prefix(&self) -> &'static str {
        "@"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Bound parameter name for a field name.
    fn param_name(&self, name: &str) -> String {
        sanitize_param_name(name)
    }

    /// Placeholder text for a parameter, e.g. `@Name`.
    fn param(&self, name: &str) -> String {
        format!("{}{}", self.param_prefix(), self.param_name(name))
    }

    /// Table name after naming, without quotes or schema.
    fn unquoted_table_name(&self, def: &ModelDefinition) -> String {
        self.naming().table_name(def.model_name())
    }

    /// Quoted, schema-qualified table name.
    fn table_name(&self, def: &ModelDefinition) -> String {
        let table = self.unquoted_table_name(def);
        match &def.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&table)
            ),
            None => self.quote_identifier(&table),
        }
    }

    /// Column name after naming, without quotes.
    fn column_name(&self, field: &FieldDefinition) -> String {
        self.naming().column_name(field.column_name())
    }

    fn quoted_column(&self, field: &FieldDefinition) -> String {
        self.quote_identifier(&self.column_name(field))
    }

    /// Column referenced when filtering on a row-version field.
    fn row_version_column(&self, field: &FieldDefinition) -> String {
        self.quoted_column(field)
    }

    /// Column type of a row-version field in CREATE TABLE, or `None` when the
    /// engine maintains a system column instead.
    fn row_version_column_definition(&self) -> Option<&'static str> {
        Some("BIGINT NOT NULL DEFAULT 1")
    }

    /// Statements maintaining the row version after CREATE TABLE.
    fn row_version_triggers(&self, _def: &ModelDefinition) -> Vec<String> {
        Vec::new()
    }

    /// Appended paging clause; empty when both limit and offset are absent.
    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, _has_order_by: bool) -> String {
        match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, Some(offset)) => format!(" OFFSET {}", offset),
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
        }
    }

    /// Statement reading the identity generated by the preceding insert.
    fn identity_sql(&self) -> Result<String> {
        Err(Error::not_implemented(self.name(), "identity retrieval"))
    }

    /// Clause appended to an INSERT that returns the generated key, for
    /// engines without a separate identity query.
    fn insert_returning_clause(&self, _def: &ModelDefinition) -> Option<String> {
        None
    }

    /// Column definition of an auto-increment primary key.
    fn auto_increment_column(&self, field: &FieldDefinition, column_type: &str) -> String;

    /// DDL default for a database-generated non-integer key.
    fn auto_id_default(&self) -> Option<&'static str> {
        None
    }

    /// Keyword introducing a new column in ALTER TABLE.
    fn add_column_keyword(&self) -> &'static str {
        "ADD COLUMN"
    }

    /// Change a column's type in place.
    fn alter_column_sql(
        &self,
        table: &str,
        _column: &str,
        _column_type: &str,
        column_definition: &str,
    ) -> Result<String> {
        Ok(format!("ALTER TABLE {} ALTER COLUMN {};", table, column_definition))
    }

    /// Rename a column.
    fn rename_column_sql(
        &self,
        def: &ModelDefinition,
        old_name: &str,
        new_name: &str,
        _column_definition: &str,
    ) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            self.table_name(def),
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        ))
    }

    /// Whether constraints can be added to an existing table.
    fn supports_alter_constraints(&self) -> bool {
        true
    }

    fn drop_foreign_key_sql(&self, table: &str, name: &str) -> Result<String> {
        if !self.supports_alter_constraints() {
            return Err(Error::not_implemented(self.name(), "drop foreign key"));
        }
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            table,
            self.quote_identifier(name)
        ))
    }

    /// Count query answering whether a table exists.
    fn table_exists_statement(&self, table: &str, schema: Option<&str>) -> Statement {
        let mut sql = format!(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = {}",
            self.param("tableName")
        );
        let mut statement = Statement::new(String::new()).bind("tableName", table);
        if let Some(schema) = schema {
            sql.push_str(&format!(" AND TABLE_SCHEMA = {}", self.param("schema")));
            statement = statement.bind("schema", schema);
        }
        statement.sql = sql;
        statement
    }

    /// Query listing base table names, optionally narrowed by a LIKE pattern.
    fn table_names_statement(&self, schema: Option<&str>, like: Option<&str>) -> Statement {
        let mut statement = Statement::new(String::new());
        let mut sql = String::from(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'",
        );
        if let Some(schema) = schema {
            sql.push_str(&format!(" AND TABLE_SCHEMA = {}", self.param("schema")));
            statement = statement.bind("schema", schema);
        }
        if let Some(like) = like {
            sql.push_str(&format!(" AND TABLE_NAME LIKE {}", self.param("like")));
            statement = statement.bind("like", like);
        }
        statement.sql = sql;
        statement
    }
}

/// Strip characters that are illegal in bound-parameter identifiers.
pub fn sanitize_param_name(name: &str) -> String {
    static ILLEGAL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("Invalid Regex"));
    ILLEGAL.replace_all(name, "").into_owned()
}

/// Is this filter already a complete SELECT statement?
pub fn is_full_select(sql: &str) -> bool {
    static SELECT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^\s*select\s").expect("Invalid Regex"));
    SELECT.is_match(sql)
}

/// Reject raw SQL fragments carrying comment or statement-separator tokens.
///
/// Quoted literals and quoted identifiers are skipped, so `Name = 'a;b'`
/// passes. An unterminated quote is scanned as plain text.
pub fn verify_fragment(sql: &str) -> Result<&str> {
    static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|`[^`]*`|\[[^\]]*\]"#).expect("Invalid Regex")
    });
    static ILLEGAL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"--|/\*|;").expect("Invalid Regex"));
    let unquoted = QUOTED.replace_all(sql, "''");
    if ILLEGAL.is_match(&unquoted) {
        return Err(Error::modeling(
            ormlite_core::ModelingErrorKind::InvalidExpression,
            format!("illegal token in SQL fragment: {}", sql),
        ));
    }
    Ok(sql)
}
