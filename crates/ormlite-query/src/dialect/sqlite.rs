//! SQLite dialect.
//!
//! SQLite has no schemas inside one database file, so a schema-qualified
//! table `schema.table` is folded into the single table name
//! `schema_table`. Row versions are a `BIGINT` bumped by an AFTER UPDATE
//! trigger.

use super::DialectProvider;
use crate::naming::{IdentityNaming, NamingStrategy};
use ormlite_core::{
    BoolConverter, BytesConverter, CharConverter, ConverterRegistry, Error, FieldDefinition,
    FloatConverter, IntWire, IntegerConverter, ModelDefinition, Result, RowVersionConverter,
    Statement, StringConverter,
};

/// Dialect for SQLite.
#[derive(Debug)]
pub struct SqliteDialect {
    converters: ConverterRegistry,
    naming: Box<dyn NamingStrategy>,
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self::with_naming(IdentityNaming)
    }

    pub fn with_naming(naming: impl NamingStrategy + 'static) -> Self {
        let mut converters = ConverterRegistry::with_defaults();
        converters.register::<bool>(BoolConverter::new("INTEGER").as_int());
        converters.register::<i8>(IntegerConverter::<i8>::new("INTEGER", IntWire::Int));
        converters.register::<i16>(IntegerConverter::<i16>::new("INTEGER", IntWire::Int));
        converters.register::<i32>(IntegerConverter::<i32>::new("INTEGER", IntWire::Int));
        converters.register::<i64>(IntegerConverter::<i64>::new("BIGINT", IntWire::BigInt));
        converters.register::<u8>(IntegerConverter::<u8>::new("INTEGER", IntWire::Int));
        converters.register::<u16>(IntegerConverter::<u16>::new("INTEGER", IntWire::Int));
        converters.register::<u32>(IntegerConverter::<u32>::new("BIGINT", IntWire::BigInt));
        converters.register::<u64>(IntegerConverter::<u64>::new("BIGINT", IntWire::BigInt));
        converters.register::<f32>(FloatConverter::<f32>::new("REAL"));
        converters.register::<f64>(FloatConverter::<f64>::new("REAL"));
        converters.register::<char>(CharConverter::new("CHAR(1)"));
        converters.register::<String>(StringConverter::new("VARCHAR({})", Some(8000), "TEXT"));
        converters.register::<Vec<u8>>(BytesConverter::new("BLOB"));
        converters.set_row_version_converter(RowVersionConverter::new("BIGINT"));
        Self {
            converters,
            naming: Box::new(naming),
        }
    }
}

impl DialectProvider for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    fn naming(&self) -> &dyn NamingStrategy {
        self.naming.as_ref()
    }

    fn unquoted_table_name(&self, def: &ModelDefinition) -> String {
        let table = self.naming.table_name(def.model_name());
        match &def.schema {
            Some(schema) => format!("{}_{}", schema, table),
            None => table,
        }
    }

    fn table_name(&self, def: &ModelDefinition) -> String {
        self.quote_identifier(&self.unquoted_table_name(def))
    }

    fn row_version_triggers(&self, def: &ModelDefinition) -> Vec<String> {
        let Some(row_version) = def.row_version() else {
            return Vec::new();
        };
        let table = self.table_name(def);
        let rv = self.quoted_column(row_version);
        let pk = self.quoted_column(def.primary_key());
        vec![format!(
            "CREATE TRIGGER {} AFTER UPDATE ON {} FOR EACH ROW BEGIN UPDATE {} SET {} = OLD.{} + 1 WHERE {} = NEW.{}; END;",
            self.quote_identifier(&format!(
                "{}_rowversion_update_trigger",
                self.unquoted_table_name(def)
            )),
            table,
            table,
            rv,
            rv,
            pk,
            pk
        )]
    }

    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, _has_order_by: bool) -> String {
        match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", offset),
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
        }
    }

    fn identity_sql(&self) -> Result<String> {
        Ok("SELECT last_insert_rowid()".to_string())
    }

    fn auto_increment_column(&self, _field: &FieldDefinition, _column_type: &str) -> String {
        "INTEGER PRIMARY KEY AUTOINCREMENT".to_string()
    }

    fn alter_column_sql(
        &self,
        _table: &str,
        _column: &str,
        _column_type: &str,
        _column_definition: &str,
    ) -> Result<String> {
        Err(Error::not_implemented(self.name(), "alter column"))
    }

    fn supports_alter_constraints(&self) -> bool {
        false
    }

    fn table_exists_statement(&self, table: &str, _schema: Option<&str>) -> Statement {
        Statement::new(format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = {}",
            self.param("tableName")
        ))
        .bind("tableName", table)
    }

    fn table_names_statement(&self, schema: Option<&str>, like: Option<&str>) -> Statement {
        let mut statement = Statement::new(String::new());
        let mut sql = String::from(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        );
        if let Some(schema) = schema {
            sql.push_str(&format!(" AND name LIKE {}", self.param("schema")));
            statement = statement.bind("schema", format!("{}\\_%", schema));
            sql.push_str(" ESCAPE '\\'");
        }
        if let Some(like) = like {
            sql.push_str(&format!(" AND name LIKE {}", self.param("like")));
            statement = statement.bind("like", like);
        }
        statement.sql = sql;
        statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlite_core::{Model, ModelBuilder};

    #[derive(Debug, Default)]
    struct Ledger {
        id: i64,
        row_version: u64,
    }

    impl Model for Ledger {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.schema("acct")
                .field_with("Id", |l: &Self| &l.id, |l: &mut Self, v| l.id = v, |f| {
                    f.auto_increment()
                })
                .field(
                    "RowVersion",
                    |l: &Self| &l.row_version,
                    |l: &mut Self, v| l.row_version = v,
                )
        }
    }

    #[test]
    fn test_schema_is_folded_into_table_name() {
        let dialect = SqliteDialect::new();
        let def = Ledger::definition().expect("definition");
        assert_eq!(dialect.table_name(&def), "\"acct_Ledger\"");
    }

    #[test]
    fn test_paging() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.paging_clause(None, None, false), "");
        assert_eq!(dialect.paging_clause(Some(10), None, false), " LIMIT 10");
        assert_eq!(dialect.paging_clause(None, Some(5), false), " LIMIT -1 OFFSET 5");
        assert_eq!(dialect.paging_clause(Some(10), Some(5), false), " LIMIT 10 OFFSET 5");
    }

    #[test]
    fn test_row_version_trigger() {
        let dialect = SqliteDialect::new();
        let def = Ledger::definition().expect("definition");
        let triggers = dialect.row_version_triggers(&def);
        assert_eq!(
            triggers,
            vec![
                "CREATE TRIGGER \"acct_Ledger_rowversion_update_trigger\" AFTER UPDATE ON \"acct_Ledger\" FOR EACH ROW BEGIN UPDATE \"acct_Ledger\" SET \"RowVersion\" = OLD.\"RowVersion\" + 1 WHERE \"Id\" = NEW.\"Id\"; END;"
            ]
        );
    }

    #[test]
    fn test_unsupported_operations() {
        let dialect = SqliteDialect::new();
        let err = dialect
            .alter_column_sql("\"t\"", "\"c\"", "TEXT", "\"c\" TEXT NULL").expect_err("unsupported");
        assert!(matches!(err, Error::NotImplemented(_)));
        assert!(dialect.drop_foreign_key_sql("\"t\"", "FK_x").is_err());
        assert_eq!(dialect.identity_sql().expect("identity"), "SELECT last_insert_rowid()");
    }
}
