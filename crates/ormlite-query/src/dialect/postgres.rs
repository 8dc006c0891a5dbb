//! PostgreSQL dialect.
//!
//! Parameters use the `:` prefix. Generated keys come back through
//! `RETURNING`. Row versions read the `xmin` system column, so no
//! row-version column is created.

use super::DialectProvider;
use crate::naming::{IdentityNaming, NamingStrategy};
use ormlite_core::{
    BoolConverter, BytesConverter, CharConverter, ConverterRegistry, FieldDefinition,
    FloatConverter, IntWire, IntegerConverter, ModelDefinition, Result, RowVersionConverter,
    Statement, StringConverter,
};

/// Dialect for PostgreSQL.
#[derive(Debug)]
pub struct PostgresDialect {
    converters: ConverterRegistry,
    naming: Box<dyn NamingStrategy>,
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresDialect {
    pub fn new() -> Self {
        Self::with_naming(IdentityNaming)
    }

    pub fn with_naming(naming: impl NamingStrategy + 'static) -> Self {
        let mut converters = ConverterRegistry::with_defaults();
        converters.register::<bool>(BoolConverter::new("BOOLEAN"));
        converters.register::<i8>(IntegerConverter::<i8>::new("SMALLINT", IntWire::Int));
        converters.register::<i16>(IntegerConverter::<i16>::new("SMALLINT", IntWire::Int));
        converters.register::<i32>(IntegerConverter::<i32>::new("INTEGER", IntWire::Int));
        converters.register::<i64>(IntegerConverter::<i64>::new("BIGINT", IntWire::BigInt));
        converters.register::<u8>(IntegerConverter::<u8>::new("SMALLINT", IntWire::Int));
        converters.register::<u16>(IntegerConverter::<u16>::new("INTEGER", IntWire::Int));
        converters.register::<u32>(IntegerConverter::<u32>::new("BIGINT", IntWire::BigInt));
        converters.register::<u64>(IntegerConverter::<u64>::new("NUMERIC(20)", IntWire::BigInt));
        converters.register::<f32>(FloatConverter::<f32>::new("REAL"));
        converters.register::<f64>(FloatConverter::<f64>::new("DOUBLE PRECISION"));
        converters.register::<char>(CharConverter::new("CHAR(1)"));
        converters.register::<String>(StringConverter::new("VARCHAR({})", None, "TEXT"));
        converters.register::<Vec<u8>>(BytesConverter::new("BYTEA"));
        converters.set_row_version_converter(RowVersionConverter::new("BIGINT"));
        Self {
            converters,
            naming: Box::new(naming),
        }
    }
}

impl DialectProvider for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    fn naming(&self) -> &dyn NamingStrategy {
        self.naming.as_ref()
    }

    fn param_prefix(&self) -> &'static str {
        ":"
    }

    fn row_version_column(&self, _field: &FieldDefinition) -> String {
        "xmin".to_string()
    }

    fn row_version_column_definition(&self) -> Option<&'static str> {
        None
    }

    fn insert_returning_clause(&self, def: &ModelDefinition) -> Option<String> {
        Some(format!(" RETURNING {}", self.quoted_column(def.primary_key())))
    }

    fn identity_sql(&self) -> Result<String> {
        Ok("SELECT LASTVAL()".to_string())
    }

    fn auto_increment_column(&self, field: &FieldDefinition, _column_type: &str) -> String {
        if field.field_type.is::<i64>() || field.field_type.is::<u64>() {
            "BIGSERIAL PRIMARY KEY".to_string()
        } else {
            "SERIAL PRIMARY KEY".to_string()
        }
    }

    fn auto_id_default(&self) -> Option<&'static str> {
        Some("gen_random_uuid()")
    }

    fn alter_column_sql(
        &self,
        table: &str,
        column: &str,
        column_type: &str,
        _column_definition: &str,
    ) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {};",
            table, column, column_type
        ))
    }

    fn table_exists_statement(&self, table: &str, schema: Option<&str>) -> Statement {
        Statement::new(format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = {} AND table_schema = {}",
            self.param("tableName"),
            self.param("schema")
        ))
        .bind("tableName", table)
        .bind("schema", schema.unwrap_or("public"))
    }

    fn table_names_statement(&self, schema: Option<&str>, like: Option<&str>) -> Statement {
        let mut statement = Statement::new(String::new()).bind("schema", schema.unwrap_or("public"));
        let mut sql = format!(
            "SELECT table_name FROM information_schema.tables WHERE table_type = 'BASE TABLE' AND table_schema = {}",
            self.param("schema")
        );
        if let Some(like) = like {
            sql.push_str(&format!(" AND table_name LIKE {}", self.param("like")));
            statement = statement.bind("like", like);
        }
        statement.sql = sql;
        statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::LowerSnakeCase;
    use ormlite_core::{FieldType, Model, ModelBuilder};

    #[derive(Debug, Default)]
    struct AuditEntry {
        id: i64,
        message: String,
    }

    impl Model for AuditEntry {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.schema("audit")
                .field_with("Id", |e: &Self| &e.id, |e: &mut Self, v| e.id = v, |f| {
                    f.auto_increment()
                })
                .field("Message", |e: &Self| &e.message, |e: &mut Self, v| e.message = v)
        }
    }

    #[test]
    fn test_quoting_and_schema() {
        let dialect = PostgresDialect::new();
        let def = AuditEntry::definition().expect("definition");
        assert_eq!(dialect.table_name(&def), "\"audit\".\"AuditEntry\"");
        assert_eq!(dialect.param("Message"), ":Message");
        assert_eq!(
            dialect.insert_returning_clause(&def).as_deref(),
            Some(" RETURNING \"Id\"")
        );
    }

    #[test]
    fn test_snake_case_naming() {
        let dialect = PostgresDialect::with_naming(LowerSnakeCase);
        let def = AuditEntry::definition().expect("definition");
        assert_eq!(dialect.table_name(&def), "\"audit\".\"audit_entry\"");
        assert_eq!(dialect.quoted_column(def.primary_key()), "\"id\"");
    }

    #[test]
    fn test_paging_and_serial() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.paging_clause(None, Some(20), false), " OFFSET 20");
        assert_eq!(dialect.paging_clause(Some(5), Some(20), false), " LIMIT 5 OFFSET 20");
        let id = FieldDefinition::new("Id", <i32 as FieldType>::type_info());
        assert_eq!(dialect.auto_increment_column(&id, "INTEGER"), "SERIAL PRIMARY KEY");
    }

    #[test]
    fn test_row_version_uses_xmin() {
        let dialect = PostgresDialect::new();
        let rv = FieldDefinition::new("RowVersion", <u64 as FieldType>::type_info());
        assert_eq!(dialect.row_version_column(&rv), "xmin");
        assert!(dialect.row_version_column_definition().is_none());
    }
}
