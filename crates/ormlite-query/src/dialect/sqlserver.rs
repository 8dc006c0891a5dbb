//! SQL Server dialect.
//!
//! Paging uses `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY`, which SQL Server only
//! accepts after an ORDER BY; an unordered query is ordered by its first
//! column. Row versions use the native `rowversion` column type.

use super::DialectProvider;
use crate::naming::{IdentityNaming, NamingStrategy};
use ormlite_core::{
    BoolConverter, BytesConverter, CharConverter, ConverterRegistry, EnumConverter,
    FieldDefinition, FloatConverter, IntWire, IntegerConverter, ModelDefinition, Result,
    RowVersionConverter, StringConverter,
};

/// Dialect for Microsoft SQL Server.
#[derive(Debug)]
pub struct SqlServerDialect {
    converters: ConverterRegistry,
    naming: Box<dyn NamingStrategy>,
}

impl Default for SqlServerDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlServerDialect {
    pub fn new() -> Self {
        Self::with_naming(IdentityNaming)
    }

    pub fn with_naming(naming: impl NamingStrategy + 'static) -> Self {
        let mut converters = ConverterRegistry::with_defaults();
        converters.register::<bool>(BoolConverter::new("BIT"));
        converters.register::<i8>(IntegerConverter::<i8>::new("SMALLINT", IntWire::Int));
        converters.register::<i16>(IntegerConverter::<i16>::new("SMALLINT", IntWire::Int));
        converters.register::<i32>(IntegerConverter::<i32>::new("INTEGER", IntWire::Int));
        converters.register::<i64>(IntegerConverter::<i64>::new("BIGINT", IntWire::BigInt));
        converters.register::<u8>(IntegerConverter::<u8>::new("TINYINT", IntWire::Int));
        converters.register::<u16>(IntegerConverter::<u16>::new("INTEGER", IntWire::Int));
        converters.register::<u32>(IntegerConverter::<u32>::new("BIGINT", IntWire::BigInt));
        converters.register::<u64>(IntegerConverter::<u64>::new("DECIMAL(20,0)", IntWire::BigInt));
        converters.register::<f32>(FloatConverter::<f32>::new("REAL"));
        converters.register::<f64>(FloatConverter::<f64>::new("FLOAT"));
        converters.register::<char>(CharConverter::new("NCHAR(1)"));
        converters.register::<String>(StringConverter::new("NVARCHAR({})", Some(4000), "NVARCHAR(MAX)"));
        converters.register::<Vec<u8>>(BytesConverter::new("VARBINARY(MAX)"));
        converters.set_enum_converter(EnumConverter::new("NVARCHAR(255)", "INTEGER"));
        converters.set_row_version_converter(RowVersionConverter::new("rowversion"));
        Self {
            converters,
            naming: Box::new(naming),
        }
    }
}

impl DialectProvider for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    fn naming(&self) -> &dyn NamingStrategy {
        self.naming.as_ref()
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn row_version_column_definition(&self) -> Option<&'static str> {
        Some("rowversion")
    }

    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, has_order_by: bool) -> String {
        if limit.is_none() && offset.is_none() {
            return String::new();
        }
        let mut clause = String::new();
        if !has_order_by {
            clause.push_str(" ORDER BY 1");
        }
        clause.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
        if let Some(limit) = limit {
            clause.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
        }
        clause
    }

    fn identity_sql(&self) -> Result<String> {
        Ok("SELECT SCOPE_IDENTITY()".to_string())
    }

    fn auto_increment_column(&self, _field: &FieldDefinition, column_type: &str) -> String {
        format!("{} PRIMARY KEY IDENTITY(1,1)", column_type)
    }

    fn auto_id_default(&self) -> Option<&'static str> {
        Some("NEWID()")
    }

    fn add_column_keyword(&self) -> &'static str {
        "ADD"
    }

    fn rename_column_sql(
        &self,
        def: &ModelDefinition,
        old_name: &str,
        new_name: &str,
        _column_definition: &str,
    ) -> Result<String> {
        let table = match &def.schema {
            Some(schema) => format!("{}.{}", schema, self.unquoted_table_name(def)),
            None => self.unquoted_table_name(def),
        };
        Ok(format!(
            "EXEC sp_rename '{}.{}', '{}', 'COLUMN';",
            table.replace('\'', "''"),
            old_name.replace('\'', "''"),
            new_name.replace('\'', "''")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlite_core::{Model, ModelBuilder};

    #[test]
    fn test_bracket_quoting() {
        let dialect = SqlServerDialect::new();
        assert_eq!(dialect.quote_identifier("Order"), "[Order]");
        assert_eq!(dialect.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn test_paging_requires_order_by() {
        let dialect = SqlServerDialect::new();
        assert_eq!(dialect.paging_clause(None, None, false), "");
        assert_eq!(
            dialect.paging_clause(Some(10), None, false),
            " ORDER BY 1 OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            dialect.paging_clause(Some(10), Some(20), true),
            " OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(dialect.paging_clause(None, Some(5), true), " OFFSET 5 ROWS");
    }

    #[derive(Debug, Default)]
    struct Person {
        id: i32,
    }

    impl Model for Person {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.schema("dbo")
                .field("Id", |p: &Self| &p.id, |p: &mut Self, v| p.id = v)
        }
    }

    #[test]
    fn test_identity_and_rename() {
        let dialect = SqlServerDialect::new();
        assert_eq!(dialect.identity_sql().expect("identity"), "SELECT SCOPE_IDENTITY()");
        let def = Person::definition().expect("definition");
        assert_eq!(dialect.table_name(&def), "[dbo].[Person]");
        assert_eq!(
            dialect
                .rename_column_sql(&def, "Name", "FullName", "")
                .expect("rename"),
            "EXEC sp_rename 'dbo.Person.Name', 'FullName', 'COLUMN';"
        );
    }
}
