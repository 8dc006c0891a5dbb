//! MySQL dialect.

use super::DialectProvider;
use crate::naming::{IdentityNaming, NamingStrategy};
use ormlite_core::{
    BoolConverter, BytesConverter, CharConverter, ConverterRegistry, EnumConverter,
    FieldDefinition, FloatConverter, IntWire, IntegerConverter, ModelDefinition, Result,
    RowVersionConverter, Statement, StringConverter,
};

/// Offset-only paging still needs a row count; this is the largest MySQL accepts.
const MAX_LIMIT: u64 = 18_446_744_073_709_551_615;

/// Dialect for MySQL and MariaDB.
#[derive(Debug)]
pub struct MySqlDialect {
    converters: ConverterRegistry,
    naming: Box<dyn NamingStrategy>,
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl MySqlDialect {
    pub fn new() -> Self {
        Self::with_naming(IdentityNaming)
    }

    pub fn with_naming(naming: impl NamingStrategy + 'static) -> Self {
        let mut converters = ConverterRegistry::with_defaults();
        converters.register::<bool>(BoolConverter::new("TINYINT(1)").as_int());
        converters.register::<i8>(IntegerConverter::<i8>::new("TINYINT", IntWire::Int));
        converters.register::<i16>(IntegerConverter::<i16>::new("SMALLINT", IntWire::Int));
        converters.register::<i32>(IntegerConverter::<i32>::new("INT", IntWire::Int));
        converters.register::<i64>(IntegerConverter::<i64>::new("BIGINT", IntWire::BigInt));
        converters.register::<u8>(IntegerConverter::<u8>::new("TINYINT UNSIGNED", IntWire::Int));
        converters.register::<u16>(IntegerConverter::<u16>::new("SMALLINT UNSIGNED", IntWire::Int));
        converters.register::<u32>(IntegerConverter::<u32>::new("INT UNSIGNED", IntWire::BigInt));
        converters.register::<u64>(IntegerConverter::<u64>::new("BIGINT UNSIGNED", IntWire::BigInt));
        converters.register::<f32>(FloatConverter::<f32>::new("FLOAT"));
        converters.register::<f64>(FloatConverter::<f64>::new("DOUBLE"));
        converters.register::<char>(CharConverter::new("CHAR(1)"));
        converters.register::<String>(StringConverter::new("VARCHAR({})", Some(255), "LONGTEXT"));
        converters.register::<Vec<u8>>(BytesConverter::new("LONGBLOB"));
        converters.set_enum_converter(EnumConverter::new("VARCHAR(255)", "INT"));
        converters.set_row_version_converter(RowVersionConverter::new("BIGINT UNSIGNED"));
        Self {
            converters,
            naming: Box::new(naming),
        }
    }
}

impl DialectProvider for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    fn naming(&self) -> &dyn NamingStrategy {
        self.naming.as_ref()
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn row_version_triggers(&self, def: &ModelDefinition) -> Vec<String> {
        let Some(row_version) = def.row_version() else {
            return Vec::new();
        };
        let rv = self.quoted_column(row_version);
        vec![format!(
            "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW SET NEW.{} = OLD.{} + 1;",
            self.quote_identifier(&format!(
                "{}_rowversion_update_trigger",
                self.unquoted_table_name(def)
            )),
            self.table_name(def),
            rv,
            rv
        )]
    }

    fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, _has_order_by: bool) -> String {
        match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, Some(offset)) => format!(" LIMIT {}, {}", offset, MAX_LIMIT),
            (Some(limit), Some(offset)) => format!(" LIMIT {}, {}", offset, limit),
        }
    }

    fn identity_sql(&self) -> Result<String> {
        Ok("SELECT LAST_INSERT_ID()".to_string())
    }

    fn auto_increment_column(&self, _field: &FieldDefinition, column_type: &str) -> String {
        format!("{} PRIMARY KEY AUTO_INCREMENT", column_type)
    }

    fn alter_column_sql(
        &self,
        table: &str,
        _column: &str,
        _column_type: &str,
        column_definition: &str,
    ) -> Result<String> {
        Ok(format!("ALTER TABLE {} MODIFY COLUMN {};", table, column_definition))
    }

    fn rename_column_sql(
        &self,
        def: &ModelDefinition,
        old_name: &str,
        _new_name: &str,
        column_definition: &str,
    ) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} CHANGE COLUMN {} {};",
            self.table_name(def),
            self.quote_identifier(old_name),
            column_definition
        ))
    }

    fn drop_foreign_key_sql(&self, table: &str, name: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {};",
            table,
            self.quote_identifier(name)
        ))
    }

    fn table_exists_statement(&self, table: &str, schema: Option<&str>) -> Statement {
        let mut statement = Statement::new(String::new()).bind("tableName", table);
        let schema_clause = match schema {
            Some(schema) => {
                statement = statement.bind("schema", schema);
                self.param("schema")
            }
            None => "DATABASE()".to_string(),
        };
        statement.sql = format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = {} AND table_schema = {}",
            self.param("tableName"),
            schema_clause
        );
        statement
    }

    fn table_names_statement(&self, schema: Option<&str>, like: Option<&str>) -> Statement {
        let mut statement = Statement::new(String::new());
        let schema_clause = match schema {
            Some(schema) => {
                statement = statement.bind("schema", schema);
                self.param("schema")
            }
            None => "DATABASE()".to_string(),
        };
        let mut sql = format!(
            "SELECT table_name FROM information_schema.tables WHERE table_type = 'BASE TABLE' AND table_schema = {}",
            schema_clause
        );
        if let Some(like) = like {
            sql.push_str(&format!(" AND table_name LIKE {}", self.param("like")));
            statement = statement.bind("like", like);
        }
        statement.sql = sql;
        statement
    }
}
