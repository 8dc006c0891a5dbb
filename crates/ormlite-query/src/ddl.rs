//! DDL composed from model definitions.
//!
//! Constraint and index names are derived deterministically from the table
//! and field names, so running the same schema statements twice targets the
//! same objects.

use crate::statement::StatementBuilder;
use ormlite_core::{
    CompositeIndex, Error, FieldDefinition, ModelDefinition, ReferentialAction, Result,
};

/// Schema statement composition on top of a dialect.
pub trait DdlBuilder: StatementBuilder {
    /// Column definition for CREATE TABLE, or `None` for fields that are not
    /// physical columns on this engine.
    fn column_definition(&self, field: &FieldDefinition) -> Option<String> {
        let column = self.quoted_column(field);
        if field.custom_select.is_some() {
            return None;
        }
        if let Some(expression) = &field.compute_expression {
            return Some(format!("{} AS ({})", column, expression));
        }
        if field.is_row_version {
            return self
                .row_version_column_definition()
                .map(|definition| format!("{} {}", column, definition));
        }

        let column_type = self.converters().column_definition(field);
        if field.is_primary_key && field.auto_increment {
            return Some(format!(
                "{} {}",
                column,
                self.auto_increment_column(field, &column_type)
            ));
        }

        let mut sql = format!("{} {}", column, column_type);
        if field.is_primary_key {
            sql.push_str(" PRIMARY KEY");
            if field.auto_id {
                if let Some(default) = self.auto_id_default() {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(default);
                }
            }
        } else if field.nullable {
            sql.push_str(" NULL");
        } else {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &field.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        Some(sql)
    }

    /// `CONSTRAINT ... FOREIGN KEY ... REFERENCES ...` for one field.
    fn foreign_key_clause(&self, def: &ModelDefinition, field: &FieldDefinition) -> Result<Option<String>> {
        let Some(fk) = &field.foreign_key else {
            return Ok(None);
        };
        let target = fk.target.definition()?;
        let name = fk.constraint_name(
            &self.unquoted_table_name(def),
            &self.unquoted_table_name(&target),
            &self.column_name(field),
        );
        let mut clause = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&name),
            self.quoted_column(field),
            self.table_name(&target),
            self.quoted_column(target.primary_key())
        );
        push_referential_actions(&mut clause, fk.on_delete, fk.on_update);
        Ok(Some(clause))
    }

    /// The CREATE TABLE statement alone.
    fn create_table_statement(&self, def: &ModelDefinition) -> Result<String> {
        let mut parts: Vec<String> = def
            .fields
            .iter()
            .filter_map(|f| self.column_definition(f))
            .collect();
        for field in &def.fields {
            if let Some(clause) = self.foreign_key_clause(def, field)? {
                parts.push(clause);
            }
        }
        for constraint in &def.unique_constraints {
            let columns = self.quoted_columns(def, &constraint.field_names)?;
            let name = constraint.name.clone().unwrap_or_else(|| {
                format!(
                    "UC_{}_{}",
                    self.unquoted_table_name(def),
                    constraint.field_names.join("_")
                )
            });
            parts.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                self.quote_identifier(&name),
                columns.join(", ")
            ));
        }
        Ok(format!(
            "CREATE TABLE {} \n(\n  {} \n);",
            self.table_name(def),
            parts.join(", \n  ")
        ))
    }

    /// Every statement creating a model's table, in execution order:
    /// pre-create hook, table, indexes, row-version maintenance and the
    /// post-create hook.
    fn create_table_statements(&self, def: &ModelDefinition) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        if let Some(sql) = &def.pre_create_table_sql {
            statements.push(sql.clone());
        }
        statements.push(self.create_table_statement(def)?);
        statements.extend(self.index_statements(def)?);
        statements.extend(self.row_version_triggers(def));
        if let Some(sql) = &def.post_create_table_sql {
            statements.push(sql.clone());
        }
        tracing::debug!(
            dialect = self.name(),
            table = %self.table_name(def),
            statements = statements.len(),
            "Composed CREATE TABLE"
        );
        Ok(statements)
    }

    /// Default index name, `idx_{table}_{fields}` or `uidx_{table}_{fields}`.
    fn index_name(&self, def: &ModelDefinition, field_names: &[String], unique: bool) -> String {
        format!(
            "{}idx_{}_{}",
            if unique { "u" } else { "" },
            self.unquoted_table_name(def),
            field_names.join("_")
        )
        .to_lowercase()
    }

    /// CREATE INDEX for every indexed field and composite index.
    fn index_statements(&self, def: &ModelDefinition) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for field in def.fields.iter().filter(|f| f.is_indexed && !f.is_primary_key) {
            let columns = vec![self.column_name(field)];
            let name = self.index_name(def, &columns, field.is_unique_index);
            statements.push(self.index_sql(def, &name, &[self.quoted_column(field)], field.is_unique_index));
        }
        for CompositeIndex {
            field_names,
            unique,
            name,
        } in &def.composite_indexes
        {
            let columns = self.quoted_columns(def, field_names)?;
            let name = name
                .clone()
                .unwrap_or_else(|| self.index_name(def, field_names, *unique));
            statements.push(self.index_sql(def, &name, &columns, *unique));
        }
        Ok(statements)
    }

    fn index_sql(&self, def: &ModelDefinition, name: &str, columns: &[String], unique: bool) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({});",
            if unique { "UNIQUE " } else { "" },
            self.quote_identifier(name),
            self.table_name(def),
            columns.join(", ")
        )
    }

    /// Quoted columns of the named fields.
    fn quoted_columns(&self, def: &ModelDefinition, field_names: &[String]) -> Result<Vec<String>> {
        field_names
            .iter()
            .map(|name| def.require_field(name).map(|f| self.quoted_column(f)))
            .collect()
    }

    /// Pre-drop hook, DROP TABLE and post-drop hook.
    fn drop_table_statements(&self, def: &ModelDefinition) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(sql) = &def.pre_drop_table_sql {
            statements.push(sql.clone());
        }
        statements.push(format!("DROP TABLE {};", self.table_name(def)));
        if let Some(sql) = &def.post_drop_table_sql {
            statements.push(sql.clone());
        }
        statements
    }

    fn add_column_statement(&self, def: &ModelDefinition, field: &FieldDefinition) -> Result<String> {
        let definition = self.physical_column(field)?;
        Ok(format!(
            "ALTER TABLE {} {} {};",
            self.table_name(def),
            self.add_column_keyword(),
            definition
        ))
    }

    fn alter_column_statement(&self, def: &ModelDefinition, field: &FieldDefinition) -> Result<String> {
        let definition = self.physical_column(field)?;
        self.alter_column_sql(
            &self.table_name(def),
            &self.quoted_column(field),
            &self.converters().column_definition(field),
            &definition,
        )
    }

    /// Rename a column from `old_name` to the field's current column name.
    fn change_column_name_statement(
        &self,
        def: &ModelDefinition,
        field: &FieldDefinition,
        old_name: &str,
    ) -> Result<String> {
        let definition = self.physical_column(field)?;
        self.rename_column_sql(def, old_name, &self.column_name(field), &definition)
    }

    /// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`.
    fn add_foreign_key_statement(
        &self,
        def: &ModelDefinition,
        field: &FieldDefinition,
        target: &ModelDefinition,
        on_delete: Option<ReferentialAction>,
        on_update: Option<ReferentialAction>,
        name: Option<&str>,
    ) -> Result<String> {
        if !self.supports_alter_constraints() {
            return Err(Error::not_implemented(self.name(), "add foreign key"));
        }
        let name = name.map_or_else(
            || {
                format!(
                    "FK_{}_{}_{}",
                    self.unquoted_table_name(def),
                    self.unquoted_table_name(target),
                    self.column_name(field)
                )
            },
            str::to_string,
        );
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.table_name(def),
            self.quote_identifier(&name),
            self.quoted_column(field),
            self.table_name(target),
            self.quoted_column(target.primary_key())
        );
        push_referential_actions(&mut sql, on_delete, on_update);
        sql.push(';');
        Ok(sql)
    }

    fn drop_foreign_key_statement(&self, def: &ModelDefinition, name: &str) -> Result<String> {
        self.drop_foreign_key_sql(&self.table_name(def), name)
    }

    /// CREATE INDEX on one field, named by default unless `name` is given.
    fn create_index_statement(
        &self,
        def: &ModelDefinition,
        field: &FieldDefinition,
        name: Option<&str>,
        unique: bool,
    ) -> String {
        let name = name.map_or_else(
            || self.index_name(def, &[self.column_name(field)], unique),
            str::to_string,
        );
        self.index_sql(def, &name, &[self.quoted_column(field)], unique)
    }

    /// Column definition of a field that must be a physical column.
    fn physical_column(&self, field: &FieldDefinition) -> Result<String> {
        self.column_definition(field).ok_or_else(|| {
            Error::modeling(
                ormlite_core::ModelingErrorKind::InvalidDefinition,
                format!("'{}' is not a physical column on {}", field.name, self.name()),
            )
        })
    }
}

impl<D: StatementBuilder + ?Sized> DdlBuilder for D {}

fn push_referential_actions(
    sql: &mut String,
    on_delete: Option<ReferentialAction>,
    on_update: Option<ReferentialAction>,
) {
    if let Some(action) = on_delete {
        sql.push_str(" ON DELETE ");
        sql.push_str(action.as_sql());
    }
    if let Some(action) = on_update {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action.as_sql());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect, SqlServerDialect, SqliteDialect};
    use ormlite_core::{Model, ModelBuilder};

    #[derive(Debug, Default)]
    struct Customer {
        id: i32,
        email: String,
        nickname: Option<String>,
        row_version: u64,
    }

    impl Model for Customer {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field_with("Id", |c: &Self| &c.id, |c: &mut Self, v| c.id = v, |f| {
                f.auto_increment()
            })
            .field_with("Email", |c: &Self| &c.email, |c: &mut Self, v| c.email = v, |f| {
                f.length(120).unique()
            })
            .field_with(
                "Nickname",
                |c: &Self| &c.nickname,
                |c: &mut Self, v| c.nickname = v,
                |f| f.default_value("'anon'"),
            )
            .field(
                "RowVersion",
                |c: &Self| &c.row_version,
                |c: &mut Self, v| c.row_version = v,
            )
        }
    }

    #[derive(Debug, Default)]
    struct Order {
        id: i64,
        customer_id: i32,
        total: f64,
        line_count: i32,
    }

    impl Model for Order {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |o: &Self| &o.id, |o: &mut Self, v| o.id = v)
                .field_with(
                    "CustomerId",
                    |o: &Self| &o.customer_id,
                    |o: &mut Self, v| o.customer_id = v,
                    |f| f.references::<Customer>().on_delete(ReferentialAction::Cascade),
                )
                .field("Total", |o: &Self| &o.total, |o: &mut Self, v| o.total = v)
                .field_with(
                    "LineCount",
                    |o: &Self| &o.line_count,
                    |o: &mut Self, v| o.line_count = v,
                    |f| f.compute("Total * 2"),
                )
                .composite_index(&["CustomerId", "Total"], false)
                .unique_constraint(&["CustomerId", "Id"])
                .post_create_table("INSERT INTO \"Order\" (\"Id\") VALUES (0);")
        }
    }

    #[test]
    fn test_sqlite_create_table() {
        let dialect = SqliteDialect::new();
        let def = Customer::definition().expect("definition");
        let statements = dialect.create_table_statements(&def).expect("ddl");
        assert_eq!(
            statements[0],
            "CREATE TABLE \"Customer\" \n(\n  \"Id\" INTEGER PRIMARY KEY AUTOINCREMENT, \n  \"Email\" VARCHAR(120) NOT NULL, \n  \"Nickname\" VARCHAR(8000) NULL DEFAULT 'anon', \n  \"RowVersion\" BIGINT NOT NULL DEFAULT 1 \n);"
        );
        assert_eq!(
            statements[1],
            "CREATE UNIQUE INDEX \"uidx_customer_email\" ON \"Customer\" (\"Email\");"
        );
        assert!(statements[2].starts_with("CREATE TRIGGER"));
        assert_eq!(statements.len(), 3);
    }

    #[test]
    fn test_postgres_skips_row_version_column() {
        let dialect = PostgresDialect::new();
        let def = Customer::definition().expect("definition");
        let sql = dialect.create_table_statement(&def).expect("ddl");
        assert!(sql.contains("\"Id\" SERIAL PRIMARY KEY"));
        assert!(sql.contains("\"Email\" VARCHAR(120) NOT NULL"));
        assert!(!sql.contains("RowVersion"));
        assert!(dialect.row_version_triggers(&def).is_empty());
    }

    #[test]
    fn test_foreign_key_and_unique_constraint_names() {
        let dialect = SqliteDialect::new();
        let def = Order::definition().expect("definition");
        let statements = dialect.create_table_statements(&def).expect("ddl");
        let create = &statements[0];
        assert!(create.contains("\"LineCount\" AS (Total * 2)"));
        assert!(create.contains(
            "CONSTRAINT \"FK_Order_Customer_CustomerId\" FOREIGN KEY (\"CustomerId\") REFERENCES \"Customer\" (\"Id\") ON DELETE CASCADE"
        ));
        assert!(create.contains("CONSTRAINT \"UC_Order_CustomerId_Id\" UNIQUE (\"CustomerId\", \"Id\")"));
        assert_eq!(
            statements[1],
            "CREATE INDEX \"idx_order_customerid_total\" ON \"Order\" (\"CustomerId\", \"Total\");"
        );
        assert_eq!(statements.last().map(String::as_str), Some("INSERT INTO \"Order\" (\"Id\") VALUES (0);"));

        let again = dialect.create_table_statements(&def).expect("ddl");
        assert_eq!(statements, again);
    }

    #[test]
    fn test_alter_statements() {
        let def = Customer::definition().expect("definition");
        let email = def.field("Email").expect("email");

        let sqlite = SqliteDialect::new();
        assert_eq!(
            sqlite.add_column_statement(&def, email).expect("add"),
            "ALTER TABLE \"Customer\" ADD COLUMN \"Email\" VARCHAR(120) NOT NULL;"
        );
        assert!(sqlite.alter_column_statement(&def, email).is_err());

        let postgres = PostgresDialect::new();
        assert_eq!(
            postgres.alter_column_statement(&def, email).expect("alter"),
            "ALTER TABLE \"Customer\" ALTER COLUMN \"Email\" TYPE VARCHAR(120);"
        );

        let mysql = MySqlDialect::new();
        assert_eq!(
            mysql
                .change_column_name_statement(&def, email, "Mail")
                .expect("rename"),
            "ALTER TABLE `Customer` CHANGE COLUMN `Mail` `Email` VARCHAR(120) NOT NULL;"
        );

        let sqlserver = SqlServerDialect::new();
        assert_eq!(
            sqlserver.add_column_statement(&def, email).expect("add"),
            "ALTER TABLE [Customer] ADD [Email] NVARCHAR(120) NOT NULL;"
        );
    }

    #[test]
    fn test_add_foreign_key() {
        let order = Order::definition().expect("order");
        let customer = Customer::definition().expect("customer");
        let field = order.field("CustomerId").expect("field");

        let postgres = PostgresDialect::new();
        assert_eq!(
            postgres
                .add_foreign_key_statement(&order, field, &customer, None, Some(ReferentialAction::Cascade), None)
                .expect("fk"),
            "ALTER TABLE \"Order\" ADD CONSTRAINT \"FK_Order_Customer_CustomerId\" FOREIGN KEY (\"CustomerId\") REFERENCES \"Customer\" (\"Id\") ON UPDATE CASCADE;"
        );

        let sqlite = SqliteDialect::new();
        let err = sqlite
            .add_foreign_key_statement(&order, field, &customer, None, None, None)
            .expect_err("unsupported");
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn test_drop_and_index() {
        let dialect = SqliteDialect::new();
        let def = Customer::definition().expect("definition");
        assert_eq!(dialect.drop_table_statements(&def), vec!["DROP TABLE \"Customer\";"]);
        let field = def.field("Nickname").expect("nickname");
        assert_eq!(
            dialect.create_index_statement(&def, field, None, false),
            "CREATE INDEX \"idx_customer_nickname\" ON \"Customer\" (\"Nickname\");"
        );
        assert_eq!(
            dialect.create_index_statement(&def, field, Some("ix_nick"), true),
            "CREATE UNIQUE INDEX \"ix_nick\" ON \"Customer\" (\"Nickname\");"
        );
    }
}
