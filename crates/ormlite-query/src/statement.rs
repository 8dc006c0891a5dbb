//! Parameterized CRUD statements composed from model definitions.
//!
//! Every value-bearing fragment binds a parameter named after the sanitized
//! field name, holding exactly the converter's output for that field.

use crate::dialect::{DialectProvider, is_full_select, verify_fragment};
use ormlite_core::{
    Error, FieldDefinition, ModelDefinition, ModelingErrorKind, Param, Result, Statement, Value,
};
use std::any::Any;

/// A write statement plus whether a row-version predicate guards it.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedStatement {
    pub statement: Statement,
    /// The WHERE clause includes the row version, so zero affected rows
    /// means a concurrent modification.
    pub row_version_guarded: bool,
}

/// Options for a model SELECT.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// WHERE fragment (with or without the keyword), or a complete SELECT.
    pub filter: String,
    pub params: Vec<Param>,
    /// ORDER BY fragment without the keyword.
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectOptions {
    pub fn filter(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push(Param::new(name, value));
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

fn ensure_instance(def: &ModelDefinition, model: &dyn Any) -> Result<()> {
    if model.type_id() == def.model_type {
        Ok(())
    } else {
        Err(Error::modeling(
            ModelingErrorKind::InvalidDefinition,
            format!("instance is not a {}", def.type_name),
        ))
    }
}

fn strip_where(filter: &str) -> &str {
    let trimmed = filter.trim();
    match trimmed.get(..6) {
        Some(head) if head.eq_ignore_ascii_case("where ") => trimmed[6..].trim_start(),
        _ => trimmed,
    }
}

/// Statement composition on top of a [`DialectProvider`].
pub trait StatementBuilder: DialectProvider {
    /// Convert one field of a model instance into a bound parameter.
    fn field_param(&self, field: &FieldDefinition, model: &dyn Any) -> Result<Param> {
        let value = self
            .converters()
            .to_db_value(field, field.get_value(model))?;
        Ok(Param::new(self.param_name(&field.name), value))
    }

    /// `"Col" = @Name`, or `"Col" IS NULL` for a NULL value.
    fn filter_predicate(&self, field: &FieldDefinition, param: &Param) -> String {
        let column = if field.is_row_version {
            self.row_version_column(field)
        } else {
            self.quoted_column(field)
        };
        if param.value.is_null() {
            format!("{} IS NULL", column)
        } else {
            format!("{} = {}{}", column, self.param_prefix(), param.name)
        }
    }

    /// INSERT for one instance.
    ///
    /// Without an explicit field subset, fields that skip inserts are left
    /// out; an explicit subset is honored except for computed fields. With
    /// `select_identity`, engines that return generated keys from the
    /// INSERT itself get their returning clause appended.
    fn insert_statement(
        &self,
        def: &ModelDefinition,
        model: &dyn Any,
        insert_fields: Option<&[&str]>,
        select_identity: bool,
    ) -> Result<Statement> {
        ensure_instance(def, model)?;
        let selected: Vec<&FieldDefinition> = match insert_fields {
            Some(names) => {
                let mut picked = Vec::with_capacity(names.len());
                for name in names {
                    let field = def.require_field(name)?;
                    if !field.is_computed() {
                        picked.push(field);
                    }
                }
                picked
            }
            None => def.fields.iter().filter(|f| !f.should_skip_insert()).collect(),
        };

        let mut columns = Vec::with_capacity(selected.len());
        let mut placeholders = Vec::with_capacity(selected.len());
        let mut params = Vec::with_capacity(selected.len());
        for field in selected {
            let param = self.field_param(field, model)?;
            let empty_key = matches!(&param.value, Value::Null)
                || matches!(&param.value, Value::Text(s) if s.is_empty());
            if field.auto_id && empty_key && self.auto_id_default().is_some() {
                continue;
            }
            columns.push(self.quoted_column(field));
            placeholders.push(format!("{}{}", self.param_prefix(), param.name));
            params.push(param);
        }

        let mut sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table_name(def))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table_name(def),
                columns.join(","),
                placeholders.join(",")
            )
        };
        if select_identity {
            if let Some(returning) = self.insert_returning_clause(def) {
                sql.push_str(&returning);
            }
        }
        tracing::trace!(sql = %sql, params = params.len(), "Built INSERT");
        Ok(Statement::with_params(sql, params))
    }

    /// UPDATE for one instance.
    ///
    /// Without an explicit subset, every updatable non-key field is SET and
    /// the primary key and row version form the WHERE clause. With a subset,
    /// only those fields are SET and the primary key alone filters.
    fn update_statement(
        &self,
        def: &ModelDefinition,
        model: &dyn Any,
        update_fields: Option<&[&str]>,
    ) -> Result<GuardedStatement> {
        ensure_instance(def, model)?;
        let mut set_fields = Vec::new();
        let mut where_fields = vec![def.primary_key()];
        let mut row_version_guarded = false;
        match update_fields {
            Some(names) => {
                for name in names {
                    let field = def.require_field(name)?;
                    if !field.is_primary_key && !field.should_skip_update() {
                        set_fields.push(field);
                    }
                }
            }
            None => {
                for field in &def.fields {
                    if field.is_primary_key {
                        continue;
                    }
                    if field.is_row_version {
                        where_fields.push(field);
                        row_version_guarded = true;
                    } else if !field.should_skip_update() {
                        set_fields.push(field);
                    }
                }
            }
        }
        if set_fields.is_empty() {
            return Err(Error::modeling(
                ModelingErrorKind::InvalidExpression,
                format!("no updatable fields on {}", def.name),
            ));
        }

        let mut params = Vec::with_capacity(set_fields.len() + where_fields.len());
        let mut assignments = Vec::with_capacity(set_fields.len());
        for field in set_fields {
            let param = self.field_param(field, model)?;
            assignments.push(format!(
                "{}={}{}",
                self.quoted_column(field),
                self.param_prefix(),
                param.name
            ));
            params.push(param);
        }
        let mut predicates = Vec::with_capacity(where_fields.len());
        for field in where_fields {
            let param = self.field_param(field, model)?;
            predicates.push(self.filter_predicate(field, &param));
            if !param.value.is_null() {
                params.push(param);
            }
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.table_name(def),
            assignments.join(", "),
            predicates.join(" AND ")
        );
        tracing::trace!(sql = %sql, row_version_guarded, "Built UPDATE");
        Ok(GuardedStatement {
            statement: Statement::with_params(sql, params),
            row_version_guarded,
        })
    }

    /// DELETE filtered on the given field values.
    ///
    /// At least one filter is required; a NULL filter value renders as
    /// `IS NULL`. The statement is guarded when a filter is the row version.
    fn delete_statement(
        &self,
        def: &ModelDefinition,
        filters: &[(&FieldDefinition, Value)],
    ) -> Result<GuardedStatement> {
        if filters.is_empty() {
            return Err(Error::modeling(
                ModelingErrorKind::InvalidExpression,
                format!("a DELETE on {} needs at least one filter field", def.name),
            ));
        }
        let mut predicates = Vec::with_capacity(filters.len());
        let mut params = Vec::with_capacity(filters.len());
        let mut row_version_guarded = false;
        for (field, value) in filters {
            let param = Param::new(self.param_name(&field.name), value.clone());
            predicates.push(self.filter_predicate(field, &param));
            row_version_guarded |= field.is_row_version && !value.is_null();
            if !param.value.is_null() {
                params.push(param);
            }
        }
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.table_name(def),
            predicates.join(" AND ")
        );
        tracing::trace!(sql = %sql, row_version_guarded, "Built DELETE");
        Ok(GuardedStatement {
            statement: Statement::with_params(sql, params),
            row_version_guarded,
        })
    }

    /// DELETE matching an instance on the named fields, or on every
    /// persisted non-computed field when `filter_fields` is `None`.
    fn delete_instance_statement(
        &self,
        def: &ModelDefinition,
        model: &dyn Any,
        filter_fields: Option<&[&str]>,
    ) -> Result<GuardedStatement> {
        ensure_instance(def, model)?;
        let fields: Vec<&FieldDefinition> = match filter_fields {
            Some(names) => names
                .iter()
                .map(|name| def.require_field(name))
                .collect::<Result<_>>()?,
            None => def.fields.iter().filter(|f| !f.is_computed()).collect(),
        };
        let mut filters = Vec::with_capacity(fields.len());
        for field in fields {
            let value = self
                .converters()
                .to_db_value(field, field.get_value(model))?;
            filters.push((field, value));
        }
        self.delete_statement(def, &filters)
    }

    /// `DELETE ... WHERE pk IN (...)`.
    fn delete_by_ids_statement(&self, def: &ModelDefinition, ids: &[Value]) -> Result<Statement> {
        let (predicate, params) = self.in_predicate(def.primary_key(), ids)?;
        Ok(Statement::with_params(
            format!("DELETE FROM {} WHERE {}", self.table_name(def), predicate),
            params,
        ))
    }

    /// `"Col" IN (@0,@1,...)` with positional parameters.
    fn in_predicate(&self, field: &FieldDefinition, values: &[Value]) -> Result<(String, Vec<Param>)> {
        if values.is_empty() {
            return Err(Error::modeling(
                ModelingErrorKind::InvalidExpression,
                format!("an IN filter on {} needs at least one value", field.name),
            ));
        }
        let params: Vec<Param> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Param::new(i.to_string(), v.clone()))
            .collect();
        let placeholders: Vec<String> = params
            .iter()
            .map(|p| format!("{}{}", self.param_prefix(), p.name))
            .collect();
        Ok((
            format!("{} IN ({})", self.quoted_column(field), placeholders.join(",")),
            params,
        ))
    }

    /// Expression selected for one field.
    fn select_expression(&self, field: &FieldDefinition) -> String {
        let alias = self.quote_identifier(&field.name);
        if let Some(custom) = &field.custom_select {
            return format!("{} AS {}", custom, alias);
        }
        if field.is_row_version {
            let column = self.row_version_column(field);
            if column != self.quoted_column(field) {
                return format!("{} AS {}", column, alias);
            }
        }
        self.quoted_column(field)
    }

    /// Comma-separated select list of every persisted field.
    fn select_columns(&self, def: &ModelDefinition) -> String {
        def.fields
            .iter()
            .map(|f| self.select_expression(f))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// SELECT of a model's columns, or the filter verbatim when it already
    /// is a complete SELECT.
    fn select_statement(&self, def: &ModelDefinition, options: &SelectOptions) -> Result<Statement> {
        if is_full_select(&options.filter) {
            return Ok(Statement::with_params(
                options.filter.clone(),
                options.params.clone(),
            ));
        }
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.select_columns(def),
            self.table_name(def)
        );
        let filter = verify_fragment(strip_where(&options.filter))?;
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if let Some(order_by) = &options.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(verify_fragment(order_by)?);
        }
        sql.push_str(&self.paging_clause(options.limit, options.offset, options.order_by.is_some()));
        tracing::trace!(sql = %sql, "Built SELECT");
        Ok(Statement::with_params(sql, options.params.clone()))
    }

    /// `SELECT COUNT(*)` with an optional filter.
    fn count_statement(&self, def: &ModelDefinition, options: &SelectOptions) -> Result<Statement> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table_name(def));
        let filter = verify_fragment(strip_where(&options.filter))?;
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        Ok(Statement::with_params(sql, options.params.clone()))
    }

    /// SELECT of the current row version of one row.
    fn row_version_statement(&self, def: &ModelDefinition, id: Value) -> Result<Option<Statement>> {
        let Some(row_version) = def.row_version() else {
            return Ok(None);
        };
        let pk = def.primary_key();
        let param = Param::new(self.param_name(&pk.name), id);
        Ok(Some(Statement::with_params(
            format!(
                "SELECT {} FROM {} WHERE {}",
                self.row_version_column(row_version),
                self.table_name(def),
                self.filter_predicate(pk, &param)
            ),
            vec![param],
        )))
    }
}

impl<D: DialectProvider + ?Sized> StatementBuilder for D {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use ormlite_core::{Model, ModelBuilder};

    #[derive(Debug, Default, Clone)]
    struct Person {
        id: i32,
        first_name: String,
        age: Option<i32>,
        full_name: String,
    }

    impl Model for Person {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field_with("Id", |p: &Self| &p.id, |p: &mut Self, v| p.id = v, |f| {
                f.auto_increment()
            })
            .field_with(
                "FirstName",
                |p: &Self| &p.first_name,
                |p: &mut Self, v| p.first_name = v,
                |f| f.alias("first name"),
            )
            .field("Age", |p: &Self| &p.age, |p: &mut Self, v| p.age = v)
            .field_with(
                "FullName",
                |p: &Self| &p.full_name,
                |p: &mut Self, v| p.full_name = v,
                |f| f.custom_select("FirstName || ' ' || LastName"),
            )
        }
    }

    #[derive(Debug, Default)]
    struct Account {
        id: i64,
        balance: i64,
        row_version: u64,
    }

    impl Model for Account {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |a: &Self| &a.id, |a: &mut Self, v| a.id = v)
                .field("Balance", |a: &Self| &a.balance, |a: &mut Self, v| a.balance = v)
                .field(
                    "RowVersion",
                    |a: &Self| &a.row_version,
                    |a: &mut Self, v| a.row_version = v,
                )
        }
    }

    fn person() -> Person {
        Person {
            id: 7,
            first_name: "Ada".into(),
            age: None,
            full_name: String::new(),
        }
    }

    #[test]
    fn test_insert_skips_auto_increment_and_computed() {
        let dialect = SqliteDialect::new();
        let def = Person::definition().expect("definition");
        let stmt = dialect
            .insert_statement(&def, &person(), None, false)
            .expect("insert");
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"Person\" (\"first name\",\"Age\") VALUES (@FirstName,@Age)"
        );
        assert_eq!(stmt.param("FirstName"), Some(&Value::Text("Ada".into())));
        assert_eq!(stmt.param("Age"), Some(&Value::Null));
    }

    #[test]
    fn test_insert_with_explicit_fields_and_returning() {
        let dialect = PostgresDialect::new();
        let def = Person::definition().expect("definition");
        let stmt = dialect
            .insert_statement(&def, &person(), Some(&["Id", "FirstName"]), true)
            .expect("insert");
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"Person\" (\"Id\",\"first name\") VALUES (:Id,:FirstName) RETURNING \"Id\""
        );
    }

    #[test]
    fn test_insert_rejects_foreign_instance() {
        let dialect = SqliteDialect::new();
        let def = Person::definition().expect("definition");
        assert!(dialect.insert_statement(&def, &Account::default(), None, false).is_err());
    }

    #[test]
    fn test_update_moves_key_and_row_version_to_where() {
        let dialect = SqliteDialect::new();
        let def = Account::definition().expect("definition");
        let account = Account {
            id: 1,
            balance: 50,
            row_version: 3,
        };
        let guarded = dialect.update_statement(&def, &account, None).expect("update");
        assert!(guarded.row_version_guarded);
        assert_eq!(
            guarded.statement.sql,
            "UPDATE \"Account\" SET \"Balance\"=@Balance WHERE \"Id\" = @Id AND \"RowVersion\" = @RowVersion"
        );
        assert_eq!(guarded.statement.param("RowVersion"), Some(&Value::BigInt(3)));
    }

    #[test]
    fn test_update_only_is_not_guarded() {
        let dialect = SqliteDialect::new();
        let def = Account::definition().expect("definition");
        let guarded = dialect
            .update_statement(&def, &Account::default(), Some(&["Balance"]))
            .expect("update");
        assert!(!guarded.row_version_guarded);
        assert_eq!(
            guarded.statement.sql,
            "UPDATE \"Account\" SET \"Balance\"=@Balance WHERE \"Id\" = @Id"
        );
    }

    #[test]
    fn test_delete_renders_null_as_is_null() {
        let dialect = SqliteDialect::new();
        let def = Person::definition().expect("definition");
        let guarded = dialect
            .delete_instance_statement(&def, &person(), Some(&["FirstName", "Age"]))
            .expect("delete");
        assert_eq!(
            guarded.statement.sql,
            "DELETE FROM \"Person\" WHERE \"first name\" = @FirstName AND \"Age\" IS NULL"
        );
        assert_eq!(guarded.statement.params.len(), 1);
        assert!(!guarded.row_version_guarded);
    }

    #[test]
    fn test_delete_requires_a_filter() {
        let dialect = SqliteDialect::new();
        let def = Person::definition().expect("definition");
        let err = dialect.delete_statement(&def, &[]).expect_err("no filters");
        assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::InvalidExpression));
    }

    #[test]
    fn test_select_passthrough_and_wrapping() {
        let dialect = SqliteDialect::new();
        let def = Person::definition().expect("definition");
        let raw = dialect
            .select_statement(&def, &SelectOptions::filter("select 1 from x"))
            .expect("select");
        assert_eq!(raw.sql, "select 1 from x");

        let wrapped = dialect
            .select_statement(
                &def,
                &SelectOptions::filter("WHERE Age > @age")
                    .bind("age", 30)
                    .order_by("\"Age\" DESC")
                    .limit(5),
            )
            .expect("select");
        assert_eq!(
            wrapped.sql,
            "SELECT \"Id\", \"first name\", \"Age\", FirstName || ' ' || LastName AS \"FullName\" FROM \"Person\" WHERE Age > @age ORDER BY \"Age\" DESC LIMIT 5"
        );
        assert_eq!(wrapped.params.len(), 1);

        let bare = dialect
            .select_statement(&def, &SelectOptions::default())
            .expect("select");
        assert!(bare.sql.ends_with("FROM \"Person\""));
    }

    #[test]
    fn test_postgres_row_version_reads_xmin() {
        let dialect = PostgresDialect::new();
        let def = Account::definition().expect("definition");
        assert_eq!(
            dialect.select_columns(&def),
            "\"Id\", \"Balance\", xmin AS \"RowVersion\""
        );
        let stmt = dialect
            .row_version_statement(&def, Value::BigInt(1))
            .expect("statement")
            .expect("has row version");
        assert_eq!(stmt.sql, "SELECT xmin FROM \"Account\" WHERE \"Id\" = :Id");
    }

    #[test]
    fn test_delete_by_ids() {
        let dialect = SqliteDialect::new();
        let def = Person::definition().expect("definition");
        let stmt = dialect
            .delete_by_ids_statement(&def, &[Value::Int(1), Value::Int(2)])
            .expect("delete");
        assert_eq!(stmt.sql, "DELETE FROM \"Person\" WHERE \"Id\" IN (@0,@1)");
        assert!(dialect.delete_by_ids_statement(&def, &[]).is_err());
    }
}
