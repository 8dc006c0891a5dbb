//! Schema operations.

use crate::db::Db;
use asupersync::{Cx, Outcome};
use ormlite_core::{Error, Executor, Model, ModelDefinition, ReferentialAction, Statement, Value};
use ormlite_query::{DdlBuilder, DialectProvider};
use std::collections::HashMap;

impl Db {
    async fn run_all<E: Executor>(&self, cx: &Cx, exec: &E, statements: Vec<String>) -> Outcome<(), Error> {
        for sql in statements {
            try_outcome!(self.run(cx, exec, &Statement::new(sql)).await);
        }
        Outcome::Ok(())
    }

    async fn run_ddl<E: Executor>(&self, cx: &Cx, exec: &E, sql: String) -> Outcome<(), Error> {
        try_outcome!(self.run(cx, exec, &Statement::new(sql)).await);
        Outcome::Ok(())
    }

    /// Whether a table of that name exists, optionally inside `schema`.
    pub async fn table_exists_named<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        table: &str,
        schema: Option<&str>,
    ) -> Outcome<bool, Error> {
        let statement = self.dialect().table_exists_statement(table, schema);
        let count = try_outcome!(self.fetch_scalar(cx, exec, &statement).await);
        Outcome::Ok(count.as_i64().unwrap_or(0) > 0)
    }

    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn table_exists<M: Model, E: Executor>(&self, cx: &Cx, exec: &E) -> Outcome<bool, Error> {
        let def = try_result!(M::definition());
        let table = self.dialect().unquoted_table_name(&def);
        self.table_exists_named(cx, exec, &table, def.schema.as_deref())
            .await
    }

    /// Names of the base tables, narrowed by the `schema` and `like`
    /// filters. Dialects without schemas treat `schema` as a table-name
    /// prefix; unknown filter keys are ignored.
    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn get_table_names<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        filters: &HashMap<String, String>,
    ) -> Outcome<Vec<String>, Error> {
        for key in filters.keys() {
            if key != "schema" && key != "like" {
                tracing::debug!(filter = %key, "Ignoring unknown table-name filter");
            }
        }
        let statement = self.dialect().table_names_statement(
            filters.get("schema").map(String::as_str),
            filters.get("like").map(String::as_str),
        );
        let rows = try_outcome!(self.fetch(cx, exec, &statement).await);
        Outcome::Ok(
            rows.into_iter()
                .filter_map(|row| match row.into_values().into_iter().next() {
                    Some(Value::Text(name)) => Some(name),
                    _ => None,
                })
                .collect(),
        )
    }

    async fn create_from_definition<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        def: &ModelDefinition,
    ) -> Outcome<(), Error> {
        let statements = try_result!(self.dialect().create_table_statements(def));
        self.run_all(cx, exec, statements).await
    }

    async fn drop_from_definition<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        def: &ModelDefinition,
    ) -> Outcome<(), Error> {
        let statements = self.dialect().drop_table_statements(def);
        match self.run_all(cx, exec, statements).await {
            Outcome::Err(e) if e.is_already_exists() => {
                tracing::debug!(model = %def.name, error = %e, "Table already dropped");
                Outcome::Ok(())
            }
            other => other,
        }
    }

    /// Create the model's table, indexes and row-version maintenance.
    ///
    /// With `overwrite`, an existing table is dropped first.
    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn create_table<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        overwrite: bool,
    ) -> Outcome<(), Error> {
        let def = try_result!(M::definition());
        if overwrite && try_outcome!(self.table_exists::<M, E>(cx, exec).await) {
            try_outcome!(self.drop_from_definition(cx, exec, &def).await);
        }
        self.create_from_definition(cx, exec, &def).await
    }

    /// Create the table unless it exists. Returns whether it was created.
    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn create_table_if_not_exists<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
    ) -> Outcome<bool, Error> {
        if try_outcome!(self.table_exists::<M, E>(cx, exec).await) {
            return Outcome::Ok(false);
        }
        let def = try_result!(M::definition());
        match self.create_from_definition(cx, exec, &def).await {
            Outcome::Ok(()) => Outcome::Ok(true),
            Outcome::Err(e) if e.is_already_exists() => {
                tracing::debug!(model = %def.name, "Table created concurrently");
                Outcome::Ok(false)
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Drop the model's table if it exists.
    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn drop_table<M: Model, E: Executor>(&self, cx: &Cx, exec: &E) -> Outcome<(), Error> {
        if !try_outcome!(self.table_exists::<M, E>(cx, exec).await) {
            return Outcome::Ok(());
        }
        let def = try_result!(M::definition());
        self.drop_from_definition(cx, exec, &def).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn drop_and_create_table<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
    ) -> Outcome<(), Error> {
        try_outcome!(self.drop_table::<M, E>(cx, exec).await);
        let def = try_result!(M::definition());
        self.create_from_definition(cx, exec, &def).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn add_column<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        field: &str,
    ) -> Outcome<(), Error> {
        let def = try_result!(M::definition());
        let field = try_result!(def.require_field(field));
        let sql = try_result!(self.dialect().add_column_statement(&def, field));
        self.run_ddl(cx, exec, sql).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn alter_column<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        field: &str,
    ) -> Outcome<(), Error> {
        let def = try_result!(M::definition());
        let field = try_result!(def.require_field(field));
        let sql = try_result!(self.dialect().alter_column_statement(&def, field));
        self.run_ddl(cx, exec, sql).await
    }

    /// Rename the column `old_name` to the field's current column name.
    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn change_column_name<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        field: &str,
        old_name: &str,
    ) -> Outcome<(), Error> {
        let def = try_result!(M::definition());
        let field = try_result!(def.require_field(field));
        let sql = try_result!(self.dialect().change_column_name_statement(&def, field, old_name));
        self.run_ddl(cx, exec, sql).await
    }

    /// Add a foreign key from a field of `M` to the primary key of `T`.
    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn add_foreign_key<M: Model, T: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        field: &str,
        on_delete: Option<ReferentialAction>,
        on_update: Option<ReferentialAction>,
        name: Option<&str>,
    ) -> Outcome<(), Error> {
        let def = try_result!(M::definition());
        let target = try_result!(T::definition());
        let field = try_result!(def.require_field(field));
        let sql = try_result!(self.dialect().add_foreign_key_statement(
            &def, field, &target, on_delete, on_update, name
        ));
        self.run_ddl(cx, exec, sql).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn drop_foreign_key<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        name: &str,
    ) -> Outcome<(), Error> {
        let def = try_result!(M::definition());
        let sql = try_result!(self.dialect().drop_foreign_key_statement(&def, name));
        self.run_ddl(cx, exec, sql).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn create_index<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        field: &str,
        name: Option<&str>,
        unique: bool,
    ) -> Outcome<(), Error> {
        let def = try_result!(M::definition());
        let field = try_result!(def.require_field(field));
        let sql = self.dialect().create_index_statement(&def, field, name, unique);
        self.run_ddl(cx, exec, sql).await
    }
}
