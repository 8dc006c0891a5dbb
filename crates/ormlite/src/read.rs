//! Read operations.

use crate::db::Db;
use crate::materialize::rows_to_models;
use crate::references::load_graph;
use asupersync::{Cx, Outcome};
use ormlite_core::{Error, Executor, FieldType, Model, Param, Result, Statement, Value};
use ormlite_query::{DialectProvider, Expr, ExprTranslator, JoinPlan, SelectOptions, StatementBuilder};
use std::any::Any;

/// Convert a standalone database value into `T`.
fn decode<T: FieldType>(dialect: &dyn DialectProvider, value: Value) -> Result<T> {
    let info = T::type_info();
    let source = value.type_name();
    let native = if value.is_null() {
        None
    } else {
        Some(dialect.converters().resolve_type(&info).from_db(&info, value)?)
    };
    T::from_native(native).ok_or_else(|| {
        Error::conversion(source, info.name, "value does not fit the requested type")
    })
}

impl Db {
    async fn select_with<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        statement: &Statement,
    ) -> Outcome<Vec<M>, Error> {
        let def = try_result!(M::definition());
        let rows = try_outcome!(self.fetch(cx, exec, statement).await);
        Outcome::Ok(rows_to_models(
            &def,
            self.dialect(),
            &rows,
            self.config().null_policy,
        ))
    }

    /// Translate a typed predicate into a WHERE fragment and its parameters.
    pub fn where_fragment(&self, predicate: &Expr) -> Result<(String, Vec<Param>)> {
        let mut translator =
            ExprTranslator::new(self.dialect()).upper_in_like(!self.config().strip_upper_in_like);
        let sql = translator.translate(predicate)?;
        Ok((sql, translator.into_params()))
    }

    /// Every row of the model's table.
    #[tracing::instrument(level = "debug", skip(self, cx, exec))]
    pub async fn select_all<M: Model, E: Executor>(&self, cx: &Cx, exec: &E) -> Outcome<Vec<M>, Error> {
        self.select_where(cx, exec, &SelectOptions::default()).await
    }

    /// Rows matching a raw filter fragment, or the rows of a complete SELECT
    /// given as the filter.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, options), fields(filter = %options.filter))]
    pub async fn select_where<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        options: &SelectOptions,
    ) -> Outcome<Vec<M>, Error> {
        let def = try_result!(M::definition());
        let statement = try_result!(self.dialect().select_statement(&def, options));
        self.select_with(cx, exec, &statement).await
    }

    /// Rows matching a typed predicate.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, predicate))]
    pub async fn select_expr<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        predicate: &Expr,
    ) -> Outcome<Vec<M>, Error> {
        let (filter, params) = try_result!(self.where_fragment(predicate));
        let options = SelectOptions {
            filter,
            params,
            ..SelectOptions::default()
        };
        self.select_where(cx, exec, &options).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, exec, id))]
    pub async fn select_by_id<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        id: impl Into<Value>,
    ) -> Outcome<Option<M>, Error> {
        let def = try_result!(M::definition());
        let pk = def.primary_key();
        let param = Param::new(self.dialect().param_name(&pk.name), id.into());
        let options = SelectOptions {
            filter: self.dialect().filter_predicate(pk, &param),
            params: if param.value.is_null() { Vec::new() } else { vec![param] },
            ..SelectOptions::default()
        };
        let rows = try_outcome!(self.select_where::<M, E>(cx, exec, &options).await);
        Outcome::Ok(rows.into_iter().next())
    }

    /// Rows whose primary key is one of `ids`; no statement runs for an
    /// empty list.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, ids), fields(count = ids.len()))]
    pub async fn select_by_ids<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        ids: &[Value],
    ) -> Outcome<Vec<M>, Error> {
        if ids.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let def = try_result!(M::definition());
        let (filter, params) = try_result!(self.dialect().in_predicate(def.primary_key(), ids));
        let options = SelectOptions {
            filter,
            params,
            ..SelectOptions::default()
        };
        self.select_where(cx, exec, &options).await
    }

    /// The first matching row.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, options))]
    pub async fn single<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        options: &SelectOptions,
    ) -> Outcome<Option<M>, Error> {
        let def = try_result!(M::definition());
        let mut options = options.clone();
        if options.limit.is_none() && !ormlite_query::is_full_select(&options.filter) {
            options.limit = Some(1);
        }
        let statement = try_result!(self.dialect().select_statement(&def, &options));
        let rows = try_outcome!(self.select_with::<M, E>(cx, exec, &statement).await);
        Outcome::Ok(rows.into_iter().next())
    }

    /// First column of the first row as `T`; NULL or no row decodes as
    /// `T`'s NULL value.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, statement), fields(sql = %statement.sql))]
    pub async fn scalar<T: FieldType, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        statement: &Statement,
    ) -> Outcome<T, Error> {
        let value = try_outcome!(self.fetch_scalar(cx, exec, statement).await);
        match decode(self.dialect(), value) {
            Ok(v) => Outcome::Ok(v),
            Err(e) => Outcome::Err(e),
        }
    }

    /// First column of every row as `T`.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, statement), fields(sql = %statement.sql))]
    pub async fn column<T: FieldType, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        statement: &Statement,
    ) -> Outcome<Vec<T>, Error> {
        let rows = try_outcome!(self.fetch(cx, exec, statement).await);
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let value = row.into_values().into_iter().next().unwrap_or(Value::Null);
            values.push(try_result!(decode(self.dialect(), value)));
        }
        Outcome::Ok(values)
    }

    /// `SELECT COUNT(*)` with the filter of `options`.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, options))]
    pub async fn count<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        options: &SelectOptions,
    ) -> Outcome<u64, Error> {
        let def = try_result!(M::definition());
        let statement = try_result!(self.dialect().count_statement(&def, options));
        self.scalar::<u64, E>(cx, exec, &statement).await
    }

    pub async fn exists<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        options: &SelectOptions,
    ) -> Outcome<bool, Error> {
        let count = try_outcome!(self.count::<M, E>(cx, exec, options).await);
        Outcome::Ok(count > 0)
    }

    /// Run a join plan and materialize each row as `M`.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, plan))]
    pub async fn select_query<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        plan: &JoinPlan,
    ) -> Outcome<Vec<M>, Error> {
        let statement = if self.config().strip_upper_in_like {
            try_result!(plan.clone().upper_in_like(false).build(self.dialect()))
        } else {
            try_result!(plan.build(self.dialect()))
        };
        self.select_with(cx, exec, &statement).await
    }

    /// [`Db::select_where`] followed by reference loading.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, options))]
    pub async fn load_select<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        options: &SelectOptions,
    ) -> Outcome<Vec<M>, Error> {
        let mut models = try_outcome!(self.select_where::<M, E>(cx, exec, options).await);
        try_outcome!(self.load_references_all(cx, exec, &mut models).await);
        Outcome::Ok(models)
    }

    /// Fill the reference fields of one instance.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, model))]
    pub async fn load_references<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        model: &mut M,
    ) -> Outcome<(), Error> {
        self.load_references_all(cx, exec, std::slice::from_mut(model)).await
    }

    /// Fill the reference fields of every instance with one query per field.
    pub async fn load_references_all<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        models: &mut [M],
    ) -> Outcome<(), Error> {
        let def = try_result!(M::definition());
        let parents: Vec<&mut dyn Any> = models.iter_mut().map(|m| m as &mut dyn Any).collect();
        load_graph(
            self,
            cx,
            exec,
            def,
            parents,
            self.config().load_references_max_depth,
        )
        .await
    }
}
