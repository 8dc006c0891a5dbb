//! Write operations.
//!
//! Single-instance writes run directly on the given executor. Batches run
//! inside a transaction they open themselves unless the connection already
//! has one (or a results filter answers every statement).

use crate::concurrency::ConcurrencyGuard;
use crate::db::{Db, finish_batch};
use asupersync::{Cx, Outcome};
use ormlite_core::{
    Connection, Error, Executor, FieldDefinition, Model, ModelDefinition, ModelingErrorKind,
    Param, Statement, Value,
};
use ormlite_query::{GuardedStatement, SelectOptions, StatementBuilder};

/// A key that has not been assigned yet: NULL, zero or an empty string.
fn is_unassigned(key: &Value) -> bool {
    key.is_null() || key.as_i64() == Some(0) || key.as_str() == Some("")
}

impl Db {
    async fn execute_insert<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        def: &ModelDefinition,
        model: &mut M,
        statement: Statement,
        select_identity: bool,
    ) -> Outcome<Option<i64>, Error> {
        let identity = if !select_identity {
            try_outcome!(self.run(cx, exec, &statement).await);
            None
        } else if self.dialect().insert_returning_clause(def).is_some() {
            Some(try_outcome!(self.fetch_identity(cx, exec, &statement).await))
        } else {
            try_outcome!(self.run(cx, exec, &statement).await);
            let sql = try_result!(self.dialect().identity_sql());
            Some(try_outcome!(self.fetch_identity(cx, exec, &Statement::new(sql)).await))
        };

        if let Some(id) = identity {
            let pk = def.primary_key();
            if pk.auto_increment {
                let native = try_result!(self.dialect().converters().from_db_value(pk, Value::BigInt(id)));
                if !pk.set_value(model, native) {
                    tracing::warn!(model = %def.name, id, "Generated key did not fit the primary key");
                }
            }
        }
        if def.row_version().is_some() && (identity.is_some() || !def.primary_key().auto_increment) {
            try_outcome!(
                ConcurrencyGuard::new(self.dialect(), def)
                    .refresh(self, cx, exec, model)
                    .await
            );
        }
        tracing::debug!(model = %def.name, identity = ?identity, "Inserted row");
        Outcome::Ok(identity)
    }

    /// Insert one instance.
    ///
    /// With `select_identity`, the generated key is returned and written back
    /// to an auto-increment primary key.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, model))]
    pub async fn insert<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        model: &mut M,
        select_identity: bool,
    ) -> Outcome<Option<i64>, Error> {
        let def = try_result!(M::definition());
        let statement = try_result!(self.dialect().insert_statement(&def, &*model, None, select_identity));
        self.execute_insert(cx, exec, &def, model, statement, select_identity)
            .await
    }

    /// Insert only the named fields of one instance.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, model))]
    pub async fn insert_only<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        model: &mut M,
        fields: &[&str],
        select_identity: bool,
    ) -> Outcome<Option<i64>, Error> {
        let def = try_result!(M::definition());
        let statement = try_result!(self.dialect().insert_statement(
            &def,
            &*model,
            Some(fields),
            select_identity
        ));
        self.execute_insert(cx, exec, &def, model, statement, select_identity)
            .await
    }

    async fn insert_each<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        models: &mut [M],
    ) -> Outcome<u64, Error> {
        let def = try_result!(M::definition());
        let select_identity = def.primary_key().auto_increment;
        for model in models.iter_mut() {
            let statement = try_result!(self.dialect().insert_statement(
                &def,
                &*model,
                None,
                select_identity
            ));
            try_outcome!(
                self.execute_insert(cx, exec, &def, model, statement, select_identity)
                    .await
            );
        }
        Outcome::Ok(models.len() as u64)
    }

    /// Insert every instance in one transaction, writing back generated keys.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, models), fields(count = models.len()))]
    pub async fn insert_all<M: Model, C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        models: &mut [M],
    ) -> Outcome<u64, Error> {
        if !self.needs_batch_transaction(conn) {
            return self.insert_each(cx, conn, models).await;
        }
        let tx = try_outcome!(conn.begin(cx).await);
        let outcome = self.insert_each(cx, &tx, models).await;
        finish_batch(cx, tx, outcome).await
    }

    async fn execute_update<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        def: &ModelDefinition,
        model: &mut M,
        guarded: GuardedStatement,
    ) -> Outcome<u64, Error> {
        let guard = ConcurrencyGuard::new(self.dialect(), def);
        let affected = try_outcome!(self.run(cx, exec, &guarded.statement).await);
        let key = try_result!(guard.key_of(&*model));
        try_result!(guard.check(guarded.row_version_guarded, affected, Some(&key)));
        if affected > 0 {
            try_outcome!(guard.refresh(self, cx, exec, model).await);
        }
        Outcome::Ok(affected)
    }

    /// Update every updatable field of one instance, guarded by its row
    /// version when the model has one.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, model))]
    pub async fn update<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        model: &mut M,
    ) -> Outcome<u64, Error> {
        let def = try_result!(M::definition());
        let guarded = try_result!(self.dialect().update_statement(&def, &*model, None));
        self.execute_update(cx, exec, &def, model, guarded).await
    }

    /// Update only the named fields, filtered on the primary key alone.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, model))]
    pub async fn update_only<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        model: &mut M,
        fields: &[&str],
    ) -> Outcome<u64, Error> {
        let def = try_result!(M::definition());
        let guarded = try_result!(self.dialect().update_statement(&def, &*model, Some(fields)));
        self.execute_update(cx, exec, &def, model, guarded).await
    }

    async fn update_each<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        models: &mut [M],
    ) -> Outcome<u64, Error> {
        let mut total = 0;
        for model in models.iter_mut() {
            total += try_outcome!(self.update(cx, exec, model).await);
        }
        Outcome::Ok(total)
    }

    #[tracing::instrument(level = "debug", skip(self, cx, conn, models), fields(count = models.len()))]
    pub async fn update_all<M: Model, C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        models: &mut [M],
    ) -> Outcome<u64, Error> {
        if !self.needs_batch_transaction(conn) {
            return self.update_each(cx, conn, models).await;
        }
        let tx = try_outcome!(conn.begin(cx).await);
        let outcome = self.update_each(cx, &tx, models).await;
        finish_batch(cx, tx, outcome).await
    }

    /// Insert the instance when its key is unassigned or its row is absent,
    /// otherwise update it. Returns whether a row was inserted.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, model))]
    pub async fn save<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        model: &mut M,
    ) -> Outcome<bool, Error> {
        let def = try_result!(M::definition());
        let pk = def.primary_key();
        let key = try_result!(ConcurrencyGuard::new(self.dialect(), &def).key_of(&*model));
        let exists = if is_unassigned(&key) {
            false
        } else {
            let param = Param::new(self.dialect().param_name(&pk.name), key);
            let options = SelectOptions {
                filter: self.dialect().filter_predicate(pk, &param),
                params: vec![param],
                ..SelectOptions::default()
            };
            try_outcome!(self.exists::<M, E>(cx, exec, &options).await)
        };
        if exists {
            try_outcome!(self.update(cx, exec, model).await);
            Outcome::Ok(false)
        } else {
            try_outcome!(self.insert(cx, exec, model, pk.auto_increment).await);
            Outcome::Ok(true)
        }
    }

    async fn save_each<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        models: &mut [M],
    ) -> Outcome<u64, Error> {
        let mut inserted = 0;
        for model in models.iter_mut() {
            if try_outcome!(self.save(cx, exec, model).await) {
                inserted += 1;
            }
        }
        Outcome::Ok(inserted)
    }

    /// Save every instance in one transaction. Returns the number inserted.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, models), fields(count = models.len()))]
    pub async fn save_all<M: Model, C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        models: &mut [M],
    ) -> Outcome<u64, Error> {
        if !self.needs_batch_transaction(conn) {
            return self.save_each(cx, conn, models).await;
        }
        let tx = try_outcome!(conn.begin(cx).await);
        let outcome = self.save_each(cx, &tx, models).await;
        finish_batch(cx, tx, outcome).await
    }

    async fn execute_delete<E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        def: &ModelDefinition,
        guarded: GuardedStatement,
        key: Option<&Value>,
    ) -> Outcome<u64, Error> {
        let affected = try_outcome!(self.run(cx, exec, &guarded.statement).await);
        try_result!(
            ConcurrencyGuard::new(self.dialect(), def).check(
                guarded.row_version_guarded,
                affected,
                key
            )
        );
        Outcome::Ok(affected)
    }

    /// Delete the row of one instance, matched on its primary key and, when
    /// the model has one, its row version.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, model))]
    pub async fn delete<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        model: &M,
    ) -> Outcome<u64, Error> {
        let def = try_result!(M::definition());
        let mut filters: Vec<&str> = vec![def.primary_key().name.as_str()];
        if let Some(row_version) = def.row_version() {
            filters.push(row_version.name.as_str());
        }
        let guarded = try_result!(self.dialect().delete_instance_statement(&def, model, Some(filters.as_slice())));
        let key = try_result!(ConcurrencyGuard::new(self.dialect(), &def).key_of(model));
        self.execute_delete(cx, exec, &def, guarded, Some(&key)).await
    }

    /// Delete rows equal to the instance on the named fields, or on every
    /// persisted field when `fields` is `None`.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, model))]
    pub async fn delete_matching<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        model: &M,
        fields: Option<&[&str]>,
    ) -> Outcome<u64, Error> {
        let def = try_result!(M::definition());
        let guarded = try_result!(self.dialect().delete_instance_statement(&def, model, fields));
        self.execute_delete(cx, exec, &def, guarded, None).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, exec, id))]
    pub async fn delete_by_id<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        id: impl Into<Value>,
    ) -> Outcome<u64, Error> {
        let def = try_result!(M::definition());
        let id = id.into();
        let guarded = try_result!(self.dialect().delete_statement(&def, &[(def.primary_key(), id.clone())]));
        self.execute_delete(cx, exec, &def, guarded, Some(&id)).await
    }

    /// Delete one row only if its row version still equals `version`.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, id, version))]
    pub async fn delete_by_id_with_version<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        id: impl Into<Value>,
        version: impl Into<Value>,
    ) -> Outcome<u64, Error> {
        let def = try_result!(M::definition());
        let Some(row_version) = def.row_version() else {
            return Outcome::Err(Error::modeling(
                ModelingErrorKind::InvalidDefinition,
                format!("{} has no row version", def.name),
            ));
        };
        let id = id.into();
        let filters: [(&FieldDefinition, Value); 2] = [
            (def.primary_key(), id.clone()),
            (row_version, version.into()),
        ];
        let guarded = try_result!(self.dialect().delete_statement(&def, &filters));
        self.execute_delete(cx, exec, &def, guarded, Some(&id)).await
    }

    /// Delete the rows with the given primary keys; nothing runs for an
    /// empty list.
    #[tracing::instrument(level = "debug", skip(self, cx, exec, ids), fields(count = ids.len()))]
    pub async fn delete_by_ids<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        ids: &[Value],
    ) -> Outcome<u64, Error> {
        if ids.is_empty() {
            return Outcome::Ok(0);
        }
        let def = try_result!(M::definition());
        let statement = try_result!(self.dialect().delete_by_ids_statement(&def, ids));
        self.run(cx, exec, &statement).await
    }

    async fn delete_each<M: Model, E: Executor>(
        &self,
        cx: &Cx,
        exec: &E,
        models: &[M],
    ) -> Outcome<u64, Error> {
        let mut total = 0;
        for model in models {
            total += try_outcome!(self.delete(cx, exec, model).await);
        }
        Outcome::Ok(total)
    }

    /// Delete the rows of every instance in one transaction.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, models), fields(count = models.len()))]
    pub async fn delete_all<M: Model, C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        models: &[M],
    ) -> Outcome<u64, Error> {
        if !self.needs_batch_transaction(conn) {
            return self.delete_each(cx, conn, models).await;
        }
        let tx = try_outcome!(conn.begin(cx).await);
        let outcome = self.delete_each(cx, &tx, models).await;
        finish_batch(cx, tx, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_keys() {
        assert!(is_unassigned(&Value::Null));
        assert!(is_unassigned(&Value::BigInt(0)));
        assert!(is_unassigned(&Value::Text(String::new())));
        assert!(!is_unassigned(&Value::Int(5)));
        assert!(!is_unassigned(&Value::Text("k-1".into())));
    }
}
