//! Reference-field loading.
//!
//! Reference fields are filled one field at a time, with one batched query
//! per field and level: every parent key goes into a single `IN (...)`
//! filter and the children are grouped back onto their parents.
//!
//! Which field carries the foreign key is decided by [`foreign_key_to`]: a
//! field whose foreign-key constraint targets the other model wins, then a
//! field named `<Other>Id`.

use crate::db::Db;
use crate::materialize::rows_to_boxed;
use asupersync::{Cx, Outcome};
use ormlite_core::{
    Error, Executor, FieldDefinition, ModelDefinition, ModelingErrorKind, Result, Value,
    ValueKey, normalize_name,
};
use ormlite_query::{SelectOptions, StatementBuilder};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The field of `owner` holding a foreign key to `target`.
pub fn foreign_key_to<'d>(
    owner: &'d ModelDefinition,
    target: &ModelDefinition,
) -> Option<&'d FieldDefinition> {
    owner
        .fields
        .iter()
        .find(|f| {
            f.foreign_key
                .as_ref()
                .is_some_and(|fk| fk.target.type_id == target.model_type)
        })
        .or_else(|| {
            let conventional = normalize_name(&format!("{}Id", target.name));
            owner
                .fields
                .iter()
                .find(|f| !f.is_primary_key && normalize_name(&f.name) == conventional)
        })
}

fn missing_reference(def: &ModelDefinition, field: &FieldDefinition, target: &ModelDefinition) -> Error {
    Error::modeling(
        ModelingErrorKind::MissingReference,
        format!(
            "cannot find reference property for {}.{}: neither {} nor {} has a foreign key to the other",
            def.name, field.name, def.name, target.name
        ),
    )
}

/// How one reference field joins parents to children.
enum Link<'d> {
    /// Children carry the parent's primary key in this field.
    ChildKey(&'d FieldDefinition),
    /// The parent carries the child's primary key in this field.
    ParentKey(&'d FieldDefinition),
}

fn resolve_link<'d>(
    def: &'d ModelDefinition,
    field: &FieldDefinition,
    child_def: &'d ModelDefinition,
    many: bool,
) -> Result<Link<'d>> {
    if !many {
        if let Some(fk) = foreign_key_to(def, child_def) {
            return Ok(Link::ParentKey(fk));
        }
    }
    foreign_key_to(child_def, def)
        .map(Link::ChildKey)
        .ok_or_else(|| missing_reference(def, field, child_def))
}

fn key_value(db: &Db, field: &FieldDefinition, instance: &dyn Any) -> Result<Value> {
    db.dialect()
        .converters()
        .to_db_value(field, field.get_value(instance))
}

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Outcome<(), Error>> + 'a>>;

/// Fill every reference field of `parents`, following `depth` levels.
pub(crate) fn load_graph<'a, E: Executor>(
    db: &'a Db,
    cx: &'a Cx,
    exec: &'a E,
    def: Arc<ModelDefinition>,
    parents: Vec<&'a mut dyn Any>,
    depth: usize,
) -> LoadFuture<'a> {
    Box::pin(async move {
        let mut parents = parents;
        if depth == 0 || parents.is_empty() {
            return Outcome::Ok(());
        }
        for field in &def.reference_fields {
            let Some(reference) = field.reference.as_ref() else {
                continue;
            };
            let child_def = try_result!(reference.target.definition());
            let link = try_result!(resolve_link(&def, field, &child_def, reference.many));
            let (parent_field, child_field) = match link {
                Link::ChildKey(fk) => (def.primary_key(), fk),
                Link::ParentKey(fk) => (fk, child_def.primary_key()),
            };

            let mut parent_keys = Vec::with_capacity(parents.len());
            for parent in &parents {
                parent_keys.push(try_result!(key_value(db, parent_field, &**parent)));
            }
            let mut distinct: Vec<Value> = Vec::new();
            let mut seen = HashSet::new();
            for key in &parent_keys {
                if !key.is_null() && seen.insert(key.key()) {
                    distinct.push(key.clone());
                }
            }

            let mut matched: Vec<Vec<Box<dyn Any + Send>>> =
                parent_keys.iter().map(|_| Vec::new()).collect();
            if !distinct.is_empty() {
                let (predicate, params) =
                    try_result!(db.dialect().in_predicate(child_field, &distinct));
                let options = SelectOptions {
                    filter: predicate,
                    params,
                    ..SelectOptions::default()
                };
                let statement = try_result!(db.dialect().select_statement(&child_def, &options));
                tracing::debug!(
                    model = %def.name,
                    field = %field.name,
                    keys = distinct.len(),
                    "Loading references"
                );
                let rows = try_outcome!(db.fetch(cx, exec, &statement).await);
                let policy = db.config().null_policy;
                let mut slots: Vec<Option<Box<dyn Any + Send>>> =
                    rows_to_boxed(&child_def, db.dialect(), &rows, policy)
                        .into_iter()
                        .map(Some)
                        .collect();

                let mut by_key: HashMap<ValueKey, Vec<usize>> = HashMap::new();
                for (i, child) in slots.iter().enumerate() {
                    if let Some(child) = child {
                        let key = try_result!(key_value(db, child_field, child.as_ref()));
                        by_key.entry(key.key()).or_default().push(i);
                    }
                }

                // A child shared by several parents is materialized once per parent.
                for (slot, key) in matched.iter_mut().zip(&parent_keys) {
                    let Some(indices) = by_key.get(&key.key()) else {
                        continue;
                    };
                    for &i in indices {
                        let child = slots[i].take().or_else(|| {
                            let row = std::slice::from_ref(&rows[i]);
                            rows_to_boxed(&child_def, db.dialect(), row, policy)
                                .into_iter()
                                .next()
                        });
                        slot.extend(child);
                    }
                }

                if depth > 1 {
                    let nested: Vec<&mut dyn Any> = matched
                        .iter_mut()
                        .flat_map(|children| children.iter_mut())
                        .map(|c| -> &mut dyn Any { c.as_mut() })
                        .collect();
                    try_outcome!(
                        load_graph(db, cx, exec, Arc::clone(&child_def), nested, depth - 1).await
                    );
                }
            }

            for (parent, children) in parents.iter_mut().zip(matched) {
                if !reference.assign(&mut **parent, children) {
                    tracing::warn!(
                        model = %def.name,
                        field = %field.name,
                        "Loaded references did not fit the field"
                    );
                }
            }
        }
        Outcome::Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlite_core::{Model, ModelBuilder};

    #[derive(Debug, Default)]
    #[allow(dead_code)]
    struct Author {
        id: i64,
        books: Vec<Book>,
    }

    #[derive(Debug, Default)]
    struct Book {
        id: i64,
        author_id: i64,
        editor: i64,
    }

    #[derive(Debug, Default)]
    struct Shelf {
        id: i64,
    }

    impl Model for Author {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |a: &Self| &a.id, |a: &mut Self, v| a.id = v)
                .reference_many::<Book, _>("Books", |a: &mut Self, v| a.books = v)
        }
    }

    impl Model for Book {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |x: &Self| &x.id, |x: &mut Self, v| x.id = v)
                .field("AuthorId", |x: &Self| &x.author_id, |x: &mut Self, v| x.author_id = v)
                .field_with(
                    "Editor",
                    |x: &Self| &x.editor,
                    |x: &mut Self, v| x.editor = v,
                    |f| f.references::<Shelf>(),
                )
        }
    }

    impl Model for Shelf {
        fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
            b.field("Id", |s: &Self| &s.id, |s: &mut Self, v| s.id = v)
        }
    }

    #[test]
    fn test_conventional_foreign_key() {
        let book = Book::definition().expect("book");
        let author = Author::definition().expect("author");
        assert_eq!(
            foreign_key_to(&book, &author).map(|f| f.name.as_str()),
            Some("AuthorId")
        );
    }

    #[test]
    fn test_explicit_constraint_wins() {
        let book = Book::definition().expect("book");
        let shelf = Shelf::definition().expect("shelf");
        assert_eq!(
            foreign_key_to(&book, &shelf).map(|f| f.name.as_str()),
            Some("Editor")
        );
    }

    #[test]
    fn test_missing_link_is_a_modeling_error() {
        let author = Author::definition().expect("author");
        let shelf = Shelf::definition().expect("shelf");
        let field = author.reference_field("Books").expect("books");
        let err = match resolve_link(&author, field, &shelf, true) {
            Ok(_) => panic!("expected a missing reference"),
            Err(e) => e,
        };
        assert_eq!(err.modeling_kind(), Some(ModelingErrorKind::MissingReference));
        assert!(err.to_string().contains("cannot find reference property"));
    }
}
