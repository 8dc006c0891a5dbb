//! Model trait, model definitions and the once-per-type declaration builder.
//!
//! A model declares its shape once through [`Model::describe`], usually
//! generated by `#[derive(Model)]`. The builder records fields in declaration
//! order together with their declared attributes; [`ModelBuilder::build`]
//! then resolves the primary key, the row-version field and the reference
//! fields into a [`ModelDefinition`], which the catalog caches per type.

use crate::catalog::ModelCatalog;
use crate::error::{Error, ModelingErrorKind, Result};
use crate::field::{
    FieldDefinition, FieldSpec, ManySetter, ModelRef, OneSetter, ReferenceTarget, TypedAccessor,
};
use crate::types::{FieldType, TypeInfo, short_type_name};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for types that map to database tables.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct Person {
///     id: i64,
///     name: String,
/// }
///
/// impl Model for Person {
///     fn describe(b: ModelBuilder<Self>) -> ModelBuilder<Self> {
///         b.field_with("Id", |p: &Self| &p.id, |p: &mut Self, v| p.id = v, |f| f.auto_increment())
///             .field("Name", |p: &Self| &p.name, |p: &mut Self, v| p.name = v)
///     }
/// }
/// ```
pub trait Model: Default + Send + Sync + 'static {
    /// Declare the model's fields and table-level attributes.
    fn describe(builder: ModelBuilder<Self>) -> ModelBuilder<Self>;

    /// The cached definition of this model.
    fn definition() -> Result<Arc<ModelDefinition>> {
        ModelCatalog::global().get_or_create::<Self>()
    }
}

/// An index spanning several fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeIndex {
    pub field_names: Vec<String>,
    pub unique: bool,
    /// Explicit index name; derived from the table and fields otherwise.
    pub name: Option<String>,
}

/// A unique constraint spanning several fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub field_names: Vec<String>,
    pub name: Option<String>,
}

/// Resolved metadata for one model type.
#[derive(Clone)]
pub struct ModelDefinition {
    /// Logical name (the type name).
    pub name: String,
    /// Table name override.
    pub alias: Option<String>,
    pub schema: Option<String>,
    pub model_type: TypeId,
    pub type_name: &'static str,
    /// Persisted fields in declaration order.
    pub fields: Vec<FieldDefinition>,
    /// Navigation properties in declaration order; never columns.
    pub reference_fields: Vec<FieldDefinition>,
    pub ignored_fields: Vec<FieldDefinition>,
    pub composite_indexes: Vec<CompositeIndex>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub pre_create_table_sql: Option<String>,
    pub post_create_table_sql: Option<String>,
    pub pre_drop_table_sql: Option<String>,
    pub post_drop_table_sql: Option<String>,
    primary_key_index: usize,
    row_version_index: Option<usize>,
    factory: fn() -> Box<dyn Any + Send>,
}

impl ModelDefinition {
    /// Table name: the alias if one is set, otherwise the logical name.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn primary_key(&self) -> &FieldDefinition {
        &self.fields[self.primary_key_index]
    }

    #[must_use]
    pub fn row_version(&self) -> Option<&FieldDefinition> {
        self.row_version_index.map(|i| &self.fields[i])
    }

    /// Find a persisted field by declared name or column name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| f.column_name().eq_ignore_ascii_case(name))
            })
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    /// Find a persisted field or report an unknown-field modeling error.
    pub fn require_field(&self, name: &str) -> Result<&FieldDefinition> {
        self.field(name).ok_or_else(|| {
            Error::modeling(
                ModelingErrorKind::UnknownField,
                format!("'{}' is not a field of {}", name, self.name),
            )
        })
    }

    #[must_use]
    pub fn reference_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.reference_fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn is_in_schema(&self) -> bool {
        self.schema.is_some()
    }

    /// A new default instance of the model, type-erased.
    #[must_use]
    pub fn new_instance(&self) -> Box<dyn Any + Send> {
        (self.factory)()
    }

    /// Field names of the primary key and every persisted field, in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("schema", &self.schema)
            .field("fields", &self.fields)
            .field("reference_fields", &self.reference_fields)
            .field("ignored_fields", &self.ignored_fields)
            .field("primary_key", &self.primary_key().name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ModelDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.alias == other.alias
            && self.schema == other.schema
            && self.model_type == other.model_type
            && self.fields == other.fields
            && self.reference_fields == other.reference_fields
            && self.ignored_fields == other.ignored_fields
            && self.composite_indexes == other.composite_indexes
            && self.unique_constraints == other.unique_constraints
            && self.pre_create_table_sql == other.pre_create_table_sql
            && self.post_create_table_sql == other.post_create_table_sql
            && self.pre_drop_table_sql == other.pre_drop_table_sql
            && self.post_drop_table_sql == other.post_drop_table_sql
            && self.primary_key_index == other.primary_key_index
            && self.row_version_index == other.row_version_index
    }
}

// ============================================================================
// Builder
// ============================================================================

struct DeclaredField {
    definition: FieldDefinition,
    spec: FieldSpec,
}

/// Collects a model's declared shape.
pub struct ModelBuilder<M> {
    name: String,
    alias: Option<String>,
    schema: Option<String>,
    fields: Vec<DeclaredField>,
    references: Vec<FieldDefinition>,
    ignored: Vec<String>,
    composite_indexes: Vec<CompositeIndex>,
    unique_constraints: Vec<UniqueConstraint>,
    pre_create_table_sql: Option<String>,
    post_create_table_sql: Option<String>,
    pre_drop_table_sql: Option<String>,
    post_drop_table_sql: Option<String>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Default for ModelBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> ModelBuilder<M> {
    /// Start a builder named after the model type.
    pub fn new() -> Self {
        Self {
            name: short_type_name(std::any::type_name::<M>()).to_string(),
            alias: None,
            schema: None,
            fields: Vec::new(),
            references: Vec::new(),
            ignored: Vec::new(),
            composite_indexes: Vec::new(),
            unique_constraints: Vec::new(),
            pre_create_table_sql: None,
            post_create_table_sql: None,
            pre_drop_table_sql: None,
            post_drop_table_sql: None,
            _marker: PhantomData,
        }
    }

    /// Override the logical name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the table name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Declare a field with default attributes.
    pub fn field<T, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        T: FieldType,
        G: Fn(&M) -> &T + Send + Sync + 'static,
        S: Fn(&mut M, T) + Send + Sync + 'static,
    {
        self.field_with(name, get, set, |f| f)
    }

    /// Declare a field and its schema attributes.
    pub fn field_with<T, G, S, F>(mut self, name: &str, get: G, set: S, configure: F) -> Self
    where
        T: FieldType,
        G: Fn(&M) -> &T + Send + Sync + 'static,
        S: Fn(&mut M, T) + Send + Sync + 'static,
        F: FnOnce(FieldSpec) -> FieldSpec,
    {
        let mut definition = FieldDefinition::new(name, T::type_info());
        definition.nullable = T::NULLABLE;
        definition.accessor = Some(Arc::new(TypedAccessor::new(get, set)));
        self.fields.push(DeclaredField {
            definition,
            spec: configure(FieldSpec::default()),
        });
        self
    }

    /// Declare a list-valued reference to child rows of `C`.
    pub fn reference_many<C, S>(mut self, name: &str, set: S) -> Self
    where
        C: Model,
        S: Fn(&mut M, Vec<C>) + Send + Sync + 'static,
    {
        self.references.push(reference_definition(
            name,
            ReferenceTarget {
                target: ModelRef::of::<C>(),
                many: true,
                setter: Arc::new(ManySetter::new(set)),
            },
        ));
        self
    }

    /// Declare a single-valued reference to a row of `C`.
    pub fn reference_one<C, S>(mut self, name: &str, set: S) -> Self
    where
        C: Model,
        S: Fn(&mut M, Option<C>) + Send + Sync + 'static,
    {
        self.references.push(reference_definition(
            name,
            ReferenceTarget {
                target: ModelRef::of::<C>(),
                many: false,
                setter: Arc::new(OneSetter::new(set)),
            },
        ));
        self
    }

    /// Record a declared field that is not persisted.
    pub fn ignore(mut self, name: &str) -> Self {
        self.ignored.push(name.to_string());
        self
    }

    pub fn composite_index(mut self, fields: &[&str], unique: bool) -> Self {
        self.composite_indexes.push(CompositeIndex {
            field_names: fields.iter().map(|f| (*f).to_string()).collect(),
            unique,
            name: None,
        });
        self
    }

    pub fn named_composite_index(mut self, name: &str, fields: &[&str], unique: bool) -> Self {
        self.composite_indexes.push(CompositeIndex {
            field_names: fields.iter().map(|f| (*f).to_string()).collect(),
            unique,
            name: Some(name.to_string()),
        });
        self
    }

    pub fn unique_constraint(mut self, fields: &[&str]) -> Self {
        self.unique_constraints.push(UniqueConstraint {
            field_names: fields.iter().map(|f| (*f).to_string()).collect(),
            name: None,
        });
        self
    }

    pub fn pre_create_table(mut self, sql: impl Into<String>) -> Self {
        self.pre_create_table_sql = Some(sql.into());
        self
    }

    pub fn post_create_table(mut self, sql: impl Into<String>) -> Self {
        self.post_create_table_sql = Some(sql.into());
        self
    }

    pub fn pre_drop_table(mut self, sql: impl Into<String>) -> Self {
        self.pre_drop_table_sql = Some(sql.into());
        self
    }

    pub fn post_drop_table(mut self, sql: impl Into<String>) -> Self {
        self.post_drop_table_sql = Some(sql.into());
        self
    }

    /// Resolve the declared shape into a definition.
    ///
    /// Primary key: an explicitly marked field wins; otherwise a field named
    /// `Id`; otherwise, when no declared field is named `Id`, the first
    /// persisted field.
    pub fn build(self) -> Result<ModelDefinition> {
        let model_name = self.name.clone();
        let invalid = |message: String| {
            Error::modeling(
                ModelingErrorKind::InvalidDefinition,
                format!("{}: {}", model_name, message),
            )
        };

        let has_id_anywhere = self.fields.iter().any(|d| is_id_name(&d.definition.name))
            || self.ignored.iter().any(|n| is_id_name(n));

        let mut fields = Vec::with_capacity(self.fields.len());
        let mut ignored_fields = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for DeclaredField {
            mut definition,
            spec,
        } in self.fields
        {
            if !seen.insert(definition.name.clone()) {
                return Err(invalid(format!("field '{}' is declared twice", definition.name)));
            }
            apply_spec(&mut definition, spec.clone());
            if spec.ignore || self.ignored.iter().any(|n| *n == definition.name) {
                ignored_fields.push(definition);
            } else {
                fields.push(definition);
            }
        }
        for name in &self.ignored {
            if !ignored_fields.iter().any(|f| f.name == *name) {
                ignored_fields.push(FieldDefinition::new(
                    name.clone(),
                    <String as FieldType>::type_info(),
                ));
            }
        }

        if fields.is_empty() {
            return Err(invalid("a model needs at least one persisted field".to_string()));
        }

        let explicit: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_primary_key)
            .map(|(i, _)| i)
            .collect();
        let primary_key_index = match explicit.as_slice() {
            [single] => *single,
            [] => match fields.iter().position(|f| is_id_name(&f.name)) {
                Some(i) => i,
                None if !has_id_anywhere => 0,
                None => {
                    return Err(invalid(
                        "the field named Id is ignored and no other field is marked primary key"
                            .to_string(),
                    ));
                }
            },
            _ => {
                return Err(invalid(
                    "more than one field is marked primary key".to_string(),
                ));
            }
        };
        fields[primary_key_index].is_primary_key = true;
        fields[primary_key_index].nullable = false;

        if let Some(f) = fields.iter().find(|f| f.auto_increment && !f.is_primary_key) {
            return Err(invalid(format!(
                "auto-increment is only legal on the primary key, not on '{}'",
                f.name
            )));
        }

        let candidates: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                is_row_version_name(&f.name)
                    && (f.field_type.is::<u64>() || f.field_type.is::<Vec<u8>>())
            })
            .map(|(i, _)| i)
            .collect();
        let row_version_index = match candidates.as_slice() {
            [] => None,
            [single] => Some(*single),
            [first, second, ..] => {
                return Err(invalid(format!(
                    "both '{}' and '{}' qualify as the row version",
                    fields[*first].name, fields[*second].name
                )));
            }
        };
        if let Some(i) = row_version_index {
            fields[i].is_row_version = true;
        }

        for index in &self.composite_indexes {
            for name in &index.field_names {
                if !fields.iter().any(|f| f.name == *name) {
                    return Err(Error::modeling(
                        ModelingErrorKind::UnknownField,
                        format!("{}: composite index names unknown field '{}'", model_name, name),
                    ));
                }
            }
        }
        for constraint in &self.unique_constraints {
            for name in &constraint.field_names {
                if !fields.iter().any(|f| f.name == *name) {
                    return Err(Error::modeling(
                        ModelingErrorKind::UnknownField,
                        format!(
                            "{}: unique constraint names unknown field '{}'",
                            model_name, name
                        ),
                    ));
                }
            }
        }

        tracing::trace!(
            model = %self.name,
            fields = fields.len(),
            references = self.references.len(),
            primary_key = %fields[primary_key_index].name,
            "Resolved model definition"
        );

        Ok(ModelDefinition {
            name: self.name,
            alias: self.alias,
            schema: self.schema,
            model_type: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            fields,
            reference_fields: self.references,
            ignored_fields,
            composite_indexes: self.composite_indexes,
            unique_constraints: self.unique_constraints,
            pre_create_table_sql: self.pre_create_table_sql,
            post_create_table_sql: self.post_create_table_sql,
            pre_drop_table_sql: self.pre_drop_table_sql,
            post_drop_table_sql: self.post_drop_table_sql,
            primary_key_index,
            row_version_index,
            factory: new_boxed::<M>,
        })
    }
}

fn new_boxed<M: Model>() -> Box<dyn Any + Send> {
    Box::new(M::default())
}

fn reference_definition(name: &str, target: ReferenceTarget) -> FieldDefinition {
    let mut definition = FieldDefinition::new(name, TypeInfo::builtin::<()>(crate::TypeKind::Reference));
    definition.field_type.name = target.target.type_name;
    definition.field_type.id = target.target.type_id;
    definition.nullable = true;
    definition.is_reference = true;
    definition.reference = Some(target);
    definition
}

fn apply_spec(definition: &mut FieldDefinition, spec: FieldSpec) {
    definition.alias = spec.alias;
    definition.is_primary_key = spec.primary_key;
    definition.auto_increment = spec.auto_increment;
    definition.auto_id = spec.auto_id;
    if let Some(nullable) = spec.nullable {
        definition.nullable = nullable;
    }
    definition.is_indexed = spec.index;
    definition.is_unique_index = spec.unique;
    definition.default_value = spec.default_value;
    definition.foreign_key = spec.foreign_key;
    definition.custom_select = spec.custom_select;
    definition.compute_expression = spec.compute;
    definition.custom_field_definition = spec.custom_field_definition;
    definition.field_length = spec.length;
    definition.scale = spec.scale;
    definition.ignore_on_insert = spec.ignore_on_insert;
    definition.ignore_on_update = spec.ignore_on_update;
    if spec.treat_as.is_some() {
        definition.treat_as = spec.treat_as;
    }
}

/// `Id` compared case-insensitively, so a Rust `id` field qualifies.
fn is_id_name(name: &str) -> bool {
    name.eq_ignore_ascii_case("id")
}

fn is_row_version_name(name: &str) -> bool {
    normalize_name(name) == "rowversion"
}

/// Lowercase with underscores removed, for convention-based name matching.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
