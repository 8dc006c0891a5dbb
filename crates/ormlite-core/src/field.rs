//! Field and foreign-key definitions.

use crate::error::Result;
use crate::model::{Model, ModelDefinition};
use crate::types::{FieldType, TypeInfo, TypeKind};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Referential action for foreign key constraints (ON DELETE / ON UPDATE).
///
/// These define what happens to referencing rows when the referenced row is
/// deleted or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// No action - raise error if any references exist.
    #[default]
    NoAction,
    /// Restrict - same as NO ACTION (alias for compatibility).
    Restrict,
    /// Cascade - automatically delete/update referencing rows.
    Cascade,
    /// Set null - set referencing columns to NULL.
    SetNull,
    /// Set default - set referencing columns to their default values.
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse a referential action from a string (case-insensitive).
    ///
    /// Returns `None` if the string is not a recognized action.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NO ACTION" | "NOACTION" | "NO_ACTION" => Some(ReferentialAction::NoAction),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" | "SET_NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" | "SETDEFAULT" | "SET_DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

/// A lazily resolved pointer to another model's definition.
///
/// Foreign keys and reference fields point at other models without building
/// their definitions up front, so mutually referencing models never recurse.
#[derive(Clone, Copy)]
pub struct ModelRef {
    pub type_id: TypeId,
    pub type_name: &'static str,
    resolve: fn() -> Result<Arc<ModelDefinition>>,
}

impl ModelRef {
    pub fn of<M: Model>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            resolve: M::definition,
        }
    }

    /// Resolve the target definition through the catalog.
    pub fn definition(&self) -> Result<Arc<ModelDefinition>> {
        (self.resolve)()
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelRef").field(&self.type_name).finish()
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

/// A foreign key from one field to another model's primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyConstraint {
    pub target: ModelRef,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    /// Explicit constraint name; derived from table, target and field otherwise.
    pub foreign_key_name: Option<String>,
}

impl ForeignKeyConstraint {
    pub fn to<M: Model>() -> Self {
        Self {
            target: ModelRef::of::<M>(),
            on_delete: None,
            on_update: None,
            foreign_key_name: None,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.foreign_key_name = Some(name.into());
        self
    }

    /// Constraint name, `FK_{table}_{target table}_{field}` unless overridden.
    #[must_use]
    pub fn constraint_name(&self, table: &str, target_table: &str, field: &str) -> String {
        self.foreign_key_name
            .clone()
            .unwrap_or_else(|| format!("FK_{}_{}_{}", table, target_table, field))
    }
}

// ============================================================================
// Accessors
// ============================================================================

/// Type-erased get/set access to one field of a model instance.
pub trait FieldAccessor: Send + Sync {
    /// Borrow the field's native value; `None` when it holds no value.
    fn get<'a>(&self, model: &'a dyn Any) -> Option<&'a dyn Any>;

    /// Store a native value (`None` for database NULL).
    ///
    /// Returns false if the model or value has the wrong type.
    fn set(&self, model: &mut dyn Any, value: Option<Box<dyn Any + Send>>) -> bool;
}

pub(crate) struct TypedAccessor<M, T, G, S> {
    get: G,
    set: S,
    _marker: PhantomData<fn(M, T)>,
}

impl<M, T, G, S> TypedAccessor<M, T, G, S>
where
    M: 'static,
    T: FieldType,
    G: Fn(&M) -> &T + Send + Sync,
    S: Fn(&mut M, T) + Send + Sync,
{
    pub(crate) fn new(get: G, set: S) -> Self {
        Self {
            get,
            set,
            _marker: PhantomData,
        }
    }
}

impl<M, T, G, S> FieldAccessor for TypedAccessor<M, T, G, S>
where
    M: 'static,
    T: FieldType,
    G: Fn(&M) -> &T + Send + Sync,
    S: Fn(&mut M, T) + Send + Sync,
{
    fn get<'a>(&self, model: &'a dyn Any) -> Option<&'a dyn Any> {
        let model = model.downcast_ref::<M>()?;
        (self.get)(model).as_native()
    }

    fn set(&self, model: &mut dyn Any, value: Option<Box<dyn Any + Send>>) -> bool {
        let Some(model) = model.downcast_mut::<M>() else {
            return false;
        };
        match T::from_native(value) {
            Some(v) => {
                (self.set)(model, v);
                true
            }
            None => false,
        }
    }
}

/// Assigns loaded child instances to a reference field.
pub trait ReferenceSetter: Send + Sync {
    fn assign(&self, model: &mut dyn Any, children: Vec<Box<dyn Any + Send>>) -> bool;
}

pub(crate) struct ManySetter<M, C, S> {
    set: S,
    _marker: PhantomData<fn(M, C)>,
}

impl<M, C, S> ManySetter<M, C, S>
where
    S: Fn(&mut M, Vec<C>) + Send + Sync,
{
    pub(crate) fn new(set: S) -> Self {
        Self {
            set,
            _marker: PhantomData,
        }
    }
}

impl<M, C, S> ReferenceSetter for ManySetter<M, C, S>
where
    M: 'static,
    C: 'static,
    S: Fn(&mut M, Vec<C>) + Send + Sync,
{
    fn assign(&self, model: &mut dyn Any, children: Vec<Box<dyn Any + Send>>) -> bool {
        let Some(model) = model.downcast_mut::<M>() else {
            return false;
        };
        let typed: Option<Vec<C>> = children
            .into_iter()
            .map(|c| c.downcast::<C>().ok().map(|b| *b))
            .collect();
        match typed {
            Some(list) => {
                (self.set)(model, list);
                true
            }
            None => false,
        }
    }
}

pub(crate) struct OneSetter<M, C, S> {
    set: S,
    _marker: PhantomData<fn(M, C)>,
}

impl<M, C, S> OneSetter<M, C, S>
where
    S: Fn(&mut M, Option<C>) + Send + Sync,
{
    pub(crate) fn new(set: S) -> Self {
        Self {
            set,
            _marker: PhantomData,
        }
    }
}

impl<M, C, S> ReferenceSetter for OneSetter<M, C, S>
where
    M: 'static,
    C: 'static,
    S: Fn(&mut M, Option<C>) + Send + Sync,
{
    fn assign(&self, model: &mut dyn Any, children: Vec<Box<dyn Any + Send>>) -> bool {
        let Some(model) = model.downcast_mut::<M>() else {
            return false;
        };
        let first = match children.into_iter().next() {
            Some(child) => match child.downcast::<C>() {
                Ok(c) => Some(*c),
                Err(_) => return false,
            },
            None => None,
        };
        (self.set)(model, first);
        true
    }
}

/// Navigation target of a reference field.
#[derive(Clone)]
pub struct ReferenceTarget {
    pub target: ModelRef,
    /// List-valued (`Vec<C>`) rather than scalar (`Option<C>`).
    pub many: bool,
    pub(crate) setter: Arc<dyn ReferenceSetter>,
}

impl ReferenceTarget {
    /// Assign loaded children to the reference field of `model`.
    pub fn assign(&self, model: &mut dyn Any, children: Vec<Box<dyn Any + Send>>) -> bool {
        self.setter.assign(model, children)
    }
}

impl fmt::Debug for ReferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceTarget")
            .field("target", &self.target)
            .field("many", &self.many)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Field definitions
// ============================================================================

/// Resolved metadata about one model field.
#[derive(Clone)]
pub struct FieldDefinition {
    /// Declared field name.
    pub name: String,
    /// Column name override.
    pub alias: Option<String>,
    pub field_type: TypeInfo,
    /// Storage type override, e.g. an enum stored as its integer value.
    pub treat_as: Option<TypeKind>,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub auto_increment: bool,
    /// Key value generated by the database default.
    pub auto_id: bool,
    pub is_indexed: bool,
    pub is_unique_index: bool,
    /// Column default as SQL text.
    pub default_value: Option<String>,
    pub foreign_key: Option<ForeignKeyConstraint>,
    /// Navigation property; never assigned a column.
    pub is_reference: bool,
    pub reference: Option<ReferenceTarget>,
    /// SQL expression selected in place of the column.
    pub custom_select: Option<String>,
    /// Computed column expression.
    pub compute_expression: Option<String>,
    /// Full column type override used in DDL.
    pub custom_field_definition: Option<String>,
    pub field_length: Option<u32>,
    pub scale: Option<u32>,
    pub ignore_on_insert: bool,
    pub ignore_on_update: bool,
    pub is_row_version: bool,
    pub(crate) accessor: Option<Arc<dyn FieldAccessor>>,
}

impl FieldDefinition {
    /// A field definition without accessors, for runtime-described shapes.
    pub fn new(name: impl Into<String>, field_type: TypeInfo) -> Self {
        Self {
            name: name.into(),
            alias: None,
            field_type,
            treat_as: field_type.treat_as,
            nullable: false,
            is_primary_key: false,
            auto_increment: false,
            auto_id: false,
            is_indexed: false,
            is_unique_index: false,
            default_value: None,
            foreign_key: None,
            is_reference: false,
            reference: None,
            custom_select: None,
            compute_expression: None,
            custom_field_definition: None,
            field_length: None,
            scale: None,
            ignore_on_insert: false,
            ignore_on_update: false,
            is_row_version: false,
            accessor: None,
        }
    }

    /// Column name: the alias if one is set, otherwise the field name.
    #[must_use]
    pub fn column_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.compute_expression.is_some() || self.custom_select.is_some()
    }

    /// Excluded from INSERT column lists unless explicitly requested.
    #[must_use]
    pub fn should_skip_insert(&self) -> bool {
        self.ignore_on_insert || self.auto_increment || self.is_computed() || self.is_row_version
    }

    /// Excluded from UPDATE SET lists.
    #[must_use]
    pub fn should_skip_update(&self) -> bool {
        self.ignore_on_update || self.is_computed() || self.is_row_version
    }

    /// Borrow this field's native value from a model instance.
    pub fn get_value<'a>(&self, model: &'a dyn Any) -> Option<&'a dyn Any> {
        self.accessor.as_ref().and_then(|a| a.get(model))
    }

    /// Store a native value (`None` for NULL) into a model instance.
    pub fn set_value(&self, model: &mut dyn Any, value: Option<Box<dyn Any + Send>>) -> bool {
        self.accessor.as_ref().is_some_and(|a| a.set(model, value))
    }

    /// Type this field's values are stored as.
    #[must_use]
    pub fn storage_kind(&self) -> TypeKind {
        self.treat_as.unwrap_or(self.field_type.kind)
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("field_type", &self.field_type.name)
            .field("nullable", &self.nullable)
            .field("is_primary_key", &self.is_primary_key)
            .field("auto_increment", &self.auto_increment)
            .field("is_reference", &self.is_reference)
            .field("is_row_version", &self.is_row_version)
            .finish_non_exhaustive()
    }
}

impl PartialEq for FieldDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.alias == other.alias
            && self.field_type == other.field_type
            && self.treat_as == other.treat_as
            && self.nullable == other.nullable
            && self.is_primary_key == other.is_primary_key
            && self.auto_increment == other.auto_increment
            && self.auto_id == other.auto_id
            && self.is_indexed == other.is_indexed
            && self.is_unique_index == other.is_unique_index
            && self.default_value == other.default_value
            && self.foreign_key == other.foreign_key
            && self.is_reference == other.is_reference
            && self.custom_select == other.custom_select
            && self.compute_expression == other.compute_expression
            && self.custom_field_definition == other.custom_field_definition
            && self.field_length == other.field_length
            && self.scale == other.scale
            && self.ignore_on_insert == other.ignore_on_insert
            && self.ignore_on_update == other.ignore_on_update
            && self.is_row_version == other.is_row_version
    }
}

// ============================================================================
// Declared attributes
// ============================================================================

/// The declared schema attributes of one field, as written on the model.
///
/// # Example
///
/// ```ignore
/// builder.field_with("customer_id", |o: &Order| &o.customer_id, |o, v| o.customer_id = v, |f| {
///     f.references::<Customer>().on_delete(ReferentialAction::Cascade).index()
/// })
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
    pub(crate) alias: Option<String>,
    pub(crate) primary_key: bool,
    pub(crate) auto_increment: bool,
    pub(crate) auto_id: bool,
    pub(crate) nullable: Option<bool>,
    pub(crate) index: bool,
    pub(crate) unique: bool,
    pub(crate) default_value: Option<String>,
    pub(crate) foreign_key: Option<ForeignKeyConstraint>,
    pub(crate) custom_select: Option<String>,
    pub(crate) compute: Option<String>,
    pub(crate) custom_field_definition: Option<String>,
    pub(crate) length: Option<u32>,
    pub(crate) scale: Option<u32>,
    pub(crate) ignore: bool,
    pub(crate) ignore_on_insert: bool,
    pub(crate) ignore_on_update: bool,
    pub(crate) treat_as: Option<TypeKind>,
}

impl FieldSpec {
    /// Override the column name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Database-generated integer key. Only legal on the primary key.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Database-generated non-integer key.
    pub fn auto_id(mut self) -> Self {
        self.auto_id = true;
        self
    }

    /// Override nullability inferred from the field type.
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = Some(value);
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.index = true;
        self.unique = true;
        self
    }

    /// Column default as SQL text.
    pub fn default_value(mut self, sql: impl Into<String>) -> Self {
        self.default_value = Some(sql.into());
        self
    }

    /// Foreign key to another model's primary key.
    pub fn references<M: Model>(mut self) -> Self {
        self.foreign_key = Some(ForeignKeyConstraint::to::<M>());
        self
    }

    /// Replace the whole foreign key constraint.
    pub fn foreign_key(mut self, fk: ForeignKeyConstraint) -> Self {
        self.foreign_key = Some(fk);
        self
    }

    /// ON DELETE action of the foreign key declared with [`FieldSpec::references`].
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.foreign_key = self.foreign_key.map(|fk| fk.on_delete(action));
        self
    }

    /// ON UPDATE action of the foreign key declared with [`FieldSpec::references`].
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.foreign_key = self.foreign_key.map(|fk| fk.on_update(action));
        self
    }

    /// Explicit name of the foreign key declared with [`FieldSpec::references`].
    pub fn fk_name(mut self, name: impl Into<String>) -> Self {
        self.foreign_key = self.foreign_key.map(|fk| fk.named(name));
        self
    }

    /// Select this SQL expression instead of the column; skipped on writes.
    pub fn custom_select(mut self, sql: impl Into<String>) -> Self {
        self.custom_select = Some(sql.into());
        self
    }

    /// Computed column expression; skipped on writes.
    pub fn compute(mut self, sql: impl Into<String>) -> Self {
        self.compute = Some(sql.into());
        self
    }

    /// Full DDL column type, replacing the converter's definition.
    pub fn custom_field_definition(mut self, sql: impl Into<String>) -> Self {
        self.custom_field_definition = Some(sql.into());
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Keep the field off the persisted column list.
    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn ignore_on_insert(mut self) -> Self {
        self.ignore_on_insert = true;
        self
    }

    pub fn ignore_on_update(mut self) -> Self {
        self.ignore_on_update = true;
        self
    }

    /// Store the value as its underlying integer.
    pub fn treat_as_int(mut self) -> Self {
        self.treat_as = Some(TypeKind::Integer);
        self
    }
}
