//! Native field types and their runtime type descriptors.
//!
//! Every model field's declared type implements [`FieldType`]. The trait
//! hands out a [`TypeInfo`] descriptor (identity, name, kind and an optional
//! codec) that the converter registry uses to pick a converter, and moves
//! values in and out of the field through `dyn Any`.
//!
//! Builtin scalars implement the trait here. User types opt in with one of
//! three macros:
//!
//! - [`enum_field!`](crate::enum_field) for enums implementing [`SqlEnum`],
//!   stored by name or by integer value
//! - [`json_field!`](crate::json_field) for complex types stored as JSON text
//! - [`text_field!`](crate::text_field) for small value types stored through
//!   `Display`/`FromStr`

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::fmt;
use std::str::FromStr;

/// Broad classification of a native type, driving converter fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Bool,
    Integer,
    UnsignedInteger,
    Float,
    Char,
    String,
    Bytes,
    /// An enum implementing [`SqlEnum`].
    Enum,
    /// A complex (non-primitive, non-string) type stored as serialized text.
    Reference,
    /// A small value type stored through its text form.
    ValueType,
}

impl TypeKind {
    /// Primitive or string kinds, which are scalar results rather than model rows.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(
            self,
            TypeKind::Bool
                | TypeKind::Integer
                | TypeKind::UnsignedInteger
                | TypeKind::Float
                | TypeKind::Char
                | TypeKind::String
                | TypeKind::Bytes
        )
    }
}

/// Conversion hooks for types the builtin converters cannot know about.
#[derive(Clone, Copy)]
pub struct TypeCodec {
    pub to_text: fn(&dyn Any) -> Result<String, String>,
    pub from_text: fn(&str) -> Result<Box<dyn Any + Send>, String>,
    pub to_int: Option<fn(&dyn Any) -> Option<i64>>,
    pub from_int: Option<fn(i64) -> Option<Box<dyn Any + Send>>>,
}

impl fmt::Debug for TypeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCodec")
            .field("to_int", &self.to_int.is_some())
            .field("from_int", &self.from_int.is_some())
            .finish_non_exhaustive()
    }
}

/// Runtime descriptor of a field's native type.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: &'static str,
    pub kind: TypeKind,
    /// Underlying storage kind, e.g. an enum stored as its integer value.
    pub treat_as: Option<TypeKind>,
    pub codec: Option<TypeCodec>,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.treat_as == other.treat_as
    }
}

impl TypeInfo {
    /// Descriptor for a builtin scalar type.
    pub fn builtin<T: Any>(kind: TypeKind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind,
            treat_as: None,
            codec: None,
        }
    }

    /// Descriptor for an enum, stored by name or (if `as_int`) by integer value.
    pub fn enumeration<T: SqlEnum>(as_int: bool) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind: TypeKind::Enum,
            treat_as: as_int.then_some(TypeKind::Integer),
            codec: Some(TypeCodec {
                to_text: enum_to_text::<T>,
                from_text: enum_from_text::<T>,
                to_int: Some(enum_to_int::<T>),
                from_int: Some(enum_from_int::<T>),
            }),
        }
    }

    /// Descriptor for a complex type serialized as JSON text.
    pub fn json<T: Serialize + DeserializeOwned + Send + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind: TypeKind::Reference,
            treat_as: None,
            codec: Some(TypeCodec {
                to_text: json_to_text::<T>,
                from_text: json_from_text::<T>,
                to_int: None,
                from_int: None,
            }),
        }
    }

    /// Descriptor for a value type stored through `Display`/`FromStr`.
    pub fn text<T>() -> Self
    where
        T: fmt::Display + FromStr + Send + 'static,
        T::Err: fmt::Display,
    {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind: TypeKind::ValueType,
            treat_as: None,
            codec: Some(TypeCodec {
                to_text: display_to_text::<T>,
                from_text: parse_from_text::<T>,
                to_int: None,
                from_int: None,
            }),
        }
    }

    /// Is this the type `T`?
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Short type name without module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

/// Strip the module path from a `std::any::type_name` result.
#[must_use]
pub fn short_type_name(name: &'static str) -> &'static str {
    let base = name.split('<').next().unwrap_or(name);
    match base.rfind("::") {
        Some(pos) => &name[pos + 2..],
        None => name,
    }
}

fn downcast_err<T>(value: &dyn Any) -> Result<&T, String>
where
    T: Any,
{
    value
        .downcast_ref::<T>()
        .ok_or_else(|| format!("expected a {}", std::any::type_name::<T>()))
}

fn enum_to_text<T: SqlEnum>(value: &dyn Any) -> Result<String, String> {
    downcast_err::<T>(value).map(|v| v.to_sql_str().to_string())
}

fn enum_from_text<T: SqlEnum>(text: &str) -> Result<Box<dyn Any + Send>, String> {
    T::from_sql_str(text)
        .map(|v| Box::new(v) as Box<dyn Any + Send>)
        .ok_or_else(|| format!("'{}' is not a {} variant", text, std::any::type_name::<T>()))
}

fn enum_to_int<T: SqlEnum>(value: &dyn Any) -> Option<i64> {
    value.downcast_ref::<T>().and_then(SqlEnum::to_sql_int)
}

fn enum_from_int<T: SqlEnum>(value: i64) -> Option<Box<dyn Any + Send>> {
    T::from_sql_int(value).map(|v| Box::new(v) as Box<dyn Any + Send>)
}

fn json_to_text<T: Serialize + 'static>(value: &dyn Any) -> Result<String, String> {
    let v = downcast_err::<T>(value)?;
    serde_json::to_string(v).map_err(|e| e.to_string())
}

fn json_from_text<T: DeserializeOwned + Send + 'static>(
    text: &str,
) -> Result<Box<dyn Any + Send>, String> {
    serde_json::from_str::<T>(text)
        .map(|v| Box::new(v) as Box<dyn Any + Send>)
        .map_err(|e| e.to_string())
}

fn display_to_text<T: fmt::Display + 'static>(value: &dyn Any) -> Result<String, String> {
    downcast_err::<T>(value).map(ToString::to_string)
}

fn parse_from_text<T>(text: &str) -> Result<Box<dyn Any + Send>, String>
where
    T: FromStr + Send + 'static,
    T::Err: fmt::Display,
{
    text.parse::<T>()
        .map(|v| Box::new(v) as Box<dyn Any + Send>)
        .map_err(|e| e.to_string())
}

/// An enum that can be stored in a column.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, Default, PartialEq)]
/// enum Status { #[default] Active, Archived }
///
/// impl SqlEnum for Status {
///     fn to_sql_str(&self) -> &'static str {
///         match self { Status::Active => "Active", Status::Archived => "Archived" }
///     }
///     fn from_sql_str(s: &str) -> Option<Self> {
///         match s { "Active" => Some(Status::Active), "Archived" => Some(Status::Archived), _ => None }
///     }
/// }
///
/// enum_field!(Status);
/// ```
pub trait SqlEnum: Sized + Send + Sync + 'static {
    /// Variant name as stored in the database.
    fn to_sql_str(&self) -> &'static str;

    /// Parse a stored variant name.
    fn from_sql_str(s: &str) -> Option<Self>;

    /// Underlying integer value, for enums stored as integers.
    fn to_sql_int(&self) -> Option<i64> {
        None
    }

    /// Parse a stored integer value.
    fn from_sql_int(_value: i64) -> Option<Self> {
        None
    }
}

/// A type that can be declared as a model field.
pub trait FieldType: Send + Sync + Sized + 'static {
    /// Whether a database NULL is a legal value of this type.
    const NULLABLE: bool = false;

    /// Descriptor of the stored (non-optional) type.
    fn type_info() -> TypeInfo;

    /// Borrow the native value, `None` for an absent optional value.
    fn as_native(&self) -> Option<&dyn Any>;

    /// Rebuild from a native value; `None` input means database NULL.
    ///
    /// Returns `None` when the value has the wrong type or the type has no
    /// representation for NULL.
    fn from_native(value: Option<Box<dyn Any + Send>>) -> Option<Self>;
}

macro_rules! builtin_field_type {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FieldType for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::builtin::<$ty>(TypeKind::$kind)
                }

                fn as_native(&self) -> Option<&dyn Any> {
                    Some(self)
                }

                fn from_native(value: Option<Box<dyn Any + Send>>) -> Option<Self> {
                    match value {
                        Some(v) => v.downcast::<$ty>().ok().map(|b| *b),
                        None => Some(<$ty>::default()),
                    }
                }
            }
        )*
    };
}

builtin_field_type! {
    bool => Bool,
    i8 => Integer,
    i16 => Integer,
    i32 => Integer,
    i64 => Integer,
    u8 => UnsignedInteger,
    u16 => UnsignedInteger,
    u32 => UnsignedInteger,
    u64 => UnsignedInteger,
    f32 => Float,
    f64 => Float,
    char => Char,
    String => String,
    Vec<u8> => Bytes,
}

impl<T: FieldType> FieldType for Option<T> {
    const NULLABLE: bool = true;

    fn type_info() -> TypeInfo {
        T::type_info()
    }

    fn as_native(&self) -> Option<&dyn Any> {
        self.as_ref().and_then(FieldType::as_native)
    }

    fn from_native(value: Option<Box<dyn Any + Send>>) -> Option<Self> {
        match value {
            None => Some(None),
            Some(v) => T::from_native(Some(v)).map(Some),
        }
    }
}

/// Is `id` one of the builtin scalar types?
#[must_use]
pub fn is_builtin_scalar(id: TypeId) -> bool {
    [
        TypeId::of::<bool>(),
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<f32>(),
        TypeId::of::<f64>(),
        TypeId::of::<char>(),
        TypeId::of::<String>(),
        TypeId::of::<&'static str>(),
        TypeId::of::<Vec<u8>>(),
    ]
    .contains(&id)
}

/// Implement [`FieldType`] for an enum implementing [`SqlEnum`].
///
/// `enum_field!(Status)` stores the variant name; `enum_field!(Status as int)`
/// stores the underlying integer.
#[macro_export]
macro_rules! enum_field {
    (@impl $ty:ty, $as_int:expr) => {
        impl $crate::types::FieldType for $ty {
            fn type_info() -> $crate::types::TypeInfo {
                $crate::types::TypeInfo::enumeration::<$ty>($as_int)
            }

            fn as_native(&self) -> Option<&dyn ::std::any::Any> {
                Some(self)
            }

            fn from_native(
                value: Option<Box<dyn ::std::any::Any + Send>>,
            ) -> Option<Self> {
                value.and_then(|v| v.downcast::<$ty>().ok()).map(|b| *b)
            }
        }
    };
    ($ty:ty as int) => {
        $crate::enum_field!(@impl $ty, true);
    };
    ($ty:ty) => {
        $crate::enum_field!(@impl $ty, false);
    };
}

/// Implement [`FieldType`] for a complex type stored as JSON text.
#[macro_export]
macro_rules! json_field {
    ($ty:ty) => {
        impl $crate::types::FieldType for $ty {
            fn type_info() -> $crate::types::TypeInfo {
                $crate::types::TypeInfo::json::<$ty>()
            }

            fn as_native(&self) -> Option<&dyn ::std::any::Any> {
                Some(self)
            }

            fn from_native(
                value: Option<Box<dyn ::std::any::Any + Send>>,
            ) -> Option<Self> {
                value.and_then(|v| v.downcast::<$ty>().ok()).map(|b| *b)
            }
        }
    };
}

/// Implement [`FieldType`] for a value type stored through `Display`/`FromStr`.
#[macro_export]
macro_rules! text_field {
    ($ty:ty) => {
        impl $crate::types::FieldType for $ty {
            fn type_info() -> $crate::types::TypeInfo {
                $crate::types::TypeInfo::text::<$ty>()
            }

            fn as_native(&self) -> Option<&dyn ::std::any::Any> {
                Some(self)
            }

            fn from_native(
                value: Option<Box<dyn ::std::any::Any + Send>>,
            ) -> Option<Self> {
                value.and_then(|v| v.downcast::<$ty>().ok()).map(|b| *b)
            }
        }
    };
}
