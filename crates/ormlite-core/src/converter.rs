//! Bidirectional converters between native field values and database values.
//!
//! Each dialect owns a [`ConverterRegistry`]. Resolution for a field is a
//! fixed priority chain: the row-version converter for a row-version field,
//! then an exact registration for the declared type, then the enum
//! converter for enums, then the reference-type converter for complex
//! types, and finally the value-type converter.

use crate::catalog::CowMap;
use crate::error::{ConversionError, Error, Result};
use crate::field::FieldDefinition;
use crate::types::{TypeInfo, TypeKind};
use crate::value::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Converts one native type to and from its database representation.
///
/// Converters are pure: they never see database NULL, which the registry
/// handles before dispatch.
pub trait Converter: Send + Sync + fmt::Debug {
    /// DDL column type for a field using this converter.
    fn column_definition(&self, field: &FieldDefinition) -> String;

    /// Convert a native value into a database value.
    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value>;

    /// Convert a non-null database value into a native value.
    fn from_db(&self, field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>>;
}

fn mismatch(source: &str, target: &str, message: impl Into<String>) -> Error {
    Error::conversion(source, target, message)
}

fn downcast<'a, T: Any>(field_type: &TypeInfo, value: &'a dyn Any) -> Result<&'a T> {
    value.downcast_ref::<T>().ok_or_else(|| {
        mismatch(
            field_type.name,
            std::any::type_name::<T>(),
            "native value does not have the declared field type",
        )
    })
}

fn boxed<T: Any + Send>(value: T) -> Box<dyn Any + Send> {
    Box::new(value)
}

// ============================================================================
// Builtin converters
// ============================================================================

/// Converter for `bool`, stored natively or as 0/1.
#[derive(Debug, Clone)]
pub struct BoolConverter {
    definition: String,
    as_int: bool,
}

impl BoolConverter {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            as_int: false,
        }
    }

    /// Store as integer 0/1 instead of a boolean literal.
    pub fn as_int(mut self) -> Self {
        self.as_int = true;
        self
    }
}

impl Converter for BoolConverter {
    fn column_definition(&self, _field: &FieldDefinition) -> String {
        self.definition.clone()
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        let v = *downcast::<bool>(field_type, value)?;
        Ok(if self.as_int {
            Value::Int(i32::from(v))
        } else {
            Value::Bool(v)
        })
    }

    fn from_db(&self, _field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        value
            .as_bool()
            .map(boxed)
            .ok_or_else(|| mismatch(value.type_name(), "bool", format!("{} is not a boolean", value)))
    }
}

/// Which integer variant an integer converter writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWire {
    Int,
    BigInt,
}

/// Converter for the signed and unsigned integer types.
pub struct IntegerConverter<T> {
    definition: String,
    wire: IntWire,
    _marker: PhantomData<fn() -> T>,
}

impl<T> IntegerConverter<T> {
    pub fn new(definition: impl Into<String>, wire: IntWire) -> Self {
        Self {
            definition: definition.into(),
            wire,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for IntegerConverter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegerConverter")
            .field("type", &std::any::type_name::<T>())
            .field("definition", &self.definition)
            .finish()
    }
}

impl<T> Converter for IntegerConverter<T>
where
    T: Copy + Any + Send + TryInto<i64> + TryFrom<i64>,
{
    fn column_definition(&self, _field: &FieldDefinition) -> String {
        self.definition.clone()
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        let v = *downcast::<T>(field_type, value)?;
        let wide: i64 = v.try_into().map_err(|_| {
            mismatch(
                std::any::type_name::<T>(),
                "BigInt",
                "value exceeds the signed 64-bit range",
            )
        })?;
        match self.wire {
            IntWire::Int => i32::try_from(wide).map(Value::Int).map_err(|_| {
                mismatch(std::any::type_name::<T>(), "Int", "value exceeds the 32-bit range")
            }),
            IntWire::BigInt => Ok(Value::BigInt(wide)),
        }
    }

    fn from_db(&self, _field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        let target = std::any::type_name::<T>();
        let wide = value
            .as_i64()
            .ok_or_else(|| mismatch(value.type_name(), target, format!("{} is not an integer", value)))?;
        T::try_from(wide)
            .map(boxed)
            .map_err(|_| mismatch(value.type_name(), target, format!("{} is out of range", wide)))
    }
}

/// Converter for `f32` and `f64`.
pub struct FloatConverter<T> {
    definition: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FloatConverter<T> {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for FloatConverter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FloatConverter")
            .field("type", &std::any::type_name::<T>())
            .field("definition", &self.definition)
            .finish()
    }
}

/// Floating point types the [`FloatConverter`] can handle.
pub trait FloatType: Copy + Any + Send {
    fn to_value(self) -> Value;
    fn from_f64(v: f64) -> Self;
}

impl FloatType for f32 {
    fn to_value(self) -> Value {
        Value::Float(self)
    }

    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl FloatType for f64 {
    fn to_value(self) -> Value {
        Value::Double(self)
    }

    fn from_f64(v: f64) -> Self {
        v
    }
}

impl<T: FloatType> Converter for FloatConverter<T> {
    fn column_definition(&self, field: &FieldDefinition) -> String {
        match (field.field_length, field.scale) {
            (Some(precision), Some(scale)) => format!("DECIMAL({},{})", precision, scale),
            _ => self.definition.clone(),
        }
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        Ok(downcast::<T>(field_type, value)?.to_value())
    }

    fn from_db(&self, _field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        match value {
            Value::Float(v) => Ok(boxed(T::from_f64(f64::from(v)))),
            other => other.as_f64().map(|v| boxed(T::from_f64(v))).ok_or_else(|| {
                mismatch(
                    other.type_name(),
                    std::any::type_name::<T>(),
                    format!("{} is not a number", other),
                )
            }),
        }
    }
}

/// Converter for `String`, with a length-aware column definition.
#[derive(Debug, Clone)]
pub struct StringConverter {
    /// Format for a bounded column; `{}` is replaced by the length.
    length_format: String,
    default_length: Option<u32>,
    /// Column type when no length applies.
    max_definition: String,
}

impl StringConverter {
    pub fn new(
        length_format: impl Into<String>,
        default_length: Option<u32>,
        max_definition: impl Into<String>,
    ) -> Self {
        Self {
            length_format: length_format.into(),
            default_length,
            max_definition: max_definition.into(),
        }
    }
}

impl Converter for StringConverter {
    fn column_definition(&self, field: &FieldDefinition) -> String {
        match field.field_length.or(self.default_length) {
            Some(length) if length < u32::MAX => self.length_format.replace("{}", &length.to_string()),
            _ => self.max_definition.clone(),
        }
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        Ok(Value::Text(downcast::<String>(field_type, value)?.clone()))
    }

    fn from_db(&self, _field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        let text = match value {
            Value::Text(s) | Value::Decimal(s) => s,
            Value::Json(j) => j.to_string(),
            Value::Bytes(b) => String::from_utf8(b)
                .map_err(|e| mismatch("Bytes", "String", e.to_string()))?,
            Value::Array(_) => {
                return Err(mismatch("Array", "String", "arrays cannot be read as text"));
            }
            other => other.to_string(),
        };
        Ok(boxed(text))
    }
}

/// Converter for `char`.
#[derive(Debug, Clone)]
pub struct CharConverter {
    definition: String,
}

impl CharConverter {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }
}

impl Converter for CharConverter {
    fn column_definition(&self, _field: &FieldDefinition) -> String {
        self.definition.clone()
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        Ok(Value::Text(downcast::<char>(field_type, value)?.to_string()))
    }

    fn from_db(&self, _field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        let text = value.as_str().unwrap_or_default();
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(boxed(c)),
            _ => Err(mismatch(
                value.type_name(),
                "char",
                format!("{} is not a single character", value),
            )),
        }
    }
}

/// Converter for `Vec<u8>`.
#[derive(Debug, Clone)]
pub struct BytesConverter {
    definition: String,
}

impl BytesConverter {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }
}

impl Converter for BytesConverter {
    fn column_definition(&self, _field: &FieldDefinition) -> String {
        self.definition.clone()
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        Ok(Value::Bytes(downcast::<Vec<u8>>(field_type, value)?.clone()))
    }

    fn from_db(&self, _field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        match value {
            Value::Bytes(b) => Ok(boxed(b)),
            Value::Uuid(u) => Ok(boxed(u.to_vec())),
            Value::Text(s) => Ok(boxed(s.into_bytes())),
            other => Err(mismatch(other.type_name(), "Vec<u8>", "not a byte sequence")),
        }
    }
}

// ============================================================================
// Fallback converters
// ============================================================================

/// Enum converter, storing the variant name or its integer value.
#[derive(Debug, Clone)]
pub struct EnumConverter {
    text_definition: String,
    int_definition: String,
}

impl EnumConverter {
    pub fn new(text_definition: impl Into<String>, int_definition: impl Into<String>) -> Self {
        Self {
            text_definition: text_definition.into(),
            int_definition: int_definition.into(),
        }
    }
}

impl Converter for EnumConverter {
    fn column_definition(&self, field: &FieldDefinition) -> String {
        if field.storage_kind() == TypeKind::Integer {
            self.int_definition.clone()
        } else {
            self.text_definition.clone()
        }
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        let codec = field_type
            .codec
            .ok_or_else(|| mismatch(field_type.name, "enum", "type has no enum codec"))?;
        if field_type.treat_as == Some(TypeKind::Integer) {
            let to_int = codec
                .to_int
                .ok_or_else(|| mismatch(field_type.name, "BigInt", "enum has no integer form"))?;
            return to_int(value).map(Value::BigInt).ok_or_else(|| {
                mismatch(field_type.name, "BigInt", "enum variant has no integer value")
            });
        }
        (codec.to_text)(value)
            .map(Value::Text)
            .map_err(|e| mismatch(field_type.name, "Text", e))
    }

    fn from_db(&self, field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        let codec = field_type
            .codec
            .ok_or_else(|| mismatch(value.type_name(), field_type.name, "type has no enum codec"))?;
        if let Value::Text(text) = &value {
            if let Ok(v) = (codec.from_text)(text) {
                return Ok(v);
            }
        }
        if let (Some(n), Some(from_int)) = (value.as_i64(), codec.from_int) {
            if let Some(v) = from_int(n) {
                return Ok(v);
            }
        }
        Err(mismatch(
            value.type_name(),
            field_type.name,
            format!("{} is not a variant", value),
        ))
    }
}

/// Codec-driven text converter, used for complex reference types (JSON)
/// and for value types (`Display`/`FromStr`).
#[derive(Debug, Clone)]
pub struct TextCodecConverter {
    definition: String,
}

impl TextCodecConverter {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }
}

impl Converter for TextCodecConverter {
    fn column_definition(&self, _field: &FieldDefinition) -> String {
        self.definition.clone()
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        let codec = field_type.codec.ok_or_else(|| {
            mismatch(field_type.name, "Text", "no converter is registered for this type")
        })?;
        (codec.to_text)(value)
            .map(Value::Text)
            .map_err(|e| mismatch(field_type.name, "Text", e))
    }

    fn from_db(&self, field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        let codec = field_type.codec.ok_or_else(|| {
            mismatch(value.type_name(), field_type.name, "no converter is registered for this type")
        })?;
        let source = value.type_name();
        let text = match value {
            Value::Text(s) | Value::Decimal(s) => s,
            Value::Json(j) => j.to_string(),
            other => other.to_string(),
        };
        (codec.from_text)(&text).map_err(|e| mismatch(source, field_type.name, e))
    }
}

/// Row-version converter for `u64` or `Vec<u8>` fields.
#[derive(Debug, Clone)]
pub struct RowVersionConverter {
    definition: String,
}

impl RowVersionConverter {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }
}

impl Converter for RowVersionConverter {
    fn column_definition(&self, _field: &FieldDefinition) -> String {
        self.definition.clone()
    }

    fn to_db(&self, field_type: &TypeInfo, value: &dyn Any) -> Result<Value> {
        if let Some(v) = value.downcast_ref::<u64>() {
            return Ok(Value::BigInt(*v as i64));
        }
        if let Some(bytes) = value.downcast_ref::<Vec<u8>>() {
            return Ok(Value::Bytes(bytes.clone()));
        }
        Err(mismatch(field_type.name, "row version", "expected u64 or Vec<u8>"))
    }

    fn from_db(&self, field_type: &TypeInfo, value: Value) -> Result<Box<dyn Any + Send>> {
        let as_bytes = field_type.is::<Vec<u8>>();
        match value {
            Value::Bytes(b) if as_bytes => Ok(boxed(b)),
            Value::Bytes(b) => {
                if b.len() > 8 {
                    return Err(mismatch("Bytes", "u64", "row version longer than 8 bytes"));
                }
                let mut buf = [0u8; 8];
                buf[8 - b.len()..].copy_from_slice(&b);
                Ok(boxed(u64::from_be_bytes(buf)))
            }
            other => {
                let n = other.as_i64().ok_or_else(|| {
                    mismatch(other.type_name(), field_type.name, "row version is not numeric")
                })? as u64;
                if as_bytes {
                    Ok(boxed(n.to_be_bytes().to_vec()))
                } else {
                    Ok(boxed(n))
                }
            }
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Per-dialect converter registry.
///
/// Lookups never block behind registrations: the type map is a
/// copy-on-write snapshot.
#[derive(Debug)]
pub struct ConverterRegistry {
    converters: CowMap<TypeId, Arc<dyn Converter>>,
    enum_converter: Arc<dyn Converter>,
    reference_converter: Arc<dyn Converter>,
    value_type_converter: Arc<dyn Converter>,
    row_version_converter: Arc<dyn Converter>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConverterRegistry {
    /// A registry with fallback converters but no exact registrations.
    pub fn empty() -> Self {
        Self {
            converters: CowMap::new(),
            enum_converter: Arc::new(EnumConverter::new("VARCHAR(255)", "INTEGER")),
            reference_converter: Arc::new(TextCodecConverter::new("TEXT")),
            value_type_converter: Arc::new(TextCodecConverter::new("VARCHAR(255)")),
            row_version_converter: Arc::new(RowVersionConverter::new("BIGINT")),
        }
    }

    /// A registry with ANSI-flavoured converters for every builtin type.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register::<bool>(BoolConverter::new("BOOLEAN"));
        registry.register::<i8>(IntegerConverter::<i8>::new("SMALLINT", IntWire::Int));
        registry.register::<i16>(IntegerConverter::<i16>::new("SMALLINT", IntWire::Int));
        registry.register::<i32>(IntegerConverter::<i32>::new("INTEGER", IntWire::Int));
        registry.register::<i64>(IntegerConverter::<i64>::new("BIGINT", IntWire::BigInt));
        registry.register::<u8>(IntegerConverter::<u8>::new("SMALLINT", IntWire::Int));
        registry.register::<u16>(IntegerConverter::<u16>::new("INTEGER", IntWire::Int));
        registry.register::<u32>(IntegerConverter::<u32>::new("BIGINT", IntWire::BigInt));
        registry.register::<u64>(IntegerConverter::<u64>::new("BIGINT", IntWire::BigInt));
        registry.register::<f32>(FloatConverter::<f32>::new("REAL"));
        registry.register::<f64>(FloatConverter::<f64>::new("DOUBLE PRECISION"));
        registry.register::<char>(CharConverter::new("CHAR(1)"));
        registry.register::<String>(StringConverter::new("VARCHAR({})", Some(8000), "TEXT"));
        registry.register::<Vec<u8>>(BytesConverter::new("BLOB"));
        registry
    }

    /// Register (or replace) the converter for `T`.
    pub fn register<T: Any>(&self, converter: impl Converter + 'static) {
        self.register_for(TypeId::of::<T>(), Arc::new(converter));
    }

    pub fn register_for(&self, type_id: TypeId, converter: Arc<dyn Converter>) {
        self.converters.insert(type_id, converter);
    }

    pub fn set_enum_converter(&mut self, converter: impl Converter + 'static) {
        self.enum_converter = Arc::new(converter);
    }

    pub fn set_reference_converter(&mut self, converter: impl Converter + 'static) {
        self.reference_converter = Arc::new(converter);
    }

    pub fn set_value_type_converter(&mut self, converter: impl Converter + 'static) {
        self.value_type_converter = Arc::new(converter);
    }

    pub fn set_row_version_converter(&mut self, converter: impl Converter + 'static) {
        self.row_version_converter = Arc::new(converter);
    }

    /// Exact registration only.
    pub fn resolve(&self, type_id: TypeId) -> Option<Arc<dyn Converter>> {
        self.converters.get(&type_id)
    }

    /// Best converter for a type: exact, then enum, reference and value-type
    /// fallbacks.
    pub fn resolve_type(&self, info: &TypeInfo) -> Arc<dyn Converter> {
        if let Some(exact) = self.resolve(info.id) {
            return exact;
        }
        match info.kind {
            TypeKind::Enum => Arc::clone(&self.enum_converter),
            TypeKind::Reference => Arc::clone(&self.reference_converter),
            _ => Arc::clone(&self.value_type_converter),
        }
    }

    /// Best converter for a field; a row-version field always gets the
    /// row-version converter.
    pub fn resolve_best(&self, field: &FieldDefinition) -> Arc<dyn Converter> {
        if field.is_row_version {
            return Arc::clone(&self.row_version_converter);
        }
        self.resolve_type(&field.field_type)
    }

    /// Convert a field's native value; `None` becomes database NULL.
    pub fn to_db_value(&self, field: &FieldDefinition, value: Option<&dyn Any>) -> Result<Value> {
        let Some(value) = value else {
            return Ok(Value::Null);
        };
        let converter = self.resolve_best(field);
        converter.to_db(&storage_type(field), value).map_err(|e| {
            log_conversion_failure(field, field.field_type.name, "database value", &e);
            attach_field(e, field)
        })
    }

    /// Convert a database value for a field; NULL becomes `None` without
    /// reaching the converter.
    pub fn from_db_value(
        &self,
        field: &FieldDefinition,
        value: Value,
    ) -> Result<Option<Box<dyn Any + Send>>> {
        let converter = self.resolve_best(field);
        self.from_db_value_with(converter.as_ref(), field, value)
    }

    /// [`ConverterRegistry::from_db_value`] with a converter the caller
    /// already resolved for `field`.
    pub fn from_db_value_with(
        &self,
        converter: &dyn Converter,
        field: &FieldDefinition,
        value: Value,
    ) -> Result<Option<Box<dyn Any + Send>>> {
        if value.is_null() {
            return Ok(None);
        }
        let source = value.type_name();
        converter
            .from_db(&storage_type(field), value)
            .map(Some)
            .map_err(|e| {
                log_conversion_failure(field, source, field.field_type.name, &e);
                attach_field(e, field)
            })
    }

    /// Convert a standalone native value of a known type (expression constants).
    pub fn to_db_value_of(&self, info: &TypeInfo, value: &dyn Any) -> Result<Value> {
        self.resolve_type(info).to_db(info, value).map_err(|e| {
            tracing::error!(
                source_type = info.name,
                target_type = "database value",
                error = %e,
                "Converter failed"
            );
            e
        })
    }

    /// DDL column type for a field.
    pub fn column_definition(&self, field: &FieldDefinition) -> String {
        if let Some(custom) = &field.custom_field_definition {
            return custom.clone();
        }
        self.resolve_best(field).column_definition(field)
    }
}

/// The field's type descriptor with the field-level storage override applied.
fn storage_type(field: &FieldDefinition) -> TypeInfo {
    TypeInfo {
        treat_as: field.treat_as.or(field.field_type.treat_as),
        ..field.field_type
    }
}

fn log_conversion_failure(field: &FieldDefinition, source: &str, target: &str, err: &Error) {
    tracing::error!(
        field = %field.name,
        source_type = source,
        target_type = target,
        error = %err,
        "Converter failed"
    );
}

fn attach_field(err: Error, field: &FieldDefinition) -> Error {
    match err {
        Error::Conversion(c) if c.field.is_none() => Error::Conversion(ConversionError {
            field: Some(field.name.clone()),
            ..c
        }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldType, SqlEnum};
    use serde::{Deserialize, Serialize};

    fn field_of<T: FieldType>(name: &str) -> FieldDefinition {
        let mut f = FieldDefinition::new(name, T::type_info());
        f.nullable = T::NULLABLE;
        f
    }

    fn round_trip<T: FieldType + Clone + PartialEq + fmt::Debug>(registry: &ConverterRegistry, v: T) {
        let field = field_of::<T>("F");
        let db = registry
            .to_db_value(&field, v.as_native())
            .expect("to db");
        let back = registry.from_db_value(&field, db).expect("from db");
        assert_eq!(T::from_native(back), Some(v));
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Level {
        Low,
        High,
    }

    impl SqlEnum for Level {
        fn to_sql_str(&self) -> &'static str {
            match self {
                Level::Low => "Low",
                Level::High => "High",
            }
        }

        fn from_sql_str(s: &str) -> Option<Self> {
            match s {
                "Low" => Some(Level::Low),
                "High" => Some(Level::High),
                _ => None,
            }
        }

        fn to_sql_int(&self) -> Option<i64> {
            Some(match self {
                Level::Low => 1,
                Level::High => 5,
            })
        }

        fn from_sql_int(value: i64) -> Option<Self> {
            match value {
                1 => Some(Level::Low),
                5 => Some(Level::High),
                _ => None,
            }
        }
    }

    crate::enum_field!(Level);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Ranked(Level);

    impl SqlEnum for Ranked {
        fn to_sql_str(&self) -> &'static str {
            self.0.to_sql_str()
        }

        fn from_sql_str(s: &str) -> Option<Self> {
            Level::from_sql_str(s).map(Ranked)
        }

        fn to_sql_int(&self) -> Option<i64> {
            self.0.to_sql_int()
        }

        fn from_sql_int(value: i64) -> Option<Self> {
            Level::from_sql_int(value).map(Ranked)
        }
    }

    crate::enum_field!(Ranked as int);

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Address {
        street: String,
        zip: u32,
    }

    crate::json_field!(Address);

    #[derive(Debug, Clone, PartialEq)]
    struct Cents(i64);

    impl fmt::Display for Cents {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}c", self.0)
        }
    }

    impl std::str::FromStr for Cents {
        type Err = String;

        fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
            s.trim_end_matches('c')
                .parse()
                .map(Cents)
                .map_err(|e: std::num::ParseIntError| e.to_string())
        }
    }

    crate::text_field!(Cents);

    #[test]
    fn test_builtin_round_trips() {
        let registry = ConverterRegistry::with_defaults();
        round_trip(&registry, true);
        round_trip(&registry, -5i8);
        round_trip(&registry, 300i16);
        round_trip(&registry, i32::MIN);
        round_trip(&registry, i64::MAX);
        round_trip(&registry, 200u8);
        round_trip(&registry, u32::MAX);
        round_trip(&registry, 1.5f32);
        round_trip(&registry, -2.25f64);
        round_trip(&registry, 'x');
        round_trip(&registry, "hello".to_string());
        round_trip(&registry, vec![1u8, 2, 3]);
        round_trip(&registry, Some(3i32));
    }

    #[test]
    fn test_fallback_round_trips() {
        let registry = ConverterRegistry::with_defaults();
        round_trip(&registry, Level::High);
        round_trip(&registry, Ranked(Level::Low));
        round_trip(
            &registry,
            Address {
                street: "Main".into(),
                zip: 12345,
            },
        );
        round_trip(&registry, Cents(250));
    }

    #[test]
    fn test_enum_storage_forms() {
        let registry = ConverterRegistry::with_defaults();
        let by_name = field_of::<Level>("L");
        assert_eq!(
            registry.to_db_value(&by_name, Some(&Level::High)).expect("to db"),
            Value::Text("High".into())
        );
        let by_int = field_of::<Ranked>("R");
        assert_eq!(
            registry
                .to_db_value(&by_int, Some(&Ranked(Level::High)))
                .expect("to db"),
            Value::BigInt(5)
        );
        assert_eq!(registry.column_definition(&by_int), "INTEGER");
        assert_eq!(registry.column_definition(&by_name), "VARCHAR(255)");
    }

    #[test]
    fn test_null_never_reaches_converter() {
        let registry = ConverterRegistry::with_defaults();
        let field = field_of::<Option<i32>>("N");
        assert_eq!(registry.to_db_value(&field, None).expect("to db"), Value::Null);
        assert!(registry.from_db_value(&field, Value::Null).expect("from db").is_none());
    }

    #[test]
    fn test_conversion_failure_is_reported_with_field() {
        let registry = ConverterRegistry::with_defaults();
        let field = field_of::<i8>("Small");
        let err = registry
            .from_db_value(&field, Value::BigInt(1000))
            .expect_err("overflow");
        match err {
            Error::Conversion(c) => {
                assert_eq!(c.field.as_deref(), Some("Small"));
                assert_eq!(c.target_type, "i8");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_u64_beyond_i64_is_rejected() {
        let registry = ConverterRegistry::with_defaults();
        let field = field_of::<u64>("Big");
        assert!(registry.to_db_value(&field, Some(&u64::MAX)).is_err());
    }

    #[test]
    fn test_resolution_priority() {
        let registry = ConverterRegistry::with_defaults();
        let mut rv = field_of::<u64>("RowVersion");
        assert_eq!(registry.column_definition(&rv), "BIGINT");
        rv.is_row_version = true;
        let converter = registry.resolve_best(&rv);
        assert!(format!("{:?}", converter).starts_with("RowVersionConverter"));

        registry.register::<Level>(TextCodecConverter::new("LEVEL_TYPE"));
        assert_eq!(registry.column_definition(&field_of::<Level>("L")), "LEVEL_TYPE");
        assert!(registry.resolve(TypeId::of::<Address>()).is_none());
        assert_eq!(registry.column_definition(&field_of::<Address>("A")), "TEXT");
    }

    #[test]
    fn test_row_version_bytes_and_numbers() {
        let registry = ConverterRegistry::with_defaults();
        let mut rv = field_of::<u64>("RowVersion");
        rv.is_row_version = true;
        let back = registry
            .from_db_value(&rv, Value::Bytes(vec![0, 0, 0, 0, 0, 0, 0x01, 0x02]))
            .expect("from db");
        assert_eq!(u64::from_native(back), Some(258));
        let db = registry.to_db_value(&rv, Some(&7u64)).expect("to db");
        assert_eq!(db, Value::BigInt(7));

        let mut raw = field_of::<Vec<u8>>("RowVersion");
        raw.is_row_version = true;
        let back = registry.from_db_value(&raw, Value::BigInt(1)).expect("from db");
        assert_eq!(<Vec<u8>>::from_native(back), Some(vec![0, 0, 0, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn test_string_column_definition_uses_length() {
        let registry = ConverterRegistry::with_defaults();
        let mut name = field_of::<String>("Name");
        assert_eq!(registry.column_definition(&name), "VARCHAR(8000)");
        name.field_length = Some(50);
        assert_eq!(registry.column_definition(&name), "VARCHAR(50)");
        name.custom_field_definition = Some("CITEXT".into());
        assert_eq!(registry.column_definition(&name), "CITEXT");
    }
}
