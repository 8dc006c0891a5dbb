//! Error types for OrmLite operations.
//!
//! Every failure surfaces as a distinct variant so callers can branch on a
//! concurrency conflict, a modeling mistake, a conversion failure or a
//! driver-reported failure without string matching.

use std::fmt;

/// The primary error type for all OrmLite operations.
#[derive(Debug)]
pub enum Error {
    /// A developer mistake in model declaration or query construction.
    Modeling(ModelingError),
    /// A converter failed on a specific value.
    Conversion(ConversionError),
    /// A row-version guarded write affected zero rows.
    Concurrency(ConcurrencyError),
    /// The dialect has no known syntax for the requested operation.
    NotImplemented(NotImplementedError),
    /// Query execution failure reported by the driver.
    Query(QueryError),
    /// Connection-level failure reported by the driver.
    Connection(ConnectionError),
    /// Custom error with message.
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelingErrorKind {
    /// An expression node shape the query builder does not accept.
    InvalidExpression,
    /// A reference field whose foreign key cannot be resolved.
    MissingReference,
    /// An aggregate selection combined with other selected columns.
    AggregateWithColumns,
    /// A join where neither side is already part of the query.
    NotAssociated,
    /// A model declaration that violates a metadata rule.
    InvalidDefinition,
    /// A field name that does not exist on the model.
    UnknownField,
    /// A model without a resolvable primary key value.
    MissingPrimaryKey,
}

#[derive(Debug)]
pub struct ModelingError {
    pub kind: ModelingErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub struct ConversionError {
    /// Type name of the value being converted.
    pub source_type: String,
    /// Type name the value was being converted into.
    pub target_type: String,
    /// Field the conversion was performed for, when known.
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug)]
pub struct ConcurrencyError {
    /// Table the guarded statement targeted.
    pub table: String,
    /// Rendered primary key of the row, when known.
    pub key: Option<String>,
}

#[derive(Debug)]
pub struct NotImplementedError {
    /// Dialect name.
    pub provider: &'static str,
    /// The operation the dialect cannot express.
    pub operation: &'static str,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// SQL state code reported by the driver, when available.
    pub sqlstate: Option<String>,
    /// The statement that failed.
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Syntax,
    Constraint,
    NotFound,
    Permission,
    Timeout,
    Cancelled,
    Database,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection was closed unexpectedly
    Disconnected,
    /// Transaction could not be opened or finished
    Transaction,
}

impl Error {
    /// Shorthand for a modeling error.
    pub fn modeling(kind: ModelingErrorKind, message: impl Into<String>) -> Self {
        Error::Modeling(ModelingError {
            kind,
            message: message.into(),
        })
    }

    /// Shorthand for a conversion error.
    pub fn conversion(
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Conversion(ConversionError {
            source_type: source_type.into(),
            target_type: target_type.into(),
            field: None,
            message: message.into(),
        })
    }

    /// Shorthand for an unsupported dialect operation.
    pub fn not_implemented(provider: &'static str, operation: &'static str) -> Self {
        Error::NotImplemented(NotImplementedError {
            provider,
            operation,
        })
    }

    /// Shorthand for a driver query failure.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            message: message.into(),
            sqlstate: None,
            sql: None,
            source: None,
        })
    }

    /// Is this an optimistic concurrency conflict?
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Error::Concurrency(_))
    }

    /// Is this a developer-facing modeling mistake?
    pub fn is_modeling(&self) -> bool {
        matches!(self, Error::Modeling(_) | Error::NotImplemented(_))
    }

    /// The modeling error kind, if this is a modeling error.
    pub fn modeling_kind(&self) -> Option<ModelingErrorKind> {
        match self {
            Error::Modeling(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Does the driver message describe an object that already exists or is
    /// already gone?
    ///
    /// Idempotent create/drop treats these as expected races.
    pub fn is_already_exists(&self) -> bool {
        let message = match self {
            Error::Query(e) => &e.message,
            _ => return false,
        };
        let lower = message.to_ascii_lowercase();
        lower.contains("already exists")
            || lower.contains("there is already an object")
            || lower.contains("does not exist")
            || lower.contains("no such table")
            || lower.contains("unknown table")
    }

    /// Get SQL state code if available.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }
}

impl ConversionError {
    /// Attach the field name the conversion was performed for.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Modeling(e) => write!(f, "Modeling error: {}", e.message),
            Error::Conversion(e) => {
                write!(
                    f,
                    "Conversion error: cannot convert {} to {}",
                    e.source_type, e.target_type
                )?;
                if let Some(field) = &e.field {
                    write!(f, " for field '{}'", field)?;
                }
                write!(f, ": {}", e.message)
            }
            Error::Concurrency(e) => {
                write!(
                    f,
                    "Optimistic concurrency check failed: row in '{}'",
                    e.table
                )?;
                if let Some(key) = &e.key {
                    write!(f, " with key {}", key)?;
                }
                write!(f, " was modified or deleted")
            }
            Error::NotImplemented(e) => write!(
                f,
                "{} is not implemented for the {} provider",
                e.operation, e.provider
            ),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        Error::Conversion(err)
    }
}

impl From<ModelingError> for Error {
    fn from(err: ModelingError) -> Self {
        Error::Modeling(err)
    }
}

/// Result type alias for OrmLite operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_is_distinct_from_modeling() {
        let err = Error::Concurrency(ConcurrencyError {
            table: "Person".to_string(),
            key: Some("1".to_string()),
        });
        assert!(err.is_concurrency_conflict());
        assert!(!err.is_modeling());
        assert_eq!(
            err.to_string(),
            "Optimistic concurrency check failed: row in 'Person' with key 1 was modified or deleted"
        );
    }

    #[test]
    fn test_not_implemented_counts_as_modeling() {
        let err = Error::not_implemented("SQLite", "identity retrieval");
        assert!(err.is_modeling());
        assert_eq!(
            err.to_string(),
            "identity retrieval is not implemented for the SQLite provider"
        );
    }

    #[test]
    fn test_already_exists_detection() {
        let err = Error::query(QueryErrorKind::Database, "table \"Person\" already exists");
        assert!(err.is_already_exists());
        let err = Error::query(QueryErrorKind::Database, "no such table: Person");
        assert!(err.is_already_exists());
        let err = Error::query(QueryErrorKind::Constraint, "UNIQUE constraint failed");
        assert!(!err.is_already_exists());
        assert!(!Error::Custom("already exists".into()).is_already_exists());
    }

    #[test]
    fn test_conversion_display_includes_field() {
        let err = ConversionError {
            source_type: "Text".into(),
            target_type: "i32".into(),
            field: None,
            message: "invalid digit".into(),
        }
        .with_field("Age");
        assert_eq!(
            Error::from(err).to_string(),
            "Conversion error: cannot convert Text to i32 for field 'Age': invalid digit"
        );
    }
}
