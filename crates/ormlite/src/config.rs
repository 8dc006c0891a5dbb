//! Operation configuration and the process-wide default dialect.

use ormlite_query::{DialectProvider, SqliteDialect};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// What materialization does with a database NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Reset the field to its nullable-aware default (`None`, `0`, `""`).
    #[default]
    UseDefault,
    /// Keep whatever the instance already holds.
    LeaveUnchanged,
}

/// Knobs shared by every operation on a [`Db`](crate::Db).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    pub null_policy: NullPolicy,
    /// How many levels of reference fields `load_select` and
    /// `load_references` follow.
    pub load_references_max_depth: usize,
    /// Leave LIKE predicates case-sensitive instead of wrapping both sides
    /// in `UPPER(...)`.
    pub strip_upper_in_like: bool,
    /// Trace every dispatched statement with its parameters.
    pub log_sql: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OrmConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            null_policy: NullPolicy::UseDefault,
            load_references_max_depth: 1,
            strip_upper_in_like: false,
            log_sql: false,
        }
    }

    #[must_use]
    pub const fn null_policy(mut self, policy: NullPolicy) -> Self {
        self.null_policy = policy;
        self
    }

    #[must_use]
    pub const fn load_references_max_depth(mut self, depth: usize) -> Self {
        self.load_references_max_depth = depth;
        self
    }

    #[must_use]
    pub const fn strip_upper_in_like(mut self, strip: bool) -> Self {
        self.strip_upper_in_like = strip;
        self
    }

    #[must_use]
    pub const fn log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }
}

static DEFAULT_DIALECT: RwLock<Option<Arc<dyn DialectProvider>>> = RwLock::new(None);

/// Replace the dialect [`Db::new`](crate::Db::new) picks up.
///
/// Existing `Db` values keep the dialect they were built with.
pub fn set_default_dialect(dialect: Arc<dyn DialectProvider>) {
    let mut slot = DEFAULT_DIALECT
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    tracing::debug!(dialect = dialect.name(), "Default dialect set");
    *slot = Some(dialect);
}

/// The process-wide default dialect; SQLite until one is set.
pub fn default_dialect() -> Arc<dyn DialectProvider> {
    if let Some(dialect) = DEFAULT_DIALECT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return Arc::clone(dialect);
    }
    Arc::new(SqliteDialect::new())
}
