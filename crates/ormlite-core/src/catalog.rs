//! Process-wide model metadata cache.
//!
//! Definitions are built once per type and shared as `Arc`s. The cache is a
//! copy-on-write map: readers clone the current snapshot pointer and never
//! wait on a writer building a definition; a writer builds the new entry and
//! the new map outside the lock, then swaps only if no other writer replaced
//! the snapshot in the meantime, retrying otherwise.

use crate::error::Result;
use crate::model::{Model, ModelDefinition};
use crate::types::is_builtin_scalar;
use std::any::TypeId;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// A read-mostly map updated by whole-snapshot swaps.
#[derive(Debug)]
pub struct CowMap<K, V> {
    current: RwLock<Arc<HashMap<K, V>>>,
}

impl<K, V> Default for CowMap<K, V> {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> CowMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<HashMap<K, V>> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.snapshot().get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Return the cached value, building and publishing it on first use.
    ///
    /// Concurrent first-time callers may each build a value, but exactly one
    /// is published and every caller receives the published one.
    pub fn get_or_try_insert_with<F>(&self, key: K, build: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }
        let value = build()?;
        Ok(self.publish(key, value, false))
    }

    /// Insert or replace a value.
    pub fn insert(&self, key: K, value: V) {
        self.publish(key, value, true);
    }

    fn publish(&self, key: K, value: V, replace: bool) -> V {
        loop {
            let snapshot = self.snapshot();
            if !replace {
                if let Some(existing) = snapshot.get(&key) {
                    return existing.clone();
                }
            }
            let mut next = HashMap::clone(&snapshot);
            next.insert(key.clone(), value.clone());
            let next = Arc::new(next);

            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if Arc::ptr_eq(&current, &snapshot) {
                *current = next;
                return value;
            }
            drop(current);
            tracing::trace!("Snapshot swap raced with another writer, retrying");
        }
    }
}

/// Cache of model definitions keyed by type.
#[derive(Debug, Default)]
pub struct ModelCatalog {
    definitions: CowMap<TypeId, Arc<ModelDefinition>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide catalog.
    pub fn global() -> &'static ModelCatalog {
        static CATALOG: OnceLock<ModelCatalog> = OnceLock::new();
        CATALOG.get_or_init(ModelCatalog::new)
    }

    /// Return the definition of `M`, building it on first use.
    pub fn get_or_create<M: Model>(&self) -> Result<Arc<ModelDefinition>> {
        self.definitions
            .get_or_try_insert_with(TypeId::of::<M>(), || {
                tracing::debug!(model = std::any::type_name::<M>(), "Building model definition");
                M::describe(crate::model::ModelBuilder::new())
                    .build()
                    .map(Arc::new)
            })
    }

    /// Look up an already built definition.
    ///
    /// Builtin scalar types never have a definition: they are scalar
    /// results, not model rows.
    pub fn lookup(&self, type_id: TypeId) -> Option<Arc<ModelDefinition>> {
        if is_builtin_scalar(type_id) {
            return None;
        }
        self.definitions.get(&type_id)
    }

    /// Number of cached definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
