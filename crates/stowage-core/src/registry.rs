//! Type-safe cache factory with an explicit lifecycle.
//!
//! A [`CacheRegistry`] is an explicitly constructed object, not ambient
//! global state: callers build one, `initialize` it with a config, and pass
//! it around. Bindings map cache type identifiers to constructors;
//! instances are built lazily and memoized until the next `initialize` or
//! `clear`. Misuse (uninitialized registry, unknown type) is fail-fast,
//! unlike the fail-soft cache operations themselves.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::config::CacheConfig;
use crate::error::RegistryError;
use crate::store::{CacheEntity, FileCache};

/// A cache object the registry can construct and hand out.
pub trait RegistryEntry: Send + Sync + 'static {
    /// Identifier this entry is bound under.
    const CACHE_TYPE: &'static str;

    fn from_config(config: Arc<CacheConfig>) -> Self;
}

impl<E> RegistryEntry for FileCache<E>
where
    E: CacheEntity + 'static,
{
    const CACHE_TYPE: &'static str = E::CACHE_TYPE;

    fn from_config(config: Arc<CacheConfig>) -> Self {
        Self::new(config)
    }
}

type Builder = fn(Arc<CacheConfig>) -> Arc<dyn Any + Send + Sync>;

fn build<C: RegistryEntry>(config: Arc<CacheConfig>) -> Arc<dyn Any + Send + Sync> {
    Arc::new(C::from_config(config))
}

#[derive(Default)]
struct Inner {
    config: Option<Arc<CacheConfig>>,
    bindings: BTreeMap<&'static str, Builder>,
    instances: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

/// Factory and memoization point for every cache type in a process.
#[derive(Default)]
pub struct CacheRegistry {
    inner: RwLock<Inner>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind a configuration and drop all memoized instances.
    ///
    /// Bindings survive, so a re-initialize (e.g. switching profiles) takes
    /// effect for every type on its next `get`.
    pub fn initialize(&self, config: Arc<CacheConfig>) {
        let mut inner = self.write();
        inner.config = Some(config);
        inner.instances.clear();
        debug!(
            bindings = inner.bindings.len(),
            "cache registry initialized"
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.read().config.is_some()
    }

    pub fn config(&self) -> Option<Arc<CacheConfig>> {
        self.read().config.clone()
    }

    /// Bind a cache type to its constructor. Works before or after
    /// `initialize`; rebinding an identifier overwrites the old binding.
    pub fn register<C: RegistryEntry>(&self) {
        self.write().bindings.insert(C::CACHE_TYPE, build::<C>);
    }

    /// Identifiers with a binding, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        self.read()
            .bindings
            .keys()
            .map(|k| (*k).to_owned())
            .collect()
    }

    /// Fetch (constructing and memoizing on first use) the cache bound to
    /// `C::CACHE_TYPE`.
    pub fn get<C: RegistryEntry>(&self) -> Result<Arc<C>, RegistryError> {
        if let Some(instance) = self.read().instances.get(C::CACHE_TYPE) {
            return downcast::<C>(Arc::clone(instance));
        }

        let mut inner = self.write();
        let config = inner
            .config
            .clone()
            .ok_or(RegistryError::NotInitialized)?;
        // another thread may have built it between the two lock windows
        if let Some(instance) = inner.instances.get(C::CACHE_TYPE) {
            return downcast::<C>(Arc::clone(instance));
        }
        let builder =
            inner
                .bindings
                .get(C::CACHE_TYPE)
                .copied()
                .ok_or_else(|| RegistryError::UnknownType {
                    requested: C::CACHE_TYPE.to_owned(),
                    registered: inner.bindings.keys().map(|k| (*k).to_owned()).collect(),
                })?;
        let instance = builder(config);
        inner
            .instances
            .insert(C::CACHE_TYPE, Arc::clone(&instance));
        downcast::<C>(instance)
    }

    /// Drop memoized instances, keeping bindings and config.
    pub fn clear(&self) {
        self.write().instances.clear();
    }

    /// Full wipe: bindings, instances, config. Test isolation only.
    pub fn reset(&self) {
        let mut inner = self.write();
        *inner = Inner::default();
    }
}

fn downcast<C: RegistryEntry>(
    instance: Arc<dyn Any + Send + Sync>,
) -> Result<Arc<C>, RegistryError> {
    instance
        .downcast::<C>()
        .map_err(|_| RegistryError::InstanceMismatch {
            cache_type: C::CACHE_TYPE.to_owned(),
        })
}
