//! Resource resolution capabilities keyed by resource type

use crate::types::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Materializes a domain object of one resource kind from its id.
///
/// `Ok(None)` means the object is gone even though its handle still exists.
pub trait ResourceResolver<O>: Send + Sync {
    fn resolve(&self, resource_id: i64) -> anyhow::Result<Option<O>>;
}

/// Resource type → resolver table
///
/// The registry dispatches through this table only, so supporting a new kind
/// means registering a resolver for it.
pub struct ResolverTable<O> {
    resolvers: HashMap<ResourceType, Arc<dyn ResourceResolver<O>>>,
}

impl<O> ResolverTable<O> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// Table with the item resolver wired in
    pub fn with_items<R>(resolver: R) -> Self
    where
        R: ResourceResolver<O> + 'static,
    {
        Self::new().with(ResourceType::Item, resolver)
    }

    pub fn with<R>(mut self, kind: ResourceType, resolver: R) -> Self
    where
        R: ResourceResolver<O> + 'static,
    {
        self.register(kind, Arc::new(resolver));
        self
    }

    /// Register a resolver, returning the one it replaces
    pub fn register(
        &mut self,
        kind: ResourceType,
        resolver: Arc<dyn ResourceResolver<O>>,
    ) -> Option<Arc<dyn ResourceResolver<O>>> {
        self.resolvers.insert(kind, resolver)
    }

    pub fn get(&self, kind: ResourceType) -> Option<&Arc<dyn ResourceResolver<O>>> {
        self.resolvers.get(&kind)
    }

    pub fn supports(&self, kind: ResourceType) -> bool {
        self.resolvers.contains_key(&kind)
    }

    /// Registered kinds, in code order
    pub fn kinds(&self) -> Vec<ResourceType> {
        let mut kinds: Vec<_> = self.resolvers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl<O> Default for ResolverTable<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Clone for ResolverTable<O> {
    fn clone(&self) -> Self {
        Self {
            resolvers: self.resolvers.clone(),
        }
    }
}

impl<O> fmt::Debug for ResolverTable<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}
