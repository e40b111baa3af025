//! Handle registry implementation
//!
//! Resolves handles to dissemination URLs or domain objects, mints new
//! handles for registered resources and enumerates handles under a prefix.
//! The registry keeps no state of its own between calls; every lookup goes to
//! the record store it was built with.

use crate::config::RegistryConfig;
use crate::errors::*;
use crate::resolution::{ResolverTable, ResourceResolver};
use crate::types::*;
use hdl_storage::{HandleRow, RecordStore, HANDLE_COUNTER};
use metrics::counter;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle registry
///
/// Handle uniqueness rests on [`RecordStore::next_id`] being atomic; the
/// registry adds no locking of its own around minting.
pub struct HandleRegistry<O> {
    store: Arc<dyn RecordStore>,
    resolvers: ResolverTable<O>,
    config: RegistryConfig,
}

impl<O> HandleRegistry<O> {
    /// Create a registry over explicit collaborators
    pub fn new(
        store: Arc<dyn RecordStore>,
        resolvers: ResolverTable<O>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            resolvers,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// `hdl:`-qualified form of any string; never validates, never touches storage
    pub fn canonical_form(handle: &str) -> String {
        format!("{CANONICAL_SCHEME}{handle}")
    }

    /// Raw record for `handle`, if one exists
    pub fn find_record(&self, handle: &str) -> Result<Option<IdentifierRecord>> {
        if handle.is_empty() {
            return Err(HandleRegistryError::InvalidArgument {
                reason: "handle is empty",
            });
        }

        match self.store.find_by_handle(handle)? {
            Some(row) => IdentifierRecord::try_from(row).map(Some).inspect_err(|_| {
                warn!(handle, "Handle record has no associated resource");
            }),
            None => Ok(None),
        }
    }

    /// Resolve a handle to the URL its content is disseminated from
    pub fn resolve_to_url(&self, handle: &str) -> Result<Option<String>> {
        let Some(record) = self.find_record(handle)? else {
            record_resolution("missing");
            return Ok(None);
        };

        let (kind, _) = self.dispatch(&record)?;
        let url = join_segments(self.config.url_prefix(kind)?, handle);

        debug!(handle, %url, "Resolved handle to URL");
        record_resolution("url");
        Ok(Some(url))
    }

    /// Resolve a handle to the domain object it addresses.
    ///
    /// A handle whose object no longer exists resolves to `None`.
    pub fn resolve_to_object(&self, handle: &str) -> Result<Option<O>> {
        let Some(record) = self.find_record(handle)? else {
            record_resolution("missing");
            return Ok(None);
        };

        let (kind, resolver) = self.dispatch(&record)?;
        let object = resolver.resolve(record.resource_id)?;

        if object.is_some() {
            debug!(handle, %kind, resource_id = record.resource_id, "Resolved handle to object");
            record_resolution("object");
        } else {
            warn!(handle, %kind, resource_id = record.resource_id, "Handle points at a missing resource");
            record_resolution("dangling");
        }
        Ok(object)
    }

    /// Handle already assigned to `resource`, if any.
    ///
    /// Kinds without a registered resolver have no handles and yield `None`.
    pub fn find_handle<R>(&self, resource: &R) -> Result<Option<Handle>>
    where
        R: Resource + ?Sized,
    {
        let kind = resource.resource_type();
        if !self.resolvers.supports(kind) {
            return Ok(None);
        }

        Ok(self
            .store
            .find_by_resource(kind.code(), resource.resource_id())?
            .map(Handle))
    }

    /// Check that handles can be minted for `kind`, returning the site prefix.
    ///
    /// Touches neither the store nor the counter.
    pub fn ensure_mintable(&self, kind: ResourceType) -> Result<&str> {
        if !self.resolvers.supports(kind) {
            return Err(HandleRegistryError::UnsupportedResourceType {
                type_id: kind.code(),
            });
        }
        self.config.prefix()
    }

    /// Mint and persist a new handle for `resource`
    pub fn create_handle<R>(&self, resource: &R) -> Result<Handle>
    where
        R: Resource + ?Sized,
    {
        let kind = resource.resource_type();
        let prefix = self.ensure_mintable(kind)?;
        let suffix = self.store.next_id(HANDLE_COUNTER)?;
        let handle = Handle(join_segments(prefix, &suffix.to_string()));

        self.store.insert(HandleRow::new(
            handle.as_str(),
            kind.code(),
            resource.resource_id(),
        ))?;

        debug!(%handle, %kind, resource_id = resource.resource_id(), "Created new handle");
        counter!("hdl_handles_minted_total").increment(1);
        Ok(handle)
    }

    /// Every handle starting with `prefix`, taken as literal text
    pub fn handles_for_prefix(&self, prefix: &str) -> Result<Vec<Handle>> {
        let handles: Vec<Handle> = self
            .store
            .handles_with_prefix(prefix)?
            .into_iter()
            .map(Handle)
            .collect();

        debug!(prefix, count = handles.len(), "Listed handles for prefix");
        Ok(handles)
    }

    fn dispatch(
        &self,
        record: &IdentifierRecord,
    ) -> Result<(ResourceType, &Arc<dyn ResourceResolver<O>>)> {
        let unsupported = || HandleRegistryError::UnsupportedResourceType {
            type_id: record.resource_type_id,
        };

        let kind = record.resource_type().ok_or_else(unsupported)?;
        let resolver = self.resolvers.get(kind).ok_or_else(unsupported)?;
        Ok((kind, resolver))
    }
}

fn record_resolution(outcome: &'static str) {
    counter!("hdl_resolutions_total", "outcome" => outcome).increment(1);
}

impl<O> fmt::Debug for HandleRegistry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("resolvers", &self.resolvers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
