//! Persistent identifier (handle) registry
//!
//! Maps `<prefix>/<suffix>` handles to repository resources, mints new handles
//! for newly registered resources and rebuilds dissemination URLs from them.
//! Persistence lives behind [`hdl_storage::RecordStore`]; domain objects are
//! materialized through the [`ResolverTable`].

pub mod config;
pub mod errors;
pub mod registry;
pub mod resolution;
pub mod types;

pub use self::config::RegistryConfig;
pub use registry::HandleRegistry;
pub use resolution::{ResolverTable, ResourceResolver};
pub use types::*;
pub use errors::*;
