//! Error types for the handle registry

use hdl_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandleRegistryError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: &'static str },

    #[error("Unsupported resource type: {type_id}")]
    UnsupportedResourceType { type_id: i32 },

    #[error("Corrupt handle record {handle}: no associated resource")]
    CorruptRecord { handle: String },

    #[error("Missing configuration property: {key}")]
    ConfigurationMissing { key: String },

    #[error("Record store error: {0}")]
    Store(#[from] StorageError),

    #[error("Resource resolver error: {0}")]
    Resolver(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HandleRegistryError>;
