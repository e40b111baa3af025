//! Types for the handle registry

use crate::errors::*;
use hdl_storage::HandleRow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheme token of the canonical display form.
pub const CANONICAL_SCHEME: &str = "hdl:";

/// Persistent identifier of the form `<prefix>/<suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub String);

impl Handle {
    /// Create a new handle from string
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get the handle as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Namespace segment before the first `/`
    pub fn prefix(&self) -> Option<&str> {
        self.0.split_once('/').map(|(prefix, _)| prefix)
    }

    /// Locally unique part after the first `/`
    pub fn suffix(&self) -> Option<&str> {
        self.0.split_once('/').map(|(_, suffix)| suffix)
    }

    /// `hdl:`-qualified form used for display and citation
    pub fn canonical(&self) -> String {
        format!("{CANONICAL_SCHEME}{}", self.0)
    }

    /// Accept either a bare handle or its canonical form.
    pub fn from_canonical(value: &str) -> Self {
        Self::new(value.strip_prefix(CANONICAL_SCHEME).unwrap_or(value))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Handle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Join two path segments with exactly one `/` between them.
pub(crate) fn join_segments(base: &str, tail: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{tail}")
    } else {
        format!("{base}/{tail}")
    }
}

/// Kind of repository object a handle can address.
///
/// Codes match the persisted `resource_type_id` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum ResourceType {
    Bitstream = 0,
    Bundle = 1,
    Item = 2,
    Collection = 3,
    Community = 4,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Bitstream,
        ResourceType::Bundle,
        ResourceType::Item,
        ResourceType::Collection,
        ResourceType::Community,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Lower-case name used in configuration keys
    pub fn config_name(self) -> &'static str {
        match self {
            ResourceType::Bitstream => "bitstream",
            ResourceType::Bundle => "bundle",
            ResourceType::Item => "item",
            ResourceType::Collection => "collection",
            ResourceType::Community => "community",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// A domain object that can be addressed by a handle.
pub trait Resource {
    fn resource_type(&self) -> ResourceType;
    fn resource_id(&self) -> i64;
}

/// Validated handle record.
///
/// The type code is kept raw: codes outside [`ResourceType`] are
/// representable, they just cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRecord {
    pub handle: Handle,
    pub resource_type_id: i32,
    pub resource_id: i64,
}

impl IdentifierRecord {
    pub fn resource_type(&self) -> Option<ResourceType> {
        ResourceType::from_code(self.resource_type_id)
    }
}

impl TryFrom<HandleRow> for IdentifierRecord {
    type Error = HandleRegistryError;

    fn try_from(row: HandleRow) -> Result<Self> {
        match (row.resource_type_id, row.resource_id) {
            (Some(resource_type_id), Some(resource_id)) => Ok(Self {
                handle: Handle(row.handle),
                resource_type_id,
                resource_id,
            }),
            _ => Err(HandleRegistryError::CorruptRecord { handle: row.handle }),
        }
    }
}
