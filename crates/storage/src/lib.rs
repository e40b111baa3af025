//! Record store for handle records.
//!
//! The registry only needs four primitives from persistence: a unique-key
//! lookup, a reverse lookup by resource, a literal prefix scan and an atomic
//! per-kind counter. [`SledRecordStore`] provides them on disk and
//! [`MemoryRecordStore`] in memory for tests and embedding.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::HashMap;
use std::path::Path;

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Stored handle is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Handle already exists: {handle}")]
    DuplicateHandle { handle: String },
    #[error("Counter {kind} holds a malformed value")]
    CorruptCounter { kind: String },
    #[error("Counter {kind} is exhausted")]
    CounterExhausted { kind: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Counter kind used when minting handle suffixes.
pub const HANDLE_COUNTER: &str = "handle";

/// Persisted handle row.
///
/// The resource columns are nullable so that a damaged row can be represented
/// and rejected by the registry rather than silently decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRow {
    pub handle: String,
    #[serde(default)]
    pub resource_type_id: Option<i32>,
    #[serde(default)]
    pub resource_id: Option<i64>,
}

impl HandleRow {
    pub fn new(handle: impl Into<String>, resource_type_id: i32, resource_id: i64) -> Self {
        Self {
            handle: handle.into(),
            resource_type_id: Some(resource_type_id),
            resource_id: Some(resource_id),
        }
    }
}

/// Abstract record store.
///
/// Implementations must make [`RecordStore::next_id`] atomic and
/// non-repeating across concurrent callers; handle uniqueness depends on it.
pub trait RecordStore: Send + Sync {
    /// Point lookup by the unique handle key.
    fn find_by_handle(&self, handle: &str) -> Result<Option<HandleRow>>;
    /// Reverse lookup; the earliest inserted handle wins when several exist.
    fn find_by_resource(&self, resource_type_id: i32, resource_id: i64)
        -> Result<Option<String>>;
    /// Every handle whose bytes start with `prefix`, matched literally.
    fn handles_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
    /// Allocate the next value of the named counter, starting at 1.
    fn next_id(&self, kind: &str) -> Result<u64>;
    /// Insert a new row, failing if its handle is already taken.
    fn insert(&self, row: HandleRow) -> Result<()>;
}

/// Sled-backed implementation
pub struct SledRecordStore {
    db: Db,
    handles: Tree,
    resource_index: Tree,
    counters: Tree,
}

impl SledRecordStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let handles = db.open_tree("handles")?;
        let resource_index = db.open_tree("resource_index")?;
        let counters = db.open_tree("counters")?;

        tracing::info!(handles = handles.len(), "Opened handle record store");

        Ok(Self {
            db,
            handles,
            resource_index,
            counters,
        })
    }

    /// Underlying database, for callers that keep their own trees next to
    /// the handle records.
    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn resource_prefix(resource_type_id: i32, resource_id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(20);
    key.extend_from_slice(&resource_type_id.to_be_bytes());
    key.extend_from_slice(&resource_id.to_be_bytes());
    key
}

fn decode_counter(bytes: &[u8]) -> Option<u64> {
    <[u8; 8]>::try_from(bytes).ok().map(u64::from_be_bytes)
}

impl RecordStore for SledRecordStore {
    fn find_by_handle(&self, handle: &str) -> Result<Option<HandleRow>> {
        self.handles
            .get(handle.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn find_by_resource(
        &self,
        resource_type_id: i32,
        resource_id: i64,
    ) -> Result<Option<String>> {
        let prefix = resource_prefix(resource_type_id, resource_id);
        match self.resource_index.scan_prefix(prefix).next() {
            Some(entry) => {
                let (_, handle) = entry?;
                Ok(Some(String::from_utf8(handle.to_vec())?))
            }
            None => Ok(None),
        }
    }

    fn handles_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.handles
            .scan_prefix(prefix.as_bytes())
            .keys()
            .map(|k| Ok(String::from_utf8(k?.to_vec())?))
            .collect()
    }

    fn next_id(&self, kind: &str) -> Result<u64> {
        let mut corrupt = false;
        let mut exhausted = false;
        let value = self.counters.update_and_fetch(kind.as_bytes(), |old| {
            corrupt = false;
            exhausted = false;
            match old {
                None => Some(1u64.to_be_bytes().to_vec()),
                Some(bytes) => match decode_counter(bytes).map(|current| current.checked_add(1)) {
                    Some(Some(next)) => Some(next.to_be_bytes().to_vec()),
                    Some(None) => {
                        exhausted = true;
                        Some(bytes.to_vec())
                    }
                    None => {
                        corrupt = true;
                        Some(bytes.to_vec())
                    }
                },
            }
        })?;

        if exhausted {
            return Err(StorageError::CounterExhausted {
                kind: kind.to_string(),
            });
        }
        match value.as_deref().and_then(decode_counter) {
            Some(id) if !corrupt => Ok(id),
            _ => Err(StorageError::CorruptCounter {
                kind: kind.to_string(),
            }),
        }
    }

    fn insert(&self, row: HandleRow) -> Result<()> {
        let data = serde_json::to_vec(&row)?;
        let index_key = match (row.resource_type_id, row.resource_id) {
            (Some(type_id), Some(id)) => {
                let mut key = resource_prefix(type_id, id);
                key.extend_from_slice(&self.db.generate_id()?.to_be_bytes());
                Some(key)
            }
            _ => None,
        };
        let key = row.handle.as_bytes();

        let result: std::result::Result<(), TransactionError<()>> = (
            &self.handles,
            &self.resource_index,
        )
            .transaction(|(handles, index)| {
                if handles.get(key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                handles.insert(key, data.as_slice())?;
                if let Some(index_key) = &index_key {
                    index.insert(index_key.as_slice(), key)?;
                }
                Ok(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(())) => Err(StorageError::DuplicateHandle {
                handle: row.handle,
            }),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }
}

#[derive(Default)]
struct MemoryTables {
    rows: Vec<HandleRow>,
    by_handle: HashMap<String, usize>,
}

/// In-memory testing backend
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<MemoryTables>,
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the named counter after `last`, so the next allocation is `last + 1`.
    pub fn with_counter(self, kind: &str, last: u64) -> Self {
        self.counters.lock().insert(kind.to_string(), last);
        self
    }

    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn find_by_handle(&self, handle: &str) -> Result<Option<HandleRow>> {
        let tables = self.tables.read();
        Ok(tables
            .by_handle
            .get(handle)
            .map(|&idx| tables.rows[idx].clone()))
    }

    fn find_by_resource(
        &self,
        resource_type_id: i32,
        resource_id: i64,
    ) -> Result<Option<String>> {
        Ok(self
            .tables
            .read()
            .rows
            .iter()
            .find(|r| {
                r.resource_type_id == Some(resource_type_id) && r.resource_id == Some(resource_id)
            })
            .map(|r| r.handle.clone()))
    }

    fn handles_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .read()
            .rows
            .iter()
            .filter(|r| r.handle.starts_with(prefix))
            .map(|r| r.handle.clone())
            .collect())
    }

    fn next_id(&self, kind: &str) -> Result<u64> {
        let mut counters = self.counters.lock();
        let counter = counters.entry(kind.to_string()).or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| StorageError::CounterExhausted {
                kind: kind.to_string(),
            })?;
        Ok(*counter)
    }

    fn insert(&self, row: HandleRow) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.by_handle.contains_key(&row.handle) {
            return Err(StorageError::DuplicateHandle { handle: row.handle });
        }
        let idx = tables.rows.len();
        tables.by_handle.insert(row.handle.clone(), idx);
        tables.rows.push(row);
        Ok(())
    }
}
