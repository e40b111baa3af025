//! Minimal item catalog kept next to the handle records.

use anyhow::Result;
use hdl_handle_registry::{Resource, ResourceResolver, ResourceType};
use hdl_storage::{RecordStore, SledRecordStore};
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::sync::Arc;

const ITEM_COUNTER: &str = "item";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub title: String,
}

impl Resource for CatalogItem {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Item
    }

    fn resource_id(&self) -> i64 {
        self.id
    }
}

/// Sled tree of items keyed by big-endian id
#[derive(Clone)]
pub struct ItemCatalog {
    store: Arc<SledRecordStore>,
    items: Tree,
}

impl ItemCatalog {
    pub fn open(store: Arc<SledRecordStore>) -> Result<Self> {
        let items = store.db().open_tree("items")?;
        Ok(Self { store, items })
    }

    pub fn create(&self, title: &str) -> Result<CatalogItem> {
        let id = i64::try_from(self.store.next_id(ITEM_COUNTER)?)?;
        let item = CatalogItem {
            id,
            title: title.to_string(),
        };
        self.items
            .insert(id.to_be_bytes(), serde_json::to_vec(&item)?)?;
        Ok(item)
    }

    pub fn get(&self, id: i64) -> Result<Option<CatalogItem>> {
        self.items
            .get(id.to_be_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }
}

impl ResourceResolver<CatalogItem> for ItemCatalog {
    fn resolve(&self, resource_id: i64) -> Result<Option<CatalogItem>> {
        self.get(resource_id)
    }
}
