//! End-to-end properties of the handle registry over both record stores.

use hdl_handle_registry::{
    Handle, HandleRegistry, HandleRegistryError, RegistryConfig, Resource, ResourceResolver,
    ResourceType, ResolverTable,
};
use hdl_storage::{HandleRow, MemoryRecordStore, RecordStore, SledRecordStore, HANDLE_COUNTER};
use parking_lot::RwLock;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Item {
    id: i64,
    title: String,
}

impl Resource for Item {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Item
    }

    fn resource_id(&self) -> i64 {
        self.id
    }
}

/// Shared in-memory item catalog
#[derive(Clone, Default)]
struct Catalog(Arc<RwLock<HashMap<i64, Item>>>);

impl Catalog {
    fn add(&self, id: i64) -> Item {
        let item = Item {
            id,
            title: format!("item {id}"),
        };
        self.0.write().insert(id, item.clone());
        item
    }
}

impl ResourceResolver<Item> for Catalog {
    fn resolve(&self, resource_id: i64) -> anyhow::Result<Option<Item>> {
        Ok(self.0.read().get(&resource_id).cloned())
    }
}

fn site_config() -> RegistryConfig {
    RegistryConfig::new("123456789").with_item_url_prefix("http://example.org/handle")
}

fn registry_over(store: Arc<dyn RecordStore>) -> (HandleRegistry<Item>, Catalog) {
    let catalog = Catalog::default();
    let registry = HandleRegistry::new(
        store,
        ResolverTable::with_items(catalog.clone()),
        site_config(),
    );
    (registry, catalog)
}

#[test]
fn test_site_scenario_on_sled() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledRecordStore::new(dir.path().join("handles.db")).unwrap());
    for _ in 0..6 {
        store.next_id(HANDLE_COUNTER).unwrap();
    }
    let (registry, catalog) = registry_over(store.clone());
    let item = catalog.add(42);

    let handle = registry.create_handle(&item).unwrap();
    assert_eq!(handle.as_str(), "123456789/7");
    assert_eq!(
        registry.resolve_to_object("123456789/7").unwrap(),
        Some(item.clone())
    );
    assert_eq!(handle.canonical(), "hdl:123456789/7");
    assert_eq!(
        HandleRegistry::<Item>::canonical_form(handle.as_str()),
        "hdl:123456789/7"
    );
    assert_eq!(
        registry.resolve_to_url("123456789/7").unwrap().as_deref(),
        Some("http://example.org/handle/123456789/7")
    );
    assert_eq!(registry.resolve_to_url("000000000/1").unwrap(), None);

    let second = registry.create_handle(&catalog.add(43)).unwrap();
    assert_eq!(second.as_str(), "123456789/8");

    let listed: HashSet<Handle> = registry
        .handles_for_prefix("123456789")
        .unwrap()
        .into_iter()
        .collect();
    let expected: HashSet<Handle> = [handle, second].into_iter().collect();
    assert_eq!(listed, expected);
}

#[test]
fn test_sled_handles_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("handles.db");
    let catalog = Catalog::default();
    let item = catalog.add(5);

    let handle = {
        let store = Arc::new(SledRecordStore::new(&path).unwrap());
        let registry = HandleRegistry::new(
            store.clone(),
            ResolverTable::with_items(catalog.clone()),
            site_config(),
        );
        let handle = registry.create_handle(&item).unwrap();
        store.flush().unwrap();
        handle
    };

    let store = Arc::new(SledRecordStore::new(&path).unwrap());
    let registry = HandleRegistry::new(store, ResolverTable::with_items(catalog), site_config());
    assert_eq!(registry.find_handle(&item).unwrap(), Some(handle.clone()));
    let next = registry.create_handle(&item).unwrap();
    assert_ne!(next, handle);
    // Earliest handle still wins the reverse lookup.
    assert_eq!(registry.find_handle(&item).unwrap(), Some(handle));
}

fn check_concurrent_minting(store: Arc<dyn RecordStore>) {
    let (registry, catalog) = registry_over(store);
    let registry = Arc::new(registry);
    let items: Vec<Item> = (0..64).map(|id| catalog.add(id)).collect();

    let handles: Vec<Handle> = std::thread::scope(|scope| {
        let workers: Vec<_> = items
            .chunks(8)
            .map(|chunk| {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|item| registry.create_handle(item).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    let distinct: HashSet<&Handle> = handles.iter().collect();
    assert_eq!(distinct.len(), items.len());

    for item in &items {
        let handle = registry.find_handle(item).unwrap().unwrap();
        assert_eq!(
            registry.resolve_to_object(handle.as_str()).unwrap().as_ref(),
            Some(item)
        );
    }
}

#[test]
fn test_concurrent_minting_memory() {
    check_concurrent_minting(Arc::new(MemoryRecordStore::new()));
}

#[test]
fn test_concurrent_minting_sled() {
    let dir = TempDir::new().unwrap();
    check_concurrent_minting(Arc::new(
        SledRecordStore::new(dir.path().join("handles.db")).unwrap(),
    ));
}

#[test]
fn test_foreign_record_kinds_fail_distinctly() {
    let store = Arc::new(MemoryRecordStore::new());
    store
        .insert(HandleRow::new("123456789/50", ResourceType::Community.code(), 1))
        .unwrap();
    let (registry, _) = registry_over(store);

    let err = registry.resolve_to_url("123456789/50").unwrap_err();
    assert!(matches!(
        err,
        HandleRegistryError::UnsupportedResourceType { type_id: 4 }
    ));
    let err = registry.resolve_to_object("123456789/50").unwrap_err();
    assert!(matches!(
        err,
        HandleRegistryError::UnsupportedResourceType { type_id: 4 }
    ));
}

proptest! {
    #[test]
    fn prop_canonical_form_prepends_scheme(handle in ".*") {
        prop_assert_eq!(
            HandleRegistry::<Item>::canonical_form(&handle),
            format!("hdl:{handle}")
        );
    }

    #[test]
    fn prop_prefix_listing_is_literal(
        suffixes in prop::collection::hash_set("[a-c%_*.\\\\/]{1,5}", 0..24),
        prefix in "[a-c%_*.\\\\/]{0,3}",
    ) {
        let store = Arc::new(MemoryRecordStore::new());
        for (id, suffix) in suffixes.iter().enumerate() {
            store.insert(HandleRow::new(suffix.as_str(), 2, id as i64)).unwrap();
        }
        let (registry, _) = registry_over(store);

        let listed: HashSet<String> = registry
            .handles_for_prefix(&prefix)
            .unwrap()
            .into_iter()
            .map(Handle::into_string)
            .collect();
        let expected: HashSet<String> = suffixes
            .iter()
            .filter(|s| s.starts_with(prefix.as_str()))
            .cloned()
            .collect();
        prop_assert_eq!(listed, expected);
    }

    #[test]
    fn prop_mint_resolve_find_round_trip(ids in prop::collection::hash_set(0i64..10_000, 1..16)) {
        let (registry, catalog) = registry_over(Arc::new(MemoryRecordStore::new()));
        for id in ids {
            let item = catalog.add(id);
            let handle = registry.create_handle(&item).unwrap();
            let resolved = registry.resolve_to_object(handle.as_str()).unwrap();
            prop_assert_eq!(resolved.as_ref(), Some(&item));
            prop_assert_eq!(registry.find_handle(&item).unwrap(), Some(handle));
        }
    }
}
