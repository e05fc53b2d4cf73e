//! End-to-end tests for the mapping core

use super::*;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Helper to create a seeded store and a cache with the default TTL
fn test_store() -> (MemoryStore, SnapshotCache) {
    let store = MemoryStore::with_sources(vec![
        KnowledgeBaseSource::new("1", "Clinic Handbook"),
        KnowledgeBaseSource::new("2", "Retail FAQ"),
        KnowledgeBaseSource::new("3", "Airline Policies"),
    ]);
    store.seed_tenant("+15550001", "1");
    store.seed_tenant("+15550002", "42");
    (store, SnapshotCache::default())
}

fn display_of(snapshot: &MappingSnapshot, id: &TenantId) -> String {
    let tenant = snapshot
        .tenants
        .iter()
        .find(|t| &t.id == id)
        .expect("tenant present");
    resolve_display(tenant, &snapshot.catalog)
}

#[test]
fn test_snapshot_resolves_known_and_dangling_codes() {
    let (store, cache) = test_store();
    let snapshot = cache.get_or_refresh(&store).unwrap();

    assert_eq!(snapshot.tenants.len(), 2);
    assert_eq!(display_of(&snapshot, &TenantId::new("1")), "Clinic Handbook");
    // Code 42 is not in the catalog: shown raw, never an error
    assert_eq!(display_of(&snapshot, &TenantId::new("2")), "42");
}

#[test]
fn test_cache_serves_repeat_reads_without_store_calls() {
    let (store, cache) = test_store();
    cache.get_or_refresh(&store).unwrap();
    let after_first = store.calls();

    cache.get_or_refresh(&store).unwrap();
    assert_eq!(store.calls(), after_first);
    assert!(cache.is_fresh());
}

#[test]
fn test_cache_expires_after_ttl() {
    let (store, _) = test_store();
    let cache = SnapshotCache::new(Duration::from_secs(60));
    let start = Instant::now();

    cache.get_or_refresh_at(&store, start).unwrap();
    let reads = store.calls().reads;

    cache
        .get_or_refresh_at(&store, start + Duration::from_secs(59))
        .unwrap();
    assert_eq!(store.calls().reads, reads, "still within TTL");

    cache
        .get_or_refresh_at(&store, start + Duration::from_secs(60))
        .unwrap();
    assert!(store.calls().reads > reads, "TTL elapsed, must reload");
}

#[test]
fn test_failed_load_is_not_cached() {
    let (store, cache) = test_store();
    store.set_offline(true);
    let err = cache.get_or_refresh(&store).unwrap_err();
    assert!(matches!(err, MappingError::DataAccess(_)));
    assert!(!cache.is_fresh());

    store.set_offline(false);
    assert!(cache.get_or_refresh(&store).is_ok());
}

#[test]
fn test_create_rejects_blank_contact_without_store_calls() {
    let (store, cache) = test_store();
    let catalog = load_sources(&store).unwrap();
    let before = store.calls();
    let dispatcher = MutationDispatcher::new(&store, &cache);

    for contact in ["", "   ", "\t\n"] {
        let err = dispatcher
            .create(contact, "Clinic Handbook", &catalog)
            .unwrap_err();
        assert!(matches!(err, MappingError::Validation(_)), "{contact:?}");
    }
    assert_eq!(store.calls(), before);
}

#[test]
fn test_create_stores_catalog_code_for_chosen_name() {
    let (store, cache) = test_store();
    let snapshot = cache.get_or_refresh(&store).unwrap();
    let dispatcher = MutationDispatcher::new(&store, &cache);

    let id = dispatcher
        .create("12345", "Retail FAQ", &snapshot.catalog)
        .unwrap();

    let row = store.tenant(&id).expect("row created");
    assert_eq!(row.contact, "12345");
    assert_eq!(row.source_code, SourceCode::new("2"));
}

#[test]
fn test_create_trims_contact_and_keeps_unknown_name_as_code() {
    let (store, cache) = test_store();
    let catalog = load_sources(&store).unwrap();
    let id = MutationDispatcher::new(&store, &cache)
        .create("  +15559999 ", "Not In Catalog", &catalog)
        .unwrap();

    let row = store.tenant(&id).unwrap();
    assert_eq!(row.contact, "+15559999");
    assert_eq!(row.source_code, SourceCode::new("Not In Catalog"));
}

#[test]
fn test_failed_create_leaves_cache_intact() {
    let (store, cache) = test_store();
    let snapshot = cache.get_or_refresh(&store).unwrap();
    store.set_offline(true);

    let err = MutationDispatcher::new(&store, &cache)
        .create("12345", "Retail FAQ", &snapshot.catalog)
        .unwrap_err();
    assert!(matches!(err, MappingError::DataAccess(_)));
    assert!(cache.is_fresh(), "no invalidation on failure");
    store.set_offline(false);
    assert_eq!(store.tenants().len(), 2);
}

#[test]
fn test_delete_requires_confirmation() {
    let (store, cache) = test_store();
    let id = TenantId::new("1");
    let before = store.calls();
    let dispatcher = MutationDispatcher::new(&store, &cache);

    let err = dispatcher.delete(&id, false).unwrap_err();
    assert!(matches!(err, MappingError::ConfirmationRequired));
    assert_eq!(store.calls(), before);
    assert!(store.tenant(&id).is_some());

    dispatcher.delete(&id, true).unwrap();
    assert!(store.tenant(&id).is_none());
}

#[test]
fn test_delete_of_missing_row_is_data_access_error() {
    let (store, cache) = test_store();
    let err = MutationDispatcher::new(&store, &cache)
        .delete(&TenantId::new("999"), true)
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::DataAccess(StoreError::RowNotFound { .. })
    ));
}

#[test]
fn test_blank_tenant_id_is_rejected() {
    let (store, cache) = test_store();
    let catalog = load_sources(&store).unwrap();
    let before = store.calls();
    let dispatcher = MutationDispatcher::new(&store, &cache);

    assert!(matches!(
        dispatcher.update(&TenantId::new(" "), "Retail FAQ", &catalog),
        Err(MappingError::Validation(_))
    ));
    assert!(matches!(
        dispatcher.delete(&TenantId::new(""), true),
        Err(MappingError::Validation(_))
    ));
    assert!(matches!(
        dispatcher.update(&TenantId::new("1"), "", &catalog),
        Err(MappingError::Validation(_))
    ));
    assert_eq!(store.calls(), before);
}

#[test]
fn test_every_mutation_invalidates_the_cache() {
    let (store, cache) = test_store();
    let dispatcher = MutationDispatcher::new(&store, &cache);

    let snapshot = cache.get_or_refresh(&store).unwrap();
    let id = dispatcher
        .create("+15550003", "Airline Policies", &snapshot.catalog)
        .unwrap();
    assert!(!cache.is_fresh());
    let snapshot = cache.get_or_refresh(&store).unwrap();
    assert_eq!(snapshot.tenants.len(), 3);

    dispatcher
        .update(&id, "Clinic Handbook", &snapshot.catalog)
        .unwrap();
    assert!(!cache.is_fresh());
    let snapshot = cache.get_or_refresh(&store).unwrap();
    assert_eq!(display_of(&snapshot, &id), "Clinic Handbook");

    dispatcher.delete(&id, true).unwrap();
    assert!(!cache.is_fresh());
    let snapshot = cache.get_or_refresh(&store).unwrap();
    assert!(snapshot.tenants.iter().all(|t| t.id != id));
}

#[test]
fn test_update_then_reload_round_trips_every_catalog_name() {
    let (store, cache) = test_store();
    let id = TenantId::new("2");

    for name in cache.get_or_refresh(&store).unwrap().display_options() {
        let snapshot = cache.get_or_refresh(&store).unwrap();
        MutationDispatcher::new(&store, &cache)
            .update(&id, &name, &snapshot.catalog)
            .unwrap();

        let reloaded = cache.get_or_refresh(&store).unwrap();
        assert_eq!(display_of(&reloaded, &id), name);
    }
}

#[test]
fn test_catalog_changes_are_picked_up_after_invalidation() {
    let (store, cache) = test_store();
    cache.get_or_refresh(&store).unwrap();
    store.add_source("42", "Insurance Claims");

    // Still cached: the dangling code keeps its raw form
    let cached = cache.get_or_refresh(&store).unwrap();
    assert_eq!(display_of(&cached, &TenantId::new("2")), "42");

    cache.invalidate();
    let fresh = cache.get_or_refresh(&store).unwrap();
    assert_eq!(display_of(&fresh, &TenantId::new("2")), "Insurance Claims");
}

#[test]
fn test_views_preseed_selection_against_rendered_options() {
    let (store, cache) = test_store();
    let snapshot = cache.get_or_refresh(&store).unwrap();
    let options = snapshot.display_options();
    let views = snapshot.views(&options);

    assert_eq!(options, vec!["Airline Policies", "Clinic Handbook", "Retail FAQ"]);
    assert_eq!(views[0].selected, Some(1));
    // Dangling code: first option pre-selected
    assert_eq!(views[1].selected, Some(0));
}

#[test]
fn test_validators_need_no_store() {
    assert!(MutationDispatcher::validate_create("+15550009", "Retail FAQ").is_ok());
    assert!(matches!(
        MutationDispatcher::validate_create("  ", "Retail FAQ"),
        Err(MappingError::Validation(_))
    ));
    assert!(matches!(
        MutationDispatcher::validate_create("+15550009", " "),
        Err(MappingError::Validation(_))
    ));
    assert!(matches!(
        MutationDispatcher::validate_update(&TenantId::new(""), "Retail FAQ"),
        Err(MappingError::Validation(_))
    ));
    assert!(MutationDispatcher::validate_update(&TenantId::new("1"), "Retail FAQ").is_ok());
}

// ============================================================================
// Loads racing mutations
// ============================================================================

/// Pauses the next tenant read after it returns, until the test lets it go.
struct PausingStore {
    inner: MemoryStore,
    pause: parking_lot::Mutex<Option<(Arc<Barrier>, Arc<Barrier>)>>,
}

impl PausingStore {
    fn arm(&self, loaded: Arc<Barrier>, resume: Arc<Barrier>) {
        *self.pause.lock() = Some((loaded, resume));
    }
}

impl MappingStore for PausingStore {
    fn select_sources(&self) -> Result<Vec<KnowledgeBaseSource>, StoreError> {
        self.inner.select_sources()
    }

    fn select_tenants(&self) -> Result<Vec<TenantMapping>, StoreError> {
        let rows = self.inner.select_tenants()?;
        let pause = self.pause.lock().take();
        if let Some((loaded, resume)) = pause {
            loaded.wait();
            resume.wait();
        }
        Ok(rows)
    }

    fn insert_tenant(&self, contact: &str, source: &SourceCode) -> Result<TenantId, StoreError> {
        self.inner.insert_tenant(contact, source)
    }

    fn update_tenant_source(&self, id: &TenantId, source: &SourceCode) -> Result<(), StoreError> {
        self.inner.update_tenant_source(id, source)
    }

    fn delete_tenant(&self, id: &TenantId) -> Result<(), StoreError> {
        self.inner.delete_tenant(id)
    }
}

#[test]
fn test_in_flight_load_cannot_resurrect_pre_update_data() {
    let (inner, _) = test_store();
    let store = Arc::new(PausingStore {
        inner,
        pause: parking_lot::Mutex::new(None),
    });
    let cache = Arc::new(SnapshotCache::default());
    let id = TenantId::new("1");

    let loaded = Arc::new(Barrier::new(2));
    let resume = Arc::new(Barrier::new(2));
    store.arm(loaded.clone(), resume.clone());

    let reader = thread::spawn({
        let store = store.clone();
        let cache = cache.clone();
        let id = id.clone();
        move || {
            let snapshot = cache.get_or_refresh(store.as_ref()).unwrap();
            display_of(&snapshot, &id)
        }
    });

    // The reader holds pre-update rows while the operator saves.
    loaded.wait();
    let catalog = SourceCatalog::from_sources(store.select_sources().unwrap());
    MutationDispatcher::new(store.as_ref(), &cache)
        .update(&id, "Retail FAQ", &catalog)
        .unwrap();
    resume.wait();

    assert_eq!(reader.join().unwrap(), "Clinic Handbook");
    assert!(!cache.is_fresh(), "stale load must not be stored");

    let next = cache.get_or_refresh(store.as_ref()).unwrap();
    assert_eq!(display_of(&next, &id), "Retail FAQ");
}
