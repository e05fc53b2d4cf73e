//! Lookup table and tenant snapshot loaders.

use chrono::Utc;

use crate::cache::MappingSnapshot;
use crate::catalog::SourceCatalog;
use crate::{MappingError, MappingStore, TenantMapping};

/// Reads the full source catalog and builds both lookup maps.
pub fn load_sources(store: &dyn MappingStore) -> Result<SourceCatalog, MappingError> {
    let sources = store.select_sources()?;
    Ok(SourceCatalog::from_sources(sources))
}

/// Reads every tenant row, in store order.
pub fn load_tenants(store: &dyn MappingStore) -> Result<Vec<TenantMapping>, MappingError> {
    Ok(store.select_tenants()?)
}

/// Combined load backing one cache entry. Tenants first, then the catalog.
pub fn load_snapshot(store: &dyn MappingStore) -> Result<MappingSnapshot, MappingError> {
    let tenants = load_tenants(store)?;
    let catalog = load_sources(store)?;
    tracing::debug!(
        tenants = tenants.len(),
        sources = catalog.len(),
        "loaded mapping snapshot"
    );
    Ok(MappingSnapshot {
        tenants,
        catalog,
        loaded_at: Utc::now(),
    })
}
