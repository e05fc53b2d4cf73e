//! Fixed-TTL snapshot cache.
//!
//! One global entry holding the combined tenant + catalog load. The cache is
//! owned by whoever composes the application and handed explicitly to reads
//! and mutations; there is no hidden global.
//!
//! The lock only protects the slot itself. Loads run without it, so two
//! concurrent refreshes may both hit the store. Every `invalidate` bumps a
//! generation; a load that started before the bump is handed to its caller
//! but never stored, so a mutation's own invalidation cannot be undone by a
//! read that was already in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::catalog::{reconcile, SourceCatalog, TenantView};
use crate::loader::load_snapshot;
use crate::{MappingError, MappingStore, TenantMapping};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Everything one page render needs.
#[derive(Debug, Clone)]
pub struct MappingSnapshot {
    pub tenants: Vec<TenantMapping>,
    pub catalog: SourceCatalog,
    pub loaded_at: DateTime<Utc>,
}

impl MappingSnapshot {
    pub fn display_options(&self) -> Vec<String> {
        self.catalog.display_options()
    }

    pub fn views<'a>(&'a self, options: &[String]) -> Vec<TenantView<'a>> {
        reconcile(&self.tenants, &self.catalog, options)
    }
}

struct CachedSnapshot {
    snapshot: Arc<MappingSnapshot>,
    stored_at: Instant,
}

#[derive(Default)]
struct Slot {
    cached: Option<CachedSnapshot>,
    generation: u64,
}

pub struct SnapshotCache {
    ttl: Duration,
    slot: Mutex<Slot>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached snapshot while it is younger than the TTL,
    /// otherwise reloads from `store`. Failed loads are not cached.
    pub fn get_or_refresh(
        &self,
        store: &dyn MappingStore,
    ) -> Result<Arc<MappingSnapshot>, MappingError> {
        self.get_or_refresh_at(store, Instant::now())
    }

    pub(crate) fn get_or_refresh_at(
        &self,
        store: &dyn MappingStore,
        now: Instant,
    ) -> Result<Arc<MappingSnapshot>, MappingError> {
        let generation = {
            let slot = self.slot.lock();
            if let Some(snapshot) = self.fresh_in(&slot, now) {
                tracing::debug!("snapshot cache hit");
                return Ok(snapshot);
            }
            slot.generation
        };

        tracing::debug!("snapshot cache miss; reloading");
        let snapshot = Arc::new(load_snapshot(store)?);

        let mut slot = self.slot.lock();
        if slot.generation == generation {
            slot.cached = Some(CachedSnapshot {
                snapshot: snapshot.clone(),
                stored_at: now,
            });
        } else {
            tracing::debug!("cache invalidated during load; snapshot not stored");
        }
        Ok(snapshot)
    }

    fn fresh_in(&self, slot: &Slot, now: Instant) -> Option<Arc<MappingSnapshot>> {
        let cached = slot.cached.as_ref()?;
        let age = now.saturating_duration_since(cached.stored_at);
        (age < self.ttl).then(|| cached.snapshot.clone())
    }

    /// True when the next read would be served from the cache.
    pub fn is_fresh(&self) -> bool {
        let slot = self.slot.lock();
        self.fresh_in(&slot, Instant::now()).is_some()
    }

    /// Drops the cached snapshot so the next read goes to the store. Loads
    /// already in flight will not be stored.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        if slot.cached.take().is_some() {
            tracing::debug!("snapshot cache invalidated");
        }
    }
}
