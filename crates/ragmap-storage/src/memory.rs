//! In-memory store with call accounting and failure injection.
//!
//! Backs the unit and integration tests: it counts every store call so
//! tests can assert that a rejected action never reached the store, and can
//! be switched offline to exercise the data-access error path.

use parking_lot::Mutex;

use crate::{KnowledgeBaseSource, MappingStore, SourceCode, StoreError, TenantId, TenantMapping, TENANT_TABLE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub reads: usize,
    pub writes: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.reads + self.writes
    }
}

#[derive(Default)]
struct MemoryState {
    sources: Vec<KnowledgeBaseSource>,
    tenants: Vec<TenantMapping>,
    next_id: u64,
    offline: bool,
    calls: CallCounts,
}

impl MemoryState {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn position(&self, id: &TenantId) -> Result<usize, StoreError> {
        self.tenants
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| StoreError::RowNotFound {
                table: TENANT_TABLE.to_string(),
                id: id.to_string(),
            })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = KnowledgeBaseSource>,
    {
        let store = Self::new();
        store.state.lock().sources.extend(sources);
        store
    }

    /// Catalog edits happen outside this system; tests use this to simulate them.
    pub fn add_source(&self, code: &str, display_name: &str) {
        self.state
            .lock()
            .sources
            .push(KnowledgeBaseSource::new(code, display_name));
    }

    /// Seeds a tenant row without counting it as a store call.
    pub fn seed_tenant(&self, contact: &str, source: &str) -> TenantId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TenantId::new(state.next_id.to_string());
        state.tenants.push(TenantMapping {
            id: id.clone(),
            contact: contact.to_string(),
            source_code: SourceCode::new(source),
        });
        id
    }

    /// Current rows, bypassing call accounting.
    pub fn tenants(&self) -> Vec<TenantMapping> {
        self.state.lock().tenants.clone()
    }

    pub fn tenant(&self, id: &TenantId) -> Option<TenantMapping> {
        self.state.lock().tenants.iter().find(|t| &t.id == id).cloned()
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }
}

impl MappingStore for MemoryStore {
    fn select_sources(&self) -> Result<Vec<KnowledgeBaseSource>, StoreError> {
        let mut state = self.state.lock();
        state.calls.reads += 1;
        state.check_online()?;
        Ok(state.sources.clone())
    }

    fn select_tenants(&self) -> Result<Vec<TenantMapping>, StoreError> {
        let mut state = self.state.lock();
        state.calls.reads += 1;
        state.check_online()?;
        Ok(state.tenants.clone())
    }

    fn insert_tenant(&self, contact: &str, source: &SourceCode) -> Result<TenantId, StoreError> {
        let mut state = self.state.lock();
        state.calls.writes += 1;
        state.check_online()?;
        state.next_id += 1;
        let id = TenantId::new(state.next_id.to_string());
        state.tenants.push(TenantMapping {
            id: id.clone(),
            contact: contact.to_string(),
            source_code: source.clone(),
        });
        Ok(id)
    }

    fn update_tenant_source(&self, id: &TenantId, source: &SourceCode) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.calls.writes += 1;
        state.check_online()?;
        let pos = state.position(id)?;
        state.tenants[pos].source_code = source.clone();
        Ok(())
    }

    fn delete_tenant(&self, id: &TenantId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.calls.writes += 1;
        state.check_online()?;
        let pos = state.position(id)?;
        state.tenants.remove(pos);
        Ok(())
    }
}
