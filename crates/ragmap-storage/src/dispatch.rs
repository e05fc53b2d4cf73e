//! Single-row mutations.
//!
//! Every operation validates before touching the store, affects exactly one
//! row, and invalidates the snapshot cache only once the store confirmed the
//! write. There is no retry; a failed call is reported once.

use crate::cache::SnapshotCache;
use crate::catalog::SourceCatalog;
use crate::{MappingError, MappingStore, TenantId};

pub struct MutationDispatcher<'a> {
    store: &'a dyn MappingStore,
    cache: &'a SnapshotCache,
}

impl<'a> MutationDispatcher<'a> {
    pub fn new(store: &'a dyn MappingStore, cache: &'a SnapshotCache) -> Self {
        Self { store, cache }
    }

    /// Presence checks for [`create`](Self::create). They need no catalog,
    /// so callers can run them before loading one.
    pub fn validate_create(contact: &str, chosen_name: &str) -> Result<(), MappingError> {
        if contact.trim().is_empty() {
            return Err(MappingError::validation("a contact number is required"));
        }
        require_choice(chosen_name)
    }

    /// Presence checks for [`update`](Self::update).
    pub fn validate_update(id: &TenantId, chosen_name: &str) -> Result<(), MappingError> {
        require_id(id)?;
        require_choice(chosen_name)
    }

    /// Adds a tenant routed to the source named `chosen_name`.
    ///
    /// `catalog` should be the snapshot the operator chose from; a name it
    /// does not know is stored verbatim as the code.
    pub fn create(
        &self,
        contact: &str,
        chosen_name: &str,
        catalog: &SourceCatalog,
    ) -> Result<TenantId, MappingError> {
        Self::validate_create(contact, chosen_name)?;
        let contact = contact.trim();

        let code = catalog.resolve_code(chosen_name);
        let id = self.store.insert_tenant(contact, &code).map_err(|e| {
            tracing::warn!(contact, error = %e, "tenant insert failed");
            e
        })?;
        self.cache.invalidate();
        tracing::info!(%id, contact, source = %code, "tenant mapping created");
        Ok(id)
    }

    /// Re-routes one tenant to the source named `chosen_name`.
    pub fn update(
        &self,
        id: &TenantId,
        chosen_name: &str,
        catalog: &SourceCatalog,
    ) -> Result<(), MappingError> {
        Self::validate_update(id, chosen_name)?;

        let code = catalog.resolve_code(chosen_name);
        self.store.update_tenant_source(id, &code).map_err(|e| {
            tracing::warn!(%id, error = %e, "tenant update failed");
            e
        })?;
        self.cache.invalidate();
        tracing::info!(%id, source = %code, "tenant mapping updated");
        Ok(())
    }

    /// Removes one tenant. Nothing is sent to the store unless `confirmed`.
    pub fn delete(&self, id: &TenantId, confirmed: bool) -> Result<(), MappingError> {
        require_id(id)?;
        if !confirmed {
            return Err(MappingError::ConfirmationRequired);
        }

        self.store.delete_tenant(id).map_err(|e| {
            tracing::warn!(%id, error = %e, "tenant delete failed");
            e
        })?;
        self.cache.invalidate();
        tracing::info!(%id, "tenant mapping deleted");
        Ok(())
    }
}

fn require_id(id: &TenantId) -> Result<(), MappingError> {
    if id.is_blank() {
        return Err(MappingError::validation("a tenant id is required"));
    }
    Ok(())
}

fn require_choice(chosen_name: &str) -> Result<(), MappingError> {
    if chosen_name.trim().is_empty() {
        return Err(MappingError::validation("choose a knowledge base"));
    }
    Ok(())
}
