//! Ragmap Mapping Storage
//!
//! Reads and edits the "tenant → knowledge-base" mapping table:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      MAPPING STORAGE                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌─────────────┐     ┌───────────────┐     ┌──────────────────┐     │
//! │  │ rag sources │────►│    Source     │────►│    Reconciler    │     │
//! │  │  (catalog)  │     │    Catalog    │     │ (display names)  │     │
//! │  └─────────────┘     └───────────────┘     └──────────────────┘     │
//! │         │                    ▲                                      │
//! │         │            ┌───────┴───────┐     ┌──────────────────┐     │
//! │         └───────────►│   Snapshot    │◄────│    Mutation      │     │
//! │  ┌─────────────┐     │    Cache      │ inv │    Dispatcher    │     │
//! │  │   tenant    │────►│  (fixed TTL)  │     │ create/update/del│     │
//! │  │   mapping   │     └───────────────┘     └──────────────────┘     │
//! │  └─────────────┘                                                    │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Graceful display**: a code missing from the catalog is shown raw, never an error
//! - **Cached reads**: one global snapshot, fixed TTL, explicit invalidation
//! - **Single-row writes**: every mutation touches exactly one row and invalidates on success
//! - **Pluggable store**: PostgREST over HTTPS, or in memory for tests

pub mod cache;
pub mod catalog;
pub mod dispatch;
pub mod loader;
pub mod memory;
pub mod rest;

#[cfg(test)]
mod tests;

use std::fmt;

pub use cache::{MappingSnapshot, SnapshotCache, DEFAULT_CACHE_TTL};
pub use catalog::{default_selection, display_options, reconcile, resolve_display, SourceCatalog, TenantView};
pub use dispatch::MutationDispatcher;
pub use loader::{load_snapshot, load_sources, load_tenants};
pub use memory::{CallCounts, MemoryStore};
pub use rest::PostgrestStore;

// ============================================================================
// External schema
// ============================================================================

/// Collection holding one row per tenant.
pub const TENANT_TABLE: &str = "tenant mapping";
/// Collection holding the knowledge-base source catalog.
pub const SOURCE_TABLE: &str = "rag sources";

pub const TENANT_ID_COLUMN: &str = "id";
pub const TENANT_CONTACT_COLUMN: &str = "WhatsApp number";
/// Shared by both collections: the tenant's chosen code and the catalog key.
pub const SOURCE_CODE_COLUMN: &str = "RAG source";
pub const SOURCE_NAME_COLUMN: &str = "source name";

/// Stored when a tenant row carries no source code.
pub const DEFAULT_SOURCE_CODE: &str = "Default";

// ============================================================================
// Core Types
// ============================================================================

/// Externally assigned row id of a tenant mapping.
///
/// The store may hand these out as integers or strings; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque knowledge-base source code (`RAG source`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceCode(String);

impl SourceCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The sentinel code for rows without a source.
    pub fn default_sentinel() -> Self {
        Self(DEFAULT_SOURCE_CODE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One entry of the knowledge-base catalog. Read-only to this system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseSource {
    pub code: SourceCode,
    pub display_name: String,
}

impl KnowledgeBaseSource {
    pub fn new(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            code: SourceCode::new(code),
            display_name: display_name.into(),
        }
    }
}

/// One tenant row: a contact identifier routed to a knowledge-base source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantMapping {
    pub id: TenantId,
    /// Usually a WhatsApp number.
    pub contact: String,
    pub source_code: SourceCode,
}

// ============================================================================
// Errors
// ============================================================================

/// Failure talking to the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store url `{url}`: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("request to `{table}` failed: {source}")]
    Transport {
        table: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("`{table}` returned HTTP {status}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode `{table}` rows: {message}")]
    Decode { table: String, message: String },

    #[error("row `{id}` not found in `{table}`")]
    RowNotFound { table: String, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The error kinds an operator action can end in.
///
/// All of them are recovered at the triggering action: the action is
/// aborted and state is left unchanged.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("data access failed: {0}")]
    DataAccess(#[from] StoreError),

    #[error("{0}")]
    Validation(String),

    #[error("deletion must be confirmed before it is attempted")]
    ConfirmationRequired,
}

impl MappingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataAccess(_) => "data_access",
            Self::Validation(_) => "validation",
            Self::ConfirmationRequired => "confirmation_required",
        }
    }
}

// ============================================================================
// Store seam
// ============================================================================

/// The relational store, as seen by this system: two collections,
/// select-all plus single-row insert/update/delete on the tenant one.
pub trait MappingStore: Send + Sync {
    fn select_sources(&self) -> Result<Vec<KnowledgeBaseSource>, StoreError>;

    /// All tenant rows, in whatever order the store returns them.
    fn select_tenants(&self) -> Result<Vec<TenantMapping>, StoreError>;

    /// Inserts one row and returns its newly assigned id.
    fn insert_tenant(&self, contact: &str, source: &SourceCode) -> Result<TenantId, StoreError>;

    fn update_tenant_source(&self, id: &TenantId, source: &SourceCode) -> Result<(), StoreError>;

    fn delete_tenant(&self, id: &TenantId) -> Result<(), StoreError>;
}
