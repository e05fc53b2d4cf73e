//! Ragmap workspace facade.
//!
//! Re-exports the library crates so workspace-level integration tests can
//! drive the storage core and the access gate together.

pub use ragmap_identity as identity;
pub use ragmap_storage as storage;
