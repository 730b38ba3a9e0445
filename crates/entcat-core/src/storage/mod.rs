//! Storage layer for catalogs.
//!
//! This module provides a sled-backed store with unique-constraint
//! enforcement and an append-only audit history.

mod audit;
mod config;
mod store;
mod unique_index;

pub use audit::{AuditEntity, AuditEntry, AuditLog, MutationOp};
pub use config::StorageConfig;
pub use store::{
    payload_digest, CatalogStore, UpsertOutcome, CATALOG_ENTERPRISE_QUERY_CONSTRAINT,
    CATALOG_PKEY_CONSTRAINT, METADATA_KEY_CONSTRAINT, QUERY_HASH_CONSTRAINT, QUERY_PKEY_CONSTRAINT,
};
pub use unique_index::UniqueIndex;
