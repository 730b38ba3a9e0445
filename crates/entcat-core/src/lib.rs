//! Entcat Core - Enterprise catalogs over shared, deduplicated content queries.
//!
//! This crate provides content filter hashing, catalog query resolution,
//! content metadata projection, coverage checks and discovery sync, on top of
//! a sled-backed store with an append-only audit history.

pub mod config;
pub mod contains;
pub mod content_key;
pub mod error;
pub mod filter;
pub mod model;
pub mod projection;
pub mod resolver;
pub mod service;
pub mod storage;
pub mod sync;

pub use config::{CatalogConfig, DEFAULT_LMS_BASE_URL};
pub use contains::{CatalogContentChecker, ContainsQuery};
pub use error::{ConstraintError, Error, Result, ValidationError};
pub use filter::{content_filter_hash, ContentFilter};
pub use model::{
    CatalogQuery, ContentMetadata, ContentType, EnterpriseCatalog, EnterpriseContext,
    EnterpriseContextProvider, StaticEnterpriseContexts, DEFAULT_COURSE_MODES,
};
pub use projection::{ContentMetadataProjector, Mutability};
pub use resolver::CatalogQueryResolver;
pub use service::{CatalogDefinition, CatalogService, CatalogUpdate};
pub use storage::{AuditEntity, AuditEntry, CatalogStore, MutationOp, StorageConfig, UpsertOutcome};
pub use sync::{DiscoveryClient, DiscoveryError, DiscoverySync, StaticDiscoveryClient, SyncReport};
