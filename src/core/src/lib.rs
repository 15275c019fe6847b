//! # Portcullis Core
//!
//! Shared error handling, runtime configuration, and the tenant-scoped
//! versioned key/value storage abstraction the authorization engine sits on.
//! Concrete backends (Redis-like, DynamoDB-like) plug in behind
//! [`store::DataStore`]; an in-memory reference backend ships here.

pub mod config;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{CoreError, Result};
pub use store::{DataStore, MemoryStore, StoreScope, VersionedValue};

/// Multi-tenancy tenant identifier (organization ID)
pub type TenantId = String;

/// Namespace identifier within a tenant
pub type NamespaceId = String;
