//! Portcullis authorization engine
//!
//! A multi-tenant policy decision point combining role-based, attribute-based
//! and relationship-based access control. Entities (organizations,
//! principals, resources, roles, groups, permissions, relationships) are
//! persisted through a tenant-scoped versioned store and deduplicated by
//! content hash. Checks run against an immutable principal snapshot: the
//! principal's group and role hierarchies flattened to bounded depth, the
//! permissions and resources they reach, and their relationships.
//! Permissions may carry constraint expressions evaluated per request
//! against a context of principal, resource, relation and caller attributes.
//!
//! ```no_run
//! use portcullis_authz::{AuthRequest, Authorizer, Registry};
//! use portcullis_core::{Config, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn demo() -> portcullis_authz::Result<()> {
//! let registry = Arc::new(Registry::new(Arc::new(MemoryStore::new()), Config::default()));
//! let authorizer = Authorizer::new(registry);
//! let request = AuthRequest::new("org-id", "sales", "principal-id", "read", "report");
//! let response = authorizer.check(&request).await?;
//! assert!(response.is_permitted());
//! # Ok(())
//! # }
//! ```

pub mod constraints;
pub mod engine;
pub mod error;
pub mod hash;
pub mod hierarchy;
pub mod model;
pub mod registry;
pub mod snapshot;

pub use constraints::{Evaluator, Value};
pub use engine::{
    AuthRequest, AuthResponse, Authorizer, CODE_AMBIGUOUS, CODE_CONFLICT, CODE_NO_PERMISSIONS,
    CODE_NO_RESOURCE,
};
pub use error::{AuthzError, Result};
pub use hierarchy::{Flattened, HierarchyResolver};
pub use model::{
    Effect, Group, InstanceState, Organization, Permission, Principal, Relationship, Resource,
    ResourceInstance, Role,
};
pub use registry::Registry;
pub use snapshot::{PrincipalSnapshot, SnapshotBuilder};
