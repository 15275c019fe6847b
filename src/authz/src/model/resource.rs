//! Resources and capacity-tracking instances

use super::Attributes;
use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The object being accessed. Resource names may contain `*` wildcards and
/// are matched against request names at check time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Opaque resource identifier
    pub id: String,

    /// Record version, incremented by the store on every update
    #[serde(default)]
    pub version: u64,

    /// Namespace partition
    pub namespace: String,

    /// Resource name; may contain `*` wildcards (e.g. `urn:org-sales-*`)
    pub name: String,

    /// Maximum concurrent instances; 0 disables capacity tracking
    #[serde(default)]
    pub capacity: u32,

    /// Actions this resource supports, at least one
    pub allowed_actions: Vec<String>,

    /// Dynamic attributes, merged into the constraint evaluation context
    #[serde(default)]
    pub attributes: Attributes,

    /// Last modification time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// Create a new resource with a minted ID
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        allowed_actions: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 0,
            namespace: namespace.into(),
            name: name.into(),
            capacity: 0,
            allowed_actions,
            attributes: Attributes::new(),
            updated_at: Utc::now(),
        }
    }

    /// Set the capacity limit
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Add a dynamic attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Validate structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(AuthzError::validation("resource namespace cannot be empty"));
        }
        if self.name.is_empty() {
            return Err(AuthzError::validation("resource name cannot be empty"));
        }
        if self.allowed_actions.is_empty() {
            return Err(AuthzError::validation(
                "resource must allow at least one action",
            ));
        }
        Ok(())
    }

    /// Whether the resource supports the given action
    pub fn allows_action(&self, action: &str) -> bool {
        self.allowed_actions
            .iter()
            .any(|a| a == action || a == "*")
    }
}

/// Lifecycle state of an allocated resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceState {
    /// Counted against the resource capacity
    Allocated,
    /// Released back to the pool
    Released,
}

/// A quota-tracking claim of a resource by a principal.
///
/// Identity is derivable, not random: the ID is the content hash of
/// `(resource_id, principal_id)`, so re-allocating is idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstance {
    /// Derived identifier, `hash(resource_id, principal_id)`
    pub id: String,

    /// Record version, incremented by the store on every update
    #[serde(default)]
    pub version: u64,

    /// Namespace partition
    pub namespace: String,

    /// Resource being claimed
    pub resource_id: String,

    /// Claiming principal
    pub principal_id: String,

    /// Allocation state
    pub state: InstanceState,

    /// Last modification time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ResourceInstance {
    /// Create an instance; `id` comes from the identity hasher
    pub fn new(
        id: impl Into<String>,
        namespace: impl Into<String>,
        resource_id: impl Into<String>,
        principal_id: impl Into<String>,
        state: InstanceState,
    ) -> Self {
        Self {
            id: id.into(),
            version: 0,
            namespace: namespace.into(),
            resource_id: resource_id.into(),
            principal_id: principal_id.into(),
            state,
            updated_at: Utc::now(),
        }
    }

    /// Validate structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty()
            || self.resource_id.is_empty()
            || self.principal_id.is_empty()
        {
            return Err(AuthzError::validation(
                "resource instance requires namespace, resource id, and principal id",
            ));
        }
        Ok(())
    }
}
