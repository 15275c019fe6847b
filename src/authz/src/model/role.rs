//! Roles and groups: hierarchical membership collections
//!
//! Both form directed graphs via parent-ID lists. Expansion is bounded by
//! depth, not cycle detection; see the hierarchy resolver.

use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named collection of permissions, assignable to principals directly or
/// through groups. Roles may inherit from parent roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Opaque role identifier
    pub id: String,

    /// Record version, incremented by the store on every update
    #[serde(default)]
    pub version: u64,

    /// Namespace partition
    pub namespace: String,

    /// Role name, unique per namespace
    pub name: String,

    /// Permissions granted by this role
    #[serde(default)]
    pub permission_ids: Vec<String>,

    /// Parent roles this role inherits from
    #[serde(default)]
    pub parent_ids: Vec<String>,

    /// Last modification time; drives hierarchy cache invalidation
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Create a new role with a minted ID
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 0,
            namespace: namespace.into(),
            name: name.into(),
            permission_ids: Vec::new(),
            parent_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Grant a permission
    pub fn with_permission(mut self, permission_id: impl Into<String>) -> Self {
        self.permission_ids.push(permission_id.into());
        self
    }

    /// Add a parent role
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_ids.push(parent_id.into());
        self
    }

    /// Validate structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(AuthzError::validation("role namespace cannot be empty"));
        }
        if self.name.is_empty() {
            return Err(AuthzError::validation("role name cannot be empty"));
        }
        if self.parent_ids.iter().any(|p| p == &self.id) {
            return Err(AuthzError::validation(format!(
                "role '{}' cannot be its own parent",
                self.name
            )));
        }
        Ok(())
    }
}

/// A named collection of roles, assignable to principals. Groups may
/// inherit from parent groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Opaque group identifier
    pub id: String,

    /// Record version, incremented by the store on every update
    #[serde(default)]
    pub version: u64,

    /// Namespace partition
    pub namespace: String,

    /// Group name, unique per namespace
    pub name: String,

    /// Roles carried by this group
    #[serde(default)]
    pub role_ids: Vec<String>,

    /// Parent groups this group inherits from
    #[serde(default)]
    pub parent_ids: Vec<String>,

    /// Last modification time; drives hierarchy cache invalidation
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// Create a new group with a minted ID
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 0,
            namespace: namespace.into(),
            name: name.into(),
            role_ids: Vec::new(),
            parent_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Attach a role
    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.role_ids.push(role_id.into());
        self
    }

    /// Add a parent group
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_ids.push(parent_id.into());
        self
    }

    /// Validate structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(AuthzError::validation("group namespace cannot be empty"));
        }
        if self.name.is_empty() {
            return Err(AuthzError::validation("group name cannot be empty"));
        }
        if self.parent_ids.iter().any(|p| p == &self.id) {
            return Err(AuthzError::validation(format!(
                "group '{}' cannot be its own parent",
                self.name
            )));
        }
        Ok(())
    }
}
