//! Relationships: typed principal-to-resource edges (ReBAC)

use super::Attributes;
use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named edge between a principal and a resource, carrying attributes
/// that constraint expressions can read through the `Relations` context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Opaque relationship identifier
    pub id: String,

    /// Record version, incremented by the store on every update
    #[serde(default)]
    pub version: u64,

    /// Namespace partition
    pub namespace: String,

    /// Relation name (e.g. "owner", "editor", "on-call")
    pub relation: String,

    /// Principal side of the edge
    pub principal_id: String,

    /// Resource side of the edge
    pub resource_id: String,

    /// Dynamic attributes exposed to constraints
    #[serde(default)]
    pub attributes: Attributes,

    /// Last modification time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a new relationship with a minted ID
    pub fn new(
        namespace: impl Into<String>,
        relation: impl Into<String>,
        principal_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 0,
            namespace: namespace.into(),
            relation: relation.into(),
            principal_id: principal_id.into(),
            resource_id: resource_id.into(),
            attributes: Attributes::new(),
            updated_at: Utc::now(),
        }
    }

    /// Add a dynamic attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Validate structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(AuthzError::validation("relationship namespace cannot be empty"));
        }
        if self.relation.is_empty() {
            return Err(AuthzError::validation("relationship relation cannot be empty"));
        }
        if self.principal_id.is_empty() {
            return Err(AuthzError::validation(
                "relationship must reference a principal",
            ));
        }
        if self.resource_id.is_empty() {
            return Err(AuthzError::validation(
                "relationship must reference a resource",
            ));
        }
        Ok(())
    }
}
