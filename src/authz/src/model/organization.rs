//! Organization: the tenant root

use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant. Every other entity is scoped by an organization ID, and most
/// are further partitioned by one of the organization's namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Opaque organization identifier
    pub id: String,

    /// Record version, incremented by the store on every update
    #[serde(default)]
    pub version: u64,

    /// Organization name
    pub name: String,

    /// Organization home URL
    #[serde(default)]
    pub url: String,

    /// Allowed namespaces, ordered, at least one
    pub namespaces: Vec<String>,

    /// Last modification time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Create a new organization with a minted ID
    pub fn new(name: impl Into<String>, namespaces: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 0,
            name: name.into(),
            url: String::new(),
            namespaces,
            updated_at: Utc::now(),
        }
    }

    /// Set the organization URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Validate structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AuthzError::validation("organization name cannot be empty"));
        }
        if self.namespaces.is_empty() {
            return Err(AuthzError::validation(
                "organization must define at least one namespace",
            ));
        }
        if self.namespaces.iter().any(String::is_empty) {
            return Err(AuthzError::validation(
                "organization namespaces cannot be empty strings",
            ));
        }
        Ok(())
    }

    /// Whether the organization allows the given namespace
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| ns == namespace)
    }
}
