//! Principal: the actor requesting access

use super::{Attributes, Organization, MAX_ATTRIBUTES};
use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user, service, or agent. Principals are scoped by organization only;
/// their namespaces must be a subset of the organization's.
///
/// Group, role, permission, and relationship memberships are held as raw ID
/// lists and resolved by lookup when a snapshot is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque principal identifier
    pub id: String,

    /// Record version, incremented by the store on every update
    #[serde(default)]
    pub version: u64,

    /// Owning organization
    pub organization_id: String,

    /// Namespaces this principal may operate in
    pub namespaces: Vec<String>,

    /// Unique username within the organization
    pub username: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Contact email
    #[serde(default)]
    pub email: String,

    /// Dynamic attributes, merged into the constraint evaluation context
    #[serde(default)]
    pub attributes: Attributes,

    /// Directly assigned group IDs
    #[serde(default)]
    pub group_ids: Vec<String>,

    /// Directly assigned role IDs
    #[serde(default)]
    pub role_ids: Vec<String>,

    /// Directly assigned permission IDs
    #[serde(default)]
    pub permission_ids: Vec<String>,

    /// Relationship IDs this principal participates in
    #[serde(default)]
    pub relationship_ids: Vec<String>,

    /// Last modification time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// Create a new principal with a minted ID
    pub fn new(
        organization_id: impl Into<String>,
        username: impl Into<String>,
        namespaces: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 0,
            organization_id: organization_id.into(),
            namespaces,
            username: username.into(),
            name: String::new(),
            email: String::new(),
            attributes: Attributes::new(),
            group_ids: Vec::new(),
            role_ids: Vec::new(),
            permission_ids: Vec::new(),
            relationship_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the contact email
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Add a dynamic attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Validate structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.organization_id.is_empty() {
            return Err(AuthzError::validation("principal organization cannot be empty"));
        }
        if self.username.is_empty() {
            return Err(AuthzError::validation("principal username cannot be empty"));
        }
        if self.namespaces.is_empty() {
            return Err(AuthzError::validation(
                "principal must belong to at least one namespace",
            ));
        }
        if self.attributes.len() > MAX_ATTRIBUTES {
            return Err(AuthzError::validation(format!(
                "principal carries {} attributes, maximum is {}",
                self.attributes.len(),
                MAX_ATTRIBUTES
            )));
        }
        Ok(())
    }

    /// Validate against the owning organization: namespaces must be a
    /// subset of the organization's allowed namespaces.
    pub fn validate_against(&self, organization: &Organization) -> Result<()> {
        self.validate()?;
        if self.organization_id != organization.id {
            return Err(AuthzError::validation(format!(
                "principal '{}' belongs to organization '{}', not '{}'",
                self.username, self.organization_id, organization.id
            )));
        }
        for ns in &self.namespaces {
            if !organization.has_namespace(ns) {
                return Err(AuthzError::validation(format!(
                    "namespace '{}' is not allowed by organization '{}'",
                    ns, organization.name
                )));
            }
        }
        Ok(())
    }
}
