//! Permissions: (scope, actions, effect, constraint) rules bound to a resource

use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The outcome a matched permission asserts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    /// Grant the action
    Permitted,
    /// Refuse the action; deny overrides permit on conflict
    Denied,
}

impl Effect {
    /// Stable ordinal, hashed as a fixed-width big-endian word
    pub fn ordinal(&self) -> u32 {
        match self {
            Effect::Permitted => 0,
            Effect::Denied => 1,
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Permitted => write!(f, "PERMITTED"),
            Effect::Denied => write!(f, "DENIED"),
        }
    }
}

/// A rule granting or refusing actions on one resource, optionally gated by
/// a constraint expression evaluated per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    /// Opaque permission identifier
    pub id: String,

    /// Record version, incremented by the store on every update
    #[serde(default)]
    pub version: u64,

    /// Namespace partition
    pub namespace: String,

    /// Request scope this permission applies to; `*` matches any
    #[serde(default)]
    pub scope: String,

    /// Actions covered, at least one; may include `*`
    pub actions: Vec<String>,

    /// Resource this permission is bound to
    pub resource_id: String,

    /// Granted or refused when matched
    pub effect: Effect,

    /// Optional constraint expression; empty means unconditional
    #[serde(default)]
    pub constraints: String,

    /// Last modification time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Create a new permission with a minted ID
    pub fn new(
        namespace: impl Into<String>,
        resource_id: impl Into<String>,
        actions: Vec<String>,
        effect: Effect,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 0,
            namespace: namespace.into(),
            scope: "*".to_string(),
            actions,
            resource_id: resource_id.into(),
            effect,
            constraints: String::new(),
            updated_at: Utc::now(),
        }
    }

    /// Set the request scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set the constraint expression
    pub fn with_constraints(mut self, constraints: impl Into<String>) -> Self {
        self.constraints = constraints.into();
        self
    }

    /// Validate structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(AuthzError::validation("permission namespace cannot be empty"));
        }
        if self.resource_id.is_empty() {
            return Err(AuthzError::validation(
                "permission must reference a resource",
            ));
        }
        if self.actions.is_empty() {
            return Err(AuthzError::validation(
                "permission must cover at least one action",
            ));
        }
        Ok(())
    }

    /// Whether this permission applies to the requested scope and action
    pub fn matches(&self, scope: &str, action: &str) -> bool {
        (self.scope == "*" || self.scope == scope)
            && self.actions.iter().any(|a| a == "*" || a == action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        let perm = Permission::new("sales", "res1", vec!["read".to_string()], Effect::Permitted);
        assert!(perm.validate().is_ok());

        let perm = Permission::new("sales", "", vec!["read".to_string()], Effect::Permitted);
        assert!(perm.validate().is_err());

        let perm = Permission::new("sales", "res1", vec![], Effect::Denied);
        assert!(perm.validate().is_err());
    }

    #[test]
    fn test_scope_and_action_matching() {
        let perm = Permission::new("sales", "res1", vec!["read".to_string()], Effect::Permitted)
            .with_scope("reports");

        assert!(perm.matches("reports", "read"));
        assert!(!perm.matches("billing", "read"));
        assert!(!perm.matches("reports", "write"));

        let any = Permission::new("sales", "res1", vec!["*".to_string()], Effect::Permitted);
        assert!(any.matches("anything", "delete"));
    }

    #[test]
    fn test_effect_ordinals_are_stable() {
        assert_eq!(Effect::Permitted.ordinal(), 0);
        assert_eq!(Effect::Denied.ordinal(), 1);
        assert_eq!(Effect::Denied.to_string(), "DENIED");
    }
}
