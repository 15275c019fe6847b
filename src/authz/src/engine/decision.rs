//! Check request/response types and diagnostic codes

use crate::constraints::Value;
use crate::model::Effect;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// No usable resource matched the requested name and action
pub const CODE_NO_RESOURCE: &str = "no-resource-for-action";

/// Resources matched but no permission granted the scope/action, or every
/// matching permission was gated off by its constraints
pub const CODE_NO_PERMISSIONS: &str = "no-matching-permissions";

/// Multiple permissions produced the same effect; decision stands, but the
/// policy set is redundant
pub const CODE_AMBIGUOUS: &str = "ambiguous-permissions";

/// Matching permissions disagreed on the effect; deny wins
pub const CODE_CONFLICT: &str = "conflicting-permissions";

/// A single authorization question: may this principal perform this action
/// on this resource?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Tenant the principal belongs to
    pub organization_id: String,

    /// Namespace the resource lives in
    pub namespace: String,

    /// Principal asking
    pub principal_id: String,

    /// Action being attempted
    pub action: String,

    /// Resource name as the caller knows it; matched against stored names,
    /// which may carry `*` wildcards
    pub resource_name: String,

    /// Scope the request runs under; defaults to `*`
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Caller-supplied context merged into the constraint evaluation root
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, Value>,
}

fn default_scope() -> String {
    "*".to_string()
}

impl AuthRequest {
    /// Build a request with the default `*` scope and empty context
    pub fn new(
        organization_id: impl Into<String>,
        namespace: impl Into<String>,
        principal_id: impl Into<String>,
        action: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            namespace: namespace.into(),
            principal_id: principal_id.into(),
            action: action.into(),
            resource_name: resource_name.into(),
            scope: default_scope(),
            context: HashMap::new(),
        }
    }

    /// Set the request scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Add a caller context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// The decision, plus any non-fatal diagnostic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Final effect after aggregation
    pub effect: Effect,

    /// Empty on a clean decision; carries an ambiguity or conflict
    /// diagnostic otherwise
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl AuthResponse {
    /// A clean PERMITTED decision
    pub fn permitted() -> Self {
        Self {
            effect: Effect::Permitted,
            message: String::new(),
        }
    }

    /// A clean DENIED decision
    pub fn denied() -> Self {
        Self {
            effect: Effect::Denied,
            message: String::new(),
        }
    }

    /// Attach a diagnostic message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// True when the request was permitted
    pub fn is_permitted(&self) -> bool {
        self.effect == Effect::Permitted
    }
}
