//! Identity hasher and dedup index
//!
//! Each entity type hashes the fields that define its semantic identity
//! (case-insensitive names, sorted action lists, namespace, scope, effect
//! ordinal, constraint text). The resulting digest keys two things in the
//! same index table: duplicate detection at create time, and memoized
//! role/group closures per principal.

use crate::model::{
    Group, Organization, Permission, Principal, Relationship, Resource, Role,
};
use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base table holding hash index rows
pub const HASH_INDEX_TABLE: &str = "hash_index";

/// A content-hash → ID-set row, timestamped for cache invalidation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashIndex {
    /// Hex digest this row is keyed by
    pub hash: String,

    /// Entity IDs registered under the hash
    pub ids: Vec<String>,

    /// When the row was last (re)written
    pub updated_at: DateTime<Utc>,
}

impl HashIndex {
    /// Create a row for a single id, stamped now
    pub fn single(hash: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ids: vec![id.into()],
            updated_at: Utc::now(),
        }
    }

    /// Create a row for a flattened closure, stamped now
    pub fn closure(hash: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            hash: hash.into(),
            ids,
            updated_at: Utc::now(),
        }
    }
}

/// Index key memoizing a principal's flattened group closure
pub fn group_closure_key(principal_id: &str) -> String {
    format!("group-hash-index:{}", principal_id)
}

/// Index key memoizing a principal's flattened role closure
pub fn role_closure_key(principal_id: &str) -> String {
    format!("role-hash-index:{}", principal_id)
}

// Field separator keeps ("ab","c") and ("a","bc") from colliding.
const SEP: [u8; 1] = [0x1f];

fn update(hasher: &mut Hasher, field: &str) {
    hasher.update(field.as_bytes());
    hasher.update(&SEP);
}

fn update_lower(hasher: &mut Hasher, field: &str) {
    update(hasher, &field.to_lowercase());
}

fn update_sorted_lower(hasher: &mut Hasher, fields: &[String]) {
    let mut sorted: Vec<String> = fields.iter().map(|f| f.to_lowercase()).collect();
    sorted.sort();
    for field in &sorted {
        update(hasher, field);
    }
}

fn digest(hasher: Hasher) -> String {
    hasher.finalize().to_hex().to_string()
}

/// Semantic identity hash of an organization: case-insensitive name
pub fn organization_hash(org: &Organization) -> String {
    let mut hasher = Hasher::new();
    update(&mut hasher, "organization");
    update_lower(&mut hasher, &org.name);
    digest(hasher)
}

/// Semantic identity hash of a principal: organization + case-insensitive
/// username
pub fn principal_hash(principal: &Principal) -> String {
    let mut hasher = Hasher::new();
    update(&mut hasher, "principal");
    update(&mut hasher, &principal.organization_id);
    update_lower(&mut hasher, &principal.username);
    digest(hasher)
}

/// Semantic identity hash of a resource: namespace + case-insensitive name
pub fn resource_hash(resource: &Resource) -> String {
    let mut hasher = Hasher::new();
    update(&mut hasher, "resource");
    update(&mut hasher, &resource.namespace);
    update_lower(&mut hasher, &resource.name);
    digest(hasher)
}

/// Semantic identity hash of a role: namespace + case-insensitive name
pub fn role_hash(role: &Role) -> String {
    let mut hasher = Hasher::new();
    update(&mut hasher, "role");
    update(&mut hasher, &role.namespace);
    update_lower(&mut hasher, &role.name);
    digest(hasher)
}

/// Semantic identity hash of a group: namespace + case-insensitive name
pub fn group_hash(group: &Group) -> String {
    let mut hasher = Hasher::new();
    update(&mut hasher, "group");
    update(&mut hasher, &group.namespace);
    update_lower(&mut hasher, &group.name);
    digest(hasher)
}

/// Semantic identity hash of a permission: namespace, scope, sorted
/// lowercased actions, resource, effect ordinal (fixed-width big-endian),
/// constraint text
pub fn permission_hash(permission: &Permission) -> String {
    let mut hasher = Hasher::new();
    update(&mut hasher, "permission");
    update(&mut hasher, &permission.namespace);
    update(&mut hasher, &permission.scope);
    update_sorted_lower(&mut hasher, &permission.actions);
    update(&mut hasher, &permission.resource_id);
    hasher.update(&permission.effect.ordinal().to_be_bytes());
    hasher.update(&SEP);
    update(&mut hasher, &permission.constraints);
    digest(hasher)
}

/// Semantic identity hash of a relationship: namespace, relation, both ends
pub fn relationship_hash(relationship: &Relationship) -> String {
    let mut hasher = Hasher::new();
    update(&mut hasher, "relationship");
    update(&mut hasher, &relationship.namespace);
    update_lower(&mut hasher, &relationship.relation);
    update(&mut hasher, &relationship.principal_id);
    update(&mut hasher, &relationship.resource_id);
    digest(hasher)
}

/// Derived resource-instance identity: `hash(resource_id, principal_id)`
pub fn resource_instance_hash(resource_id: &str, principal_id: &str) -> String {
    let mut hasher = Hasher::new();
    update(&mut hasher, "resource-instance");
    update(&mut hasher, resource_id);
    update(&mut hasher, principal_id);
    digest(hasher)
}
