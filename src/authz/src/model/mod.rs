//! Entity records and per-type structural validation
//!
//! Entities reference each other by ID only; nothing owns anything
//! transitively. All graphs (role parents, group memberships, permission
//! resources) are resolved by lookup at read time.

pub mod organization;
pub mod permission;
pub mod principal;
pub mod relationship;
pub mod resource;
pub mod role;

pub use organization::Organization;
pub use permission::{Effect, Permission};
pub use principal::Principal;
pub use relationship::Relationship;
pub use resource::{InstanceState, Resource, ResourceInstance};
pub use role::{Group, Role};

use std::collections::HashMap;

/// Upper bound on dynamic attribute entries per entity
pub const MAX_ATTRIBUTES: usize = 255;

/// Dynamic string attributes attached to principals, resources, and
/// relationships; usable from constraint expressions
pub type Attributes = HashMap<String, String>;
