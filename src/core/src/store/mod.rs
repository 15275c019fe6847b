//! Tenant-scoped versioned key/value storage abstraction
//!
//! Every operation is scoped by `(base_table, tenant, namespace)`. Values are
//! JSON documents carrying a monotonically increasing version; updates may
//! require the caller-known prior version (optimistic concurrency) when the
//! backend supports it. The engine assumes nothing beyond "last write wins
//! unless the version check fails".

pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Version passed to [`DataStore::update`] to skip the optimistic check
pub const ANY_VERSION: u64 = 0;

/// Addressing scope for every store operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreScope {
    /// Logical table (e.g. "principals", "roles", "hash_index")
    pub base_table: String,

    /// Tenant (organization) the rows belong to
    pub tenant: String,

    /// Namespace partition within the tenant; empty for
    /// namespace-independent tables (organizations, principals)
    pub namespace: String,
}

impl StoreScope {
    /// Create a namespace-scoped table reference
    pub fn new(
        base_table: impl Into<String>,
        tenant: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            base_table: base_table.into(),
            tenant: tenant.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a tenant-wide table reference (no namespace partition)
    pub fn tenant_wide(base_table: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self::new(base_table, tenant, "")
    }

    /// Flattened key used by backends that store all scopes in one keyspace
    pub fn partition_key(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.base_table, self.tenant, self.namespace)
    }
}

/// A stored value with its version and expiry metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    /// Monotonically increasing version, starting at 1 on create
    pub version: u64,

    /// The stored JSON document
    pub value: serde_json::Value,

    /// Absolute expiry, if the row was written with a TTL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl VersionedValue {
    /// Whether the row has outlived its TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Equality predicate for [`DataStore::query`]: every listed field of the
/// stored JSON object must render to the given string. An empty predicate
/// matches all rows.
pub type QueryPredicate = HashMap<String, String>;

/// One page of query results plus the continuation token for the next page
#[derive(Debug, Clone)]
pub struct QueryPage {
    /// (id, stored value) pairs in stable id order
    pub items: Vec<(String, VersionedValue)>,

    /// Token to resume after the last item, if more rows remain
    pub next_offset: Option<String>,
}

/// The storage seam the authorization engine depends on
///
/// Backends must be safe for concurrent readers and writers; rows are
/// replaced wholesale, never mutated in place.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Fetch rows by id. Missing or expired ids are simply absent from the
    /// result; callers that require presence raise `NotFound` themselves.
    async fn get(
        &self,
        scope: &StoreScope,
        ids: &[String],
    ) -> Result<HashMap<String, VersionedValue>>;

    /// Scan rows matching `predicate`, resuming after `offset`, returning at
    /// most `limit` rows per page.
    async fn query(
        &self,
        scope: &StoreScope,
        predicate: &QueryPredicate,
        offset: Option<&str>,
        limit: usize,
    ) -> Result<QueryPage>;

    /// Insert a new row at version 1. Fails with a `Database` error if the
    /// id already exists.
    async fn create(
        &self,
        scope: &StoreScope,
        id: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<u64>;

    /// Replace an existing row. `expected_version` of [`ANY_VERSION`] skips
    /// the optimistic check; otherwise a mismatch fails with a `Database`
    /// error. Returns the new version.
    async fn update(
        &self,
        scope: &StoreScope,
        id: &str,
        expected_version: u64,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<u64>;

    /// Remove a row; `NotFound` if it does not exist.
    async fn delete(&self, scope: &StoreScope, id: &str) -> Result<()>;

    /// Number of live rows in the scope.
    async fn size(&self, scope: &StoreScope) -> Result<usize>;
}

/// Render a JSON field the way [`DataStore::query`] predicates compare it
pub(crate) fn field_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
