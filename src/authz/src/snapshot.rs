//! Principal snapshot: the fully resolved, cached view of everything a
//! principal can reach
//!
//! All I/O happens here, before the pure resolution engine runs. The cache
//! is capacity-bounded and TTL-expiring behind a single mutex; entries are
//! replaced wholesale, never mutated in place.

use crate::error::Result;
use crate::hierarchy::{Flattened, HierarchyResolver};
use crate::model::{Group, Permission, Principal, Relationship, Resource, Role};
use crate::registry::Registry;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Immutable, fully resolved view of a principal's reachable entities
#[derive(Debug, Clone)]
pub struct PrincipalSnapshot {
    /// Owning organization
    pub organization_id: String,

    /// The principal as loaded when the snapshot was built
    pub principal: Principal,

    /// Flattened group closure, keyed by id
    pub groups: HashMap<String, Group>,

    /// Flattened role closure, keyed by id
    pub roles: HashMap<String, Role>,

    /// Permissions reachable directly or via any resolved role, keyed by id
    pub permissions: HashMap<String, Permission>,

    /// Permission ids indexed by the name of the resource they bind to
    pub permissions_by_resource: HashMap<String, Vec<String>>,

    /// Every resource referenced by a reachable permission, keyed by id
    pub resources: HashMap<String, Resource>,

    /// Relationships this principal participates in
    pub relationships: Vec<Relationship>,
}

impl PrincipalSnapshot {
    /// Flattened group names, for `HasGroup`
    pub fn group_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self.groups.values().map(|g| g.name.clone()).collect();
        names.into_iter().collect()
    }

    /// Flattened role names, for `HasRole`
    pub fn role_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self.roles.values().map(|r| r.name.clone()).collect();
        names.into_iter().collect()
    }

    /// Group ids in stable order
    pub fn group_ids(&self) -> BTreeSet<String> {
        self.groups.keys().cloned().collect()
    }

    /// Role ids in stable order
    pub fn role_ids(&self) -> BTreeSet<String> {
        self.roles.keys().cloned().collect()
    }

    /// Relationships attached to one resource, keyed by relation name
    pub fn relations_for(&self, resource_id: &str) -> HashMap<String, &Relationship> {
        self.relationships
            .iter()
            .filter(|rel| rel.resource_id == resource_id)
            .map(|rel| (rel.relation.clone(), rel))
            .collect()
    }
}

struct CachedSnapshot {
    snapshot: Arc<PrincipalSnapshot>,
    cached_at: Instant,
}

/// Assembles and caches principal snapshots
pub struct SnapshotBuilder {
    registry: Arc<Registry>,
    resolver: HierarchyResolver,
    cache: Mutex<LruCache<(String, String), CachedSnapshot>>,
}

impl SnapshotBuilder {
    /// Create a builder with the cache sized from the registry's config
    pub fn new(registry: Arc<Registry>) -> Self {
        let capacity = NonZeroUsize::new(registry.config().snapshot_cache_capacity.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            resolver: HierarchyResolver::new(registry.clone()),
            registry,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get the snapshot for `(organization, principal)`, reusing the cached
    /// one when it is inside its TTL, the principal record is unchanged,
    /// and the memoized hierarchy closure is still current.
    pub async fn snapshot(
        &self,
        organization_id: &str,
        principal_id: &str,
    ) -> Result<Arc<PrincipalSnapshot>> {
        let key = (organization_id.to_string(), principal_id.to_string());
        let ttl = self.registry.config().snapshot_cache_ttl;

        let cached = {
            let mut cache = self.cache.lock();
            cache.get(&key).and_then(|entry| {
                if entry.cached_at.elapsed() <= ttl {
                    Some(entry.snapshot.clone())
                } else {
                    None
                }
            })
        };

        if let Some(snapshot) = cached {
            let principal = self
                .registry
                .get_principal(organization_id, principal_id)
                .await?;
            let unchanged = principal.version == snapshot.principal.version
                && self
                    .resolver
                    .closure_is_current(&principal, &snapshot.group_ids(), &snapshot.role_ids())
                    .await?;
            if unchanged {
                debug!(principal = principal_id, "snapshot cache hit");
                return Ok(snapshot);
            }
            debug!(principal = principal_id, "snapshot cache stale");
        }

        let snapshot = Arc::new(self.build(organization_id, principal_id).await?);
        let mut cache = self.cache.lock();
        cache.put(
            key,
            CachedSnapshot {
                snapshot: snapshot.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(snapshot)
    }

    /// Drop every cached snapshot
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Build a fresh snapshot from the store
    async fn build(
        &self,
        organization_id: &str,
        principal_id: &str,
    ) -> Result<PrincipalSnapshot> {
        let principal = self
            .registry
            .get_principal(organization_id, principal_id)
            .await?;

        let Flattened { groups, roles } = self.resolver.flatten(&principal).await?;

        // Permissions come in directly and through every resolved role
        let mut permission_ids: BTreeSet<String> =
            principal.permission_ids.iter().cloned().collect();
        for role in roles.values() {
            permission_ids.extend(role.permission_ids.iter().cloned());
        }
        let permission_ids: Vec<String> = permission_ids.into_iter().collect();
        let permissions = self
            .registry
            .get_permissions(organization_id, &permission_ids)
            .await?;

        let resource_ids: BTreeSet<String> = permissions
            .values()
            .map(|p| p.resource_id.clone())
            .collect();
        let resource_ids: Vec<String> = resource_ids.into_iter().collect();
        let resources = self
            .registry
            .get_resources(organization_id, &resource_ids)
            .await?;

        let mut permissions_by_resource: HashMap<String, Vec<String>> = HashMap::new();
        for permission in permissions.values() {
            if let Some(resource) = resources.get(&permission.resource_id) {
                permissions_by_resource
                    .entry(resource.name.clone())
                    .or_default()
                    .push(permission.id.clone());
            }
        }
        // Stable iteration order for the resolution engine
        for ids in permissions_by_resource.values_mut() {
            ids.sort();
        }

        let relationships = self
            .registry
            .get_relationships(organization_id, &principal.relationship_ids)
            .await?
            .into_values()
            .collect();

        debug!(
            principal = principal_id,
            permissions = permissions.len(),
            resources = resources.len(),
            "snapshot built"
        );

        Ok(PrincipalSnapshot {
            organization_id: organization_id.to_string(),
            principal,
            groups,
            roles,
            permissions,
            permissions_by_resource,
            resources,
            relationships,
        })
    }
}
