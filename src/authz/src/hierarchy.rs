//! Role/group hierarchy flattening
//!
//! Roles and groups form directed graphs via parent-ID lists. Resolution is
//! a level-by-level expansion from a principal's direct IDs, accumulating a
//! set until the configured depth bound. Depth bounding, not cycle
//! detection, is the termination guarantee: a cyclic parent graph still
//! halts at the limit, and nodes beyond the bound are silently dropped.
//!
//! Flattened closures are memoized as two hash-index rows per principal
//! (group and role), timestamped; the memo is discarded whenever any touched
//! role/group, or the principal itself, was modified after the row was
//! written.

use crate::error::Result;
use crate::hash::{group_closure_key, role_closure_key, HashIndex};
use crate::model::{Group, Principal, Role};
use crate::registry::Registry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A principal's fully flattened role/group membership
#[derive(Debug, Clone, Default)]
pub struct Flattened {
    /// Transitive group closure, keyed by id
    pub groups: HashMap<String, Group>,

    /// Transitive role closure, keyed by id
    pub roles: HashMap<String, Role>,
}

impl Flattened {
    /// Group ids in stable order
    pub fn group_ids(&self) -> BTreeSet<String> {
        self.groups.keys().cloned().collect()
    }

    /// Role ids in stable order
    pub fn role_ids(&self) -> BTreeSet<String> {
        self.roles.keys().cloned().collect()
    }
}

/// Flattens role and group parent chains into bounded transitive closures
pub struct HierarchyResolver {
    registry: Arc<Registry>,
}

impl HierarchyResolver {
    /// Create a resolver over a registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Flatten the principal's hierarchy, reusing the memoized closure when
    /// it is still current.
    pub async fn flatten(&self, principal: &Principal) -> Result<Flattened> {
        if let Some(cached) = self.load_cached(principal).await? {
            debug!(principal = %principal.id, "hierarchy closure cache hit");
            return Ok(cached);
        }

        let flattened = self.compute(principal).await?;
        self.memoize(principal, &flattened).await?;
        Ok(flattened)
    }

    /// Whether the memoized closure for this principal is still current and
    /// matches the given id sets. Used by the snapshot cache before reuse.
    pub async fn closure_is_current(
        &self,
        principal: &Principal,
        group_ids: &BTreeSet<String>,
        role_ids: &BTreeSet<String>,
    ) -> Result<bool> {
        match self.load_cached(principal).await? {
            Some(cached) => {
                Ok(cached.group_ids() == *group_ids && cached.role_ids() == *role_ids)
            }
            None => Ok(false),
        }
    }

    /// Recompute both closures from the store
    async fn compute(&self, principal: &Principal) -> Result<Flattened> {
        let max_levels = self.registry.config().max_group_role_levels;
        let org = &principal.organization_id;

        let groups = self
            .expand(principal.group_ids.clone(), max_levels, |id| {
                let org = org.clone();
                async move { self.registry.get_groups(&org, &id).await }
            })
            .await?;

        // Roles come in directly and through every group in the closure
        let mut role_seeds: Vec<String> = principal.role_ids.clone();
        for group in groups.values() {
            role_seeds.extend(group.role_ids.iter().cloned());
        }

        let roles = self
            .expand(role_seeds, max_levels, |id| {
                let org = org.clone();
                async move { self.registry.get_roles(&org, &id).await }
            })
            .await?;

        debug!(
            principal = %principal.id,
            groups = groups.len(),
            roles = roles.len(),
            "hierarchy closure computed"
        );

        Ok(Flattened { groups, roles })
    }

    /// Level-by-level bounded expansion over parent-ID lists. The seen set
    /// only deduplicates re-expansion work; termination comes from the
    /// depth bound.
    async fn expand<T, F, Fut>(
        &self,
        seeds: Vec<String>,
        max_levels: u32,
        load: F,
    ) -> Result<HashMap<String, T>>
    where
        T: HierarchyNode,
        F: Fn(Vec<String>) -> Fut,
        Fut: std::future::Future<Output = Result<HashMap<String, T>>>,
    {
        let mut accumulated: HashMap<String, T> = HashMap::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut frontier: Vec<String> = Vec::new();

        for id in seeds {
            if seen.insert(id.clone()) {
                frontier.push(id);
            }
        }

        for _level in 0..max_levels {
            if frontier.is_empty() {
                break;
            }
            let loaded = load(frontier.clone()).await?;

            let mut next = Vec::new();
            for (id, node) in loaded {
                for parent in node.parent_ids() {
                    if seen.insert(parent.clone()) {
                        next.push(parent.clone());
                    }
                }
                accumulated.insert(id, node);
            }
            frontier = next;
        }

        Ok(accumulated)
    }

    /// Reuse the two memo rows if neither the principal nor any member of
    /// the cached closure changed after the rows were written.
    async fn load_cached(&self, principal: &Principal) -> Result<Option<Flattened>> {
        let org = &principal.organization_id;
        let group_index = self
            .registry
            .load_closure_index(org, &group_closure_key(&principal.id))
            .await?;
        let role_index = self
            .registry
            .load_closure_index(org, &role_closure_key(&principal.id))
            .await?;

        let (group_index, role_index) = match (group_index, role_index) {
            (Some(g), Some(r)) => (g, r),
            _ => return Ok(None),
        };

        if principal.updated_at > group_index.updated_at
            || principal.updated_at > role_index.updated_at
        {
            return Ok(None);
        }

        let groups = self.registry.get_groups(org, &group_index.ids).await?;
        let roles = self.registry.get_roles(org, &role_index.ids).await?;

        let groups_stale = groups
            .values()
            .any(|g| g.updated_at > group_index.updated_at);
        let roles_stale = roles.values().any(|r| r.updated_at > role_index.updated_at);
        if groups_stale || roles_stale {
            debug!(principal = %principal.id, "hierarchy closure cache stale");
            return Ok(None);
        }

        Ok(Some(Flattened { groups, roles }))
    }

    async fn memoize(&self, principal: &Principal, flattened: &Flattened) -> Result<()> {
        let org = &principal.organization_id;
        let group_row = HashIndex::closure(
            group_closure_key(&principal.id),
            flattened.group_ids().into_iter().collect(),
        );
        let role_row = HashIndex::closure(
            role_closure_key(&principal.id),
            flattened.role_ids().into_iter().collect(),
        );
        self.registry
            .store_closure_index(org, &group_closure_key(&principal.id), &group_row)
            .await?;
        self.registry
            .store_closure_index(org, &role_closure_key(&principal.id), &role_row)
            .await?;
        Ok(())
    }
}

/// Common shape of hierarchy members (roles and groups)
pub trait HierarchyNode {
    /// Parent IDs this node inherits from
    fn parent_ids(&self) -> &[String];
}

impl HierarchyNode for Role {
    fn parent_ids(&self) -> &[String] {
        &self.parent_ids
    }
}

impl HierarchyNode for Group {
    fn parent_ids(&self) -> &[String] {
        &self.parent_ids
    }
}
