//! Typed repository over the storage abstraction
//!
//! Entities are persisted as JSON documents, one base table per type,
//! physically partitioned per tenant; the namespace is a row attribute used
//! in query predicates and identity hashes. Every create runs the hash-index
//! dedup check first; invalid records never reach storage.
//!
//! Duplicate detection is a lookup-then-write sequence, not an atomic
//! check-and-set, so concurrent duplicate creation is a known race.

use crate::error::{AuthzError, Result};
use crate::hash::{self, HashIndex, HASH_INDEX_TABLE};
use crate::model::{
    Group, InstanceState, Organization, Permission, Principal, Relationship, Resource,
    ResourceInstance, Role,
};
use portcullis_core::store::{DataStore, QueryPredicate, StoreScope, ANY_VERSION};
use portcullis_core::{Config, CoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const ORGANIZATIONS_TABLE: &str = "organizations";
const PRINCIPALS_TABLE: &str = "principals";
const RESOURCES_TABLE: &str = "resources";
const ROLES_TABLE: &str = "roles";
const GROUPS_TABLE: &str = "groups";
const PERMISSIONS_TABLE: &str = "permissions";
const RELATIONSHIPS_TABLE: &str = "relationships";
const INSTANCES_TABLE: &str = "resource_instances";

const QUERY_PAGE: usize = 256;

/// Typed CRUD access to every entity type, with dedup and optimistic
/// concurrency handled uniformly.
pub struct Registry {
    store: Arc<dyn DataStore>,
    config: Config,
}

impl Registry {
    /// Create a registry over a storage backend
    pub fn new(store: Arc<dyn DataStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// The engine configuration this registry was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn scope(&self, base_table: &str, organization_id: &str) -> StoreScope {
        StoreScope::tenant_wide(self.config.table_name(base_table), organization_id)
    }

    fn hash_scope(&self, organization_id: &str) -> StoreScope {
        self.scope(HASH_INDEX_TABLE, organization_id)
    }

    // ---- generic plumbing ----------------------------------------------

    async fn load_one<T: DeserializeOwned>(
        &self,
        scope: &StoreScope,
        id: &str,
        kind: &str,
    ) -> Result<T> {
        let rows = self.store.get(scope, &[id.to_string()]).await?;
        let row = rows
            .get(id)
            .ok_or_else(|| AuthzError::not_found(format!("{} '{}'", kind, id)))?;
        let mut value = row.value.clone();
        value["version"] = serde_json::json!(row.version);
        Ok(serde_json::from_value(value)?)
    }

    async fn load_many<T: DeserializeOwned>(
        &self,
        scope: &StoreScope,
        ids: &[String],
    ) -> Result<HashMap<String, T>> {
        let rows = self.store.get(scope, ids).await?;
        let mut out = HashMap::with_capacity(rows.len());
        for (id, row) in rows {
            let mut value = row.value;
            value["version"] = serde_json::json!(row.version);
            out.insert(id, serde_json::from_value(value)?);
        }
        Ok(out)
    }

    /// Reject the create if the identity hash is already registered to a
    /// different entity, then record the hash → id mapping.
    async fn register_hash(
        &self,
        organization_id: &str,
        entity_hash: &str,
        entity_id: &str,
    ) -> Result<()> {
        let scope = self.hash_scope(organization_id);
        let existing = self.store.get(&scope, &[entity_hash.to_string()]).await?;

        if let Some(row) = existing.get(entity_hash) {
            let index: HashIndex = serde_json::from_value(row.value.clone())?;
            if !index.ids.is_empty() && !index.ids.iter().any(|id| id == entity_id) {
                debug!(hash = entity_hash, ?index.ids, "duplicate identity hash");
                return Err(AuthzError::Duplicate {
                    hash: entity_hash.to_string(),
                    existing_ids: index.ids,
                });
            }
        }

        let row = serde_json::to_value(HashIndex::single(entity_hash, entity_id))?;
        if existing.contains_key(entity_hash) {
            self.store
                .update(&scope, entity_hash, ANY_VERSION, row, None)
                .await?;
        } else {
            self.store.create(&scope, entity_hash, row, None).await?;
        }
        Ok(())
    }

    /// Release a hash-index row so the identity no longer blocks
    /// re-creation. Already-absent rows are fine.
    async fn unregister_hash(&self, organization_id: &str, key: &str) -> Result<()> {
        let scope = self.hash_scope(organization_id);
        match self.store.delete(&scope, key).await {
            Ok(()) => Ok(()),
            Err(CoreError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_row(&self, scope: &StoreScope, id: &str) -> Result<()> {
        Ok(self.store.delete(scope, id).await?)
    }

    /// Read a memoized closure row, if present
    pub(crate) async fn load_closure_index(
        &self,
        organization_id: &str,
        key: &str,
    ) -> Result<Option<HashIndex>> {
        let scope = self.hash_scope(organization_id);
        let rows = self.store.get(&scope, &[key.to_string()]).await?;
        match rows.get(key) {
            Some(row) => Ok(Some(serde_json::from_value(row.value.clone())?)),
            None => Ok(None),
        }
    }

    /// Persist a memoized closure row, replacing any prior one
    pub(crate) async fn store_closure_index(
        &self,
        organization_id: &str,
        key: &str,
        index: &HashIndex,
    ) -> Result<()> {
        let scope = self.hash_scope(organization_id);
        let row = serde_json::to_value(index)?;
        let existing = self.store.get(&scope, &[key.to_string()]).await?;
        if existing.contains_key(key) {
            self.store.update(&scope, key, ANY_VERSION, row, None).await?;
        } else {
            self.store.create(&scope, key, row, None).await?;
        }
        Ok(())
    }

    async fn persist_create<T: Serialize>(
        &self,
        scope: &StoreScope,
        id: &str,
        entity: &T,
    ) -> Result<u64> {
        let value = serde_json::to_value(entity)?;
        Ok(self.store.create(scope, id, value, None).await?)
    }

    async fn persist_update<T: Serialize>(
        &self,
        scope: &StoreScope,
        id: &str,
        expected_version: u64,
        entity: &T,
    ) -> Result<u64> {
        let value = serde_json::to_value(entity)?;
        Ok(self
            .store
            .update(scope, id, expected_version, value, None)
            .await?)
    }

    // ---- organizations --------------------------------------------------

    /// Validate, dedup, and persist a new organization
    pub async fn create_organization(&self, org: &Organization) -> Result<Organization> {
        org.validate()?;
        self.register_hash("", &hash::organization_hash(org), &org.id)
            .await?;
        let scope = self.scope(ORGANIZATIONS_TABLE, "");
        let version = self.persist_create(&scope, &org.id, org).await?;
        let mut stored = org.clone();
        stored.version = version;
        Ok(stored)
    }

    /// Load an organization by id
    pub async fn get_organization(&self, id: &str) -> Result<Organization> {
        let scope = self.scope(ORGANIZATIONS_TABLE, "");
        self.load_one(&scope, id, "organization").await
    }

    /// Update an organization under its caller-known version
    pub async fn update_organization(&self, org: &Organization) -> Result<Organization> {
        org.validate()?;
        let mut next = org.clone();
        next.updated_at = chrono::Utc::now();
        let scope = self.scope(ORGANIZATIONS_TABLE, "");
        let version = self
            .persist_update(&scope, &org.id, org.version, &next)
            .await?;
        next.version = version;
        Ok(next)
    }

    /// Delete an organization and release its identity hash
    pub async fn delete_organization(&self, id: &str) -> Result<()> {
        let org = self.get_organization(id).await?;
        self.unregister_hash("", &hash::organization_hash(&org))
            .await?;
        let scope = self.scope(ORGANIZATIONS_TABLE, "");
        self.delete_row(&scope, id).await
    }

    // ---- principals -----------------------------------------------------

    /// Validate against the owning organization, dedup by username, persist
    pub async fn create_principal(&self, principal: &Principal) -> Result<Principal> {
        let org = self.get_organization(&principal.organization_id).await?;
        principal.validate_against(&org)?;
        self.register_hash(
            &principal.organization_id,
            &hash::principal_hash(principal),
            &principal.id,
        )
        .await?;
        let scope = self.scope(PRINCIPALS_TABLE, &principal.organization_id);
        let version = self.persist_create(&scope, &principal.id, principal).await?;
        let mut stored = principal.clone();
        stored.version = version;
        Ok(stored)
    }

    /// Load a principal by id
    pub async fn get_principal(&self, organization_id: &str, id: &str) -> Result<Principal> {
        let scope = self.scope(PRINCIPALS_TABLE, organization_id);
        self.load_one(&scope, id, "principal").await
    }

    /// Update a principal under its caller-known version
    pub async fn update_principal(&self, principal: &Principal) -> Result<Principal> {
        principal.validate()?;
        let mut next = principal.clone();
        next.updated_at = chrono::Utc::now();
        let scope = self.scope(PRINCIPALS_TABLE, &principal.organization_id);
        let version = self
            .persist_update(&scope, &principal.id, principal.version, &next)
            .await?;
        next.version = version;
        Ok(next)
    }

    /// Delete a principal, its identity hash, and its memoized hierarchy
    /// closure rows
    pub async fn delete_principal(&self, organization_id: &str, id: &str) -> Result<()> {
        let principal = self.get_principal(organization_id, id).await?;
        self.unregister_hash(organization_id, &hash::principal_hash(&principal))
            .await?;
        self.unregister_hash(organization_id, &hash::group_closure_key(id))
            .await?;
        self.unregister_hash(organization_id, &hash::role_closure_key(id))
            .await?;
        let scope = self.scope(PRINCIPALS_TABLE, organization_id);
        self.delete_row(&scope, id).await
    }

    // ---- resources ------------------------------------------------------

    /// Validate, dedup, and persist a new resource
    pub async fn create_resource(
        &self,
        organization_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        resource.validate()?;
        self.register_hash(organization_id, &hash::resource_hash(resource), &resource.id)
            .await?;
        let scope = self.scope(RESOURCES_TABLE, organization_id);
        let version = self.persist_create(&scope, &resource.id, resource).await?;
        let mut stored = resource.clone();
        stored.version = version;
        Ok(stored)
    }

    /// Load a resource by id
    pub async fn get_resource(&self, organization_id: &str, id: &str) -> Result<Resource> {
        let scope = self.scope(RESOURCES_TABLE, organization_id);
        self.load_one(&scope, id, "resource").await
    }

    /// Batch-load resources; missing ids are simply absent
    pub async fn get_resources(
        &self,
        organization_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Resource>> {
        let scope = self.scope(RESOURCES_TABLE, organization_id);
        self.load_many(&scope, ids).await
    }

    /// Update a resource under its caller-known version
    pub async fn update_resource(
        &self,
        organization_id: &str,
        resource: &Resource,
    ) -> Result<Resource> {
        resource.validate()?;
        let mut next = resource.clone();
        next.updated_at = chrono::Utc::now();
        let scope = self.scope(RESOURCES_TABLE, organization_id);
        let version = self
            .persist_update(&scope, &resource.id, resource.version, &next)
            .await?;
        next.version = version;
        Ok(next)
    }

    /// Delete a resource and release its identity hash
    pub async fn delete_resource(&self, organization_id: &str, id: &str) -> Result<()> {
        let resource = self.get_resource(organization_id, id).await?;
        self.unregister_hash(organization_id, &hash::resource_hash(&resource))
            .await?;
        let scope = self.scope(RESOURCES_TABLE, organization_id);
        self.delete_row(&scope, id).await
    }

    // ---- roles and groups -----------------------------------------------

    /// Validate, dedup, and persist a new role
    pub async fn create_role(&self, organization_id: &str, role: &Role) -> Result<Role> {
        role.validate()?;
        self.register_hash(organization_id, &hash::role_hash(role), &role.id)
            .await?;
        let scope = self.scope(ROLES_TABLE, organization_id);
        let version = self.persist_create(&scope, &role.id, role).await?;
        let mut stored = role.clone();
        stored.version = version;
        Ok(stored)
    }

    /// Load a role by id
    pub async fn get_role(&self, organization_id: &str, id: &str) -> Result<Role> {
        let scope = self.scope(ROLES_TABLE, organization_id);
        self.load_one(&scope, id, "role").await
    }

    /// Batch-load roles; missing ids are simply absent
    pub async fn get_roles(
        &self,
        organization_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Role>> {
        let scope = self.scope(ROLES_TABLE, organization_id);
        self.load_many(&scope, ids).await
    }

    /// Update a role under its caller-known version; bumps the modification
    /// timestamp that drives hierarchy cache invalidation
    pub async fn update_role(&self, organization_id: &str, role: &Role) -> Result<Role> {
        role.validate()?;
        let mut next = role.clone();
        next.updated_at = chrono::Utc::now();
        let scope = self.scope(ROLES_TABLE, organization_id);
        let version = self
            .persist_update(&scope, &role.id, role.version, &next)
            .await?;
        next.version = version;
        Ok(next)
    }

    /// Delete a role and release its identity hash, so the same
    /// `(namespace, name)` can be created again
    pub async fn delete_role(&self, organization_id: &str, id: &str) -> Result<()> {
        let role = self.get_role(organization_id, id).await?;
        self.unregister_hash(organization_id, &hash::role_hash(&role))
            .await?;
        let scope = self.scope(ROLES_TABLE, organization_id);
        self.delete_row(&scope, id).await
    }

    /// Validate, dedup, and persist a new group
    pub async fn create_group(&self, organization_id: &str, group: &Group) -> Result<Group> {
        group.validate()?;
        self.register_hash(organization_id, &hash::group_hash(group), &group.id)
            .await?;
        let scope = self.scope(GROUPS_TABLE, organization_id);
        let version = self.persist_create(&scope, &group.id, group).await?;
        let mut stored = group.clone();
        stored.version = version;
        Ok(stored)
    }

    /// Load a group by id
    pub async fn get_group(&self, organization_id: &str, id: &str) -> Result<Group> {
        let scope = self.scope(GROUPS_TABLE, organization_id);
        self.load_one(&scope, id, "group").await
    }

    /// Batch-load groups; missing ids are simply absent
    pub async fn get_groups(
        &self,
        organization_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Group>> {
        let scope = self.scope(GROUPS_TABLE, organization_id);
        self.load_many(&scope, ids).await
    }

    /// Update a group under its caller-known version; bumps the
    /// modification timestamp that drives hierarchy cache invalidation
    pub async fn update_group(&self, organization_id: &str, group: &Group) -> Result<Group> {
        group.validate()?;
        let mut next = group.clone();
        next.updated_at = chrono::Utc::now();
        let scope = self.scope(GROUPS_TABLE, organization_id);
        let version = self
            .persist_update(&scope, &group.id, group.version, &next)
            .await?;
        next.version = version;
        Ok(next)
    }

    /// Delete a group and release its identity hash
    pub async fn delete_group(&self, organization_id: &str, id: &str) -> Result<()> {
        let group = self.get_group(organization_id, id).await?;
        self.unregister_hash(organization_id, &hash::group_hash(&group))
            .await?;
        let scope = self.scope(GROUPS_TABLE, organization_id);
        self.delete_row(&scope, id).await
    }

    // ---- permissions ----------------------------------------------------

    /// Validate, dedup, and persist a new permission
    pub async fn create_permission(
        &self,
        organization_id: &str,
        permission: &Permission,
    ) -> Result<Permission> {
        permission.validate()?;
        self.register_hash(
            organization_id,
            &hash::permission_hash(permission),
            &permission.id,
        )
        .await?;
        let scope = self.scope(PERMISSIONS_TABLE, organization_id);
        let version = self
            .persist_create(&scope, &permission.id, permission)
            .await?;
        let mut stored = permission.clone();
        stored.version = version;
        Ok(stored)
    }

    /// Load a permission by id
    pub async fn get_permission(&self, organization_id: &str, id: &str) -> Result<Permission> {
        let scope = self.scope(PERMISSIONS_TABLE, organization_id);
        self.load_one(&scope, id, "permission").await
    }

    /// Batch-load permissions; missing ids are simply absent
    pub async fn get_permissions(
        &self,
        organization_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Permission>> {
        let scope = self.scope(PERMISSIONS_TABLE, organization_id);
        self.load_many(&scope, ids).await
    }

    /// Update a permission under its caller-known version
    pub async fn update_permission(
        &self,
        organization_id: &str,
        permission: &Permission,
    ) -> Result<Permission> {
        permission.validate()?;
        let mut next = permission.clone();
        next.updated_at = chrono::Utc::now();
        let scope = self.scope(PERMISSIONS_TABLE, organization_id);
        let version = self
            .persist_update(&scope, &permission.id, permission.version, &next)
            .await?;
        next.version = version;
        Ok(next)
    }

    /// Delete a permission and release its identity hash
    pub async fn delete_permission(&self, organization_id: &str, id: &str) -> Result<()> {
        let permission = self.get_permission(organization_id, id).await?;
        self.unregister_hash(organization_id, &hash::permission_hash(&permission))
            .await?;
        let scope = self.scope(PERMISSIONS_TABLE, organization_id);
        self.delete_row(&scope, id).await
    }

    // ---- relationships --------------------------------------------------

    /// Validate, dedup, and persist a new relationship
    pub async fn create_relationship(
        &self,
        organization_id: &str,
        relationship: &Relationship,
    ) -> Result<Relationship> {
        relationship.validate()?;
        self.register_hash(
            organization_id,
            &hash::relationship_hash(relationship),
            &relationship.id,
        )
        .await?;
        let scope = self.scope(RELATIONSHIPS_TABLE, organization_id);
        let version = self
            .persist_create(&scope, &relationship.id, relationship)
            .await?;
        let mut stored = relationship.clone();
        stored.version = version;
        Ok(stored)
    }

    /// Load a relationship by id
    pub async fn get_relationship(
        &self,
        organization_id: &str,
        id: &str,
    ) -> Result<Relationship> {
        let scope = self.scope(RELATIONSHIPS_TABLE, organization_id);
        self.load_one(&scope, id, "relationship").await
    }

    /// Batch-load relationships; missing ids are simply absent
    pub async fn get_relationships(
        &self,
        organization_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Relationship>> {
        let scope = self.scope(RELATIONSHIPS_TABLE, organization_id);
        self.load_many(&scope, ids).await
    }

    /// Delete a relationship and release its identity hash
    pub async fn delete_relationship(&self, organization_id: &str, id: &str) -> Result<()> {
        let relationship = self.get_relationship(organization_id, id).await?;
        self.unregister_hash(organization_id, &hash::relationship_hash(&relationship))
            .await?;
        let scope = self.scope(RELATIONSHIPS_TABLE, organization_id);
        self.delete_row(&scope, id).await
    }

    // ---- capacity allocation --------------------------------------------

    /// Claim a resource instance for a principal, enforcing the resource's
    /// capacity. The instance id derives from `(resource_id, principal_id)`,
    /// so repeated allocation by the same principal is idempotent.
    pub async fn allocate_instance(
        &self,
        organization_id: &str,
        resource_id: &str,
        principal_id: &str,
    ) -> Result<ResourceInstance> {
        let resource = self.get_resource(organization_id, resource_id).await?;
        let scope = self.scope(INSTANCES_TABLE, organization_id);
        let instance_id = hash::resource_instance_hash(resource_id, principal_id);

        let existing: HashMap<String, ResourceInstance> =
            self.load_many(&scope, &[instance_id.clone()]).await?;
        if let Some(current) = existing.get(&instance_id) {
            if current.state == InstanceState::Allocated {
                return Ok(current.clone());
            }
        }

        if resource.capacity > 0 {
            let allocated = self
                .count_allocated(organization_id, resource_id)
                .await?;
            if allocated >= resource.capacity as usize {
                return Err(AuthzError::validation(format!(
                    "resource '{}' is at capacity ({})",
                    resource.name, resource.capacity
                )));
            }
        }

        let instance = ResourceInstance::new(
            &instance_id,
            &resource.namespace,
            resource_id,
            principal_id,
            InstanceState::Allocated,
        );
        instance.validate()?;

        let version = if existing.contains_key(&instance_id) {
            self.persist_update(&scope, &instance_id, ANY_VERSION, &instance)
                .await?
        } else {
            self.persist_create(&scope, &instance_id, &instance).await?
        };
        let mut stored = instance;
        stored.version = version;
        Ok(stored)
    }

    /// Release a principal's claim on a resource
    pub async fn deallocate_instance(
        &self,
        organization_id: &str,
        resource_id: &str,
        principal_id: &str,
    ) -> Result<ResourceInstance> {
        let scope = self.scope(INSTANCES_TABLE, organization_id);
        let instance_id = hash::resource_instance_hash(resource_id, principal_id);
        let mut instance: ResourceInstance =
            self.load_one(&scope, &instance_id, "resource instance").await?;

        instance.state = InstanceState::Released;
        instance.updated_at = chrono::Utc::now();
        let version = self
            .persist_update(&scope, &instance_id, instance.version, &instance)
            .await?;
        instance.version = version;
        Ok(instance)
    }

    async fn count_allocated(
        &self,
        organization_id: &str,
        resource_id: &str,
    ) -> Result<usize> {
        let scope = self.scope(INSTANCES_TABLE, organization_id);
        let mut predicate = QueryPredicate::new();
        predicate.insert("resource_id".to_string(), resource_id.to_string());
        predicate.insert("state".to_string(), "ALLOCATED".to_string());

        let mut count = 0;
        let mut offset: Option<String> = None;
        loop {
            let page = self
                .store
                .query(&scope, &predicate, offset.as_deref(), QUERY_PAGE)
                .await?;
            count += page.items.len();
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_core::MemoryStore;

    fn registry() -> Registry {
        Registry::new(Arc::new(MemoryStore::new()), Config::default())
    }

    async fn seed_org(registry: &Registry) -> Organization {
        let org = Organization::new("acme", vec!["sales".to_string()]);
        registry.create_organization(&org).await.unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields_and_versions() {
        let registry = registry();
        let org = seed_org(&registry).await;

        let resource = Resource::new("sales", "report", vec!["read".to_string()])
            .with_attribute("tier", "gold");
        let stored = registry.create_resource(&org.id, &resource).await.unwrap();
        assert_eq!(stored.version, 1);

        let loaded = registry.get_resource(&org.id, &resource.id).await.unwrap();
        assert_eq!(loaded.name, "report");
        assert_eq!(loaded.attributes.get("tier").unwrap(), "gold");
        assert_eq!(loaded.version, 1);

        let mut changed = loaded.clone();
        changed.capacity = 3;
        let updated = registry.update_resource(&org.id, &changed).await.unwrap();
        assert_eq!(updated.version, 2);

        // Stale caller-known version is rejected
        let stale = registry.update_resource(&org.id, &loaded).await;
        assert!(matches!(stale, Err(AuthzError::Database(_))));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let registry = registry();
        let org = seed_org(&registry).await;

        let first = Role::new("sales", "Manager");
        registry.create_role(&org.id, &first).await.unwrap();

        // Same semantic identity, different id and case
        let second = Role::new("sales", "manager");
        let err = registry.create_role(&org.id, &second).await;
        match err {
            Err(AuthzError::Duplicate { existing_ids, .. }) => {
                assert_eq!(existing_ids, vec![first.id]);
            }
            other => panic!("expected duplicate error, got {:?}", other.map(|r| r.id)),
        }
    }

    #[tokio::test]
    async fn test_invalid_records_never_reach_storage() {
        let registry = registry();
        let org = seed_org(&registry).await;

        let invalid = Resource::new("sales", "", vec!["read".to_string()]);
        assert!(matches!(
            registry.create_resource(&org.id, &invalid).await,
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            registry.get_resource(&org.id, &invalid.id).await,
            Err(AuthzError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_principal_namespaces_checked_against_org() {
        let registry = registry();
        let org = seed_org(&registry).await;

        let outside = Principal::new(&org.id, "alice", vec!["hr".to_string()]);
        assert!(matches!(
            registry.create_principal(&outside).await,
            Err(AuthzError::Validation(_))
        ));

        let inside = Principal::new(&org.id, "alice", vec!["sales".to_string()]);
        assert!(registry.create_principal(&inside).await.is_ok());
    }

    #[tokio::test]
    async fn test_capacity_allocation() {
        let registry = registry();
        let org = seed_org(&registry).await;

        let resource = Resource::new("sales", "license", vec!["use".to_string()])
            .with_capacity(2);
        registry.create_resource(&org.id, &resource).await.unwrap();

        let a = registry
            .allocate_instance(&org.id, &resource.id, "p1")
            .await
            .unwrap();
        registry
            .allocate_instance(&org.id, &resource.id, "p2")
            .await
            .unwrap();

        // Idempotent for the same principal
        let again = registry
            .allocate_instance(&org.id, &resource.id, "p1")
            .await
            .unwrap();
        assert_eq!(again.id, a.id);

        // Third principal exceeds capacity
        let err = registry.allocate_instance(&org.id, &resource.id, "p3").await;
        assert!(matches!(err, Err(AuthzError::Validation(_))));

        // Release frees a slot
        registry
            .deallocate_instance(&org.id, &resource.id, "p1")
            .await
            .unwrap();
        assert!(registry
            .allocate_instance(&org.id, &resource.id, "p3")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_delete_releases_identity_hash() {
        let registry = registry();
        let org = seed_org(&registry).await;

        let viewer = registry
            .create_role(&org.id, &Role::new("sales", "viewer"))
            .await
            .unwrap();
        assert!(matches!(
            registry.create_role(&org.id, &Role::new("sales", "Viewer")).await,
            Err(AuthzError::Duplicate { .. })
        ));

        registry.delete_role(&org.id, &viewer.id).await.unwrap();
        assert!(matches!(
            registry.get_role(&org.id, &viewer.id).await,
            Err(AuthzError::NotFound(_))
        ));

        // The identity is free again after the delete
        assert!(registry
            .create_role(&org.id, &Role::new("sales", "viewer"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let registry = registry();
        let org = seed_org(&registry).await;
        assert!(matches!(
            registry.delete_role(&org.id, "nope").await,
            Err(AuthzError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_principal_clears_closure_rows() {
        let registry = registry();
        let org = seed_org(&registry).await;

        let principal = Principal::new(&org.id, "alice", vec!["sales".to_string()]);
        let principal = registry.create_principal(&principal).await.unwrap();

        let key = hash::group_closure_key(&principal.id);
        let row = HashIndex::closure(key.clone(), vec!["g1".to_string()]);
        registry
            .store_closure_index(&org.id, &key, &row)
            .await
            .unwrap();
        assert!(registry
            .load_closure_index(&org.id, &key)
            .await
            .unwrap()
            .is_some());

        registry
            .delete_principal(&org.id, &principal.id)
            .await
            .unwrap();
        assert!(registry
            .load_closure_index(&org.id, &key)
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            registry.get_principal(&org.id, &principal.id).await,
            Err(AuthzError::NotFound(_))
        ));
    }
}
