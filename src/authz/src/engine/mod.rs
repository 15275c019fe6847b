//! Permission resolution: the Check algorithm
//!
//! `Authorizer::check` does all I/O up front by building (or reusing) a
//! principal snapshot, then hands off to [`resolve`], which is a pure
//! function over the snapshot and the request. Concurrent checks never
//! contend on anything but the snapshot cache lock.

mod decision;

pub use decision::{
    AuthRequest, AuthResponse, CODE_AMBIGUOUS, CODE_CONFLICT, CODE_NO_PERMISSIONS,
    CODE_NO_RESOURCE,
};

use crate::constraints::{Evaluator, Value};
use crate::error::{AuthzError, Result};
use crate::model::{Effect, Resource};
use crate::registry::Registry;
use crate::snapshot::{PrincipalSnapshot, SnapshotBuilder};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The decision point. Cheap to share behind an `Arc`.
pub struct Authorizer {
    snapshots: SnapshotBuilder,
    evaluator: Evaluator,
}

impl Authorizer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            snapshots: SnapshotBuilder::new(registry),
            evaluator: Evaluator::new(),
        }
    }

    /// Answer one authorization question.
    ///
    /// Returns `Ok` with the aggregated effect when any permission matched;
    /// an `Auth` error when no resource or no permission applied; a
    /// `Marshal` error when a constraint template is malformed.
    pub async fn check(&self, request: &AuthRequest) -> Result<AuthResponse> {
        let snapshot = self
            .snapshots
            .snapshot(&request.organization_id, &request.principal_id)
            .await?;
        resolve(&snapshot, request, &self.evaluator)
    }

    /// Evaluate one constraint expression in the same context `check` would
    /// use for `resource`. Empty text is unconditionally true.
    pub fn check_constraints(
        &self,
        snapshot: &PrincipalSnapshot,
        resource: &Resource,
        request: &AuthRequest,
        constraints: &str,
    ) -> Result<(bool, String)> {
        if constraints.is_empty() {
            return Ok((true, String::new()));
        }
        let root = build_context(snapshot, resource, request);
        self.evaluator.evaluate(constraints, &root)
    }

    /// Snapshot access for callers that want to inspect what a principal
    /// resolves to without running a check
    pub async fn snapshot(
        &self,
        organization_id: &str,
        principal_id: &str,
    ) -> Result<Arc<PrincipalSnapshot>> {
        self.snapshots.snapshot(organization_id, principal_id).await
    }

    /// Drop all cached snapshots
    pub fn clear_cache(&self) {
        self.snapshots.clear();
    }
}

/// Pure resolution over an already-built snapshot.
pub fn resolve(
    snapshot: &PrincipalSnapshot,
    request: &AuthRequest,
    evaluator: &Evaluator,
) -> Result<AuthResponse> {
    // Candidate resources: right namespace, name matches (stored names may
    // carry wildcards), action allowed
    let mut candidates: Vec<&Resource> = snapshot
        .resources
        .values()
        .filter(|r| {
            r.namespace == request.namespace
                && resource_name_matches(&r.name, &request.resource_name)
                && r.allows_action(&request.action)
        })
        .collect();
    candidates.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));

    if candidates.is_empty() {
        return Err(AuthzError::auth(
            CODE_NO_RESOURCE,
            format!(
                "no resource named '{}' allows action '{}' in namespace '{}'",
                request.resource_name, request.action, request.namespace
            ),
        ));
    }

    let mut action_matched = 0usize;
    let mut constraint_blocked = 0usize;
    // effect ordinal -> contributing permission ids
    let mut outcomes: BTreeMap<u32, Vec<String>> = BTreeMap::new();

    for resource in &candidates {
        let Some(permission_ids) = snapshot.permissions_by_resource.get(&resource.name) else {
            continue;
        };
        for permission_id in permission_ids {
            let Some(permission) = snapshot.permissions.get(permission_id) else {
                continue;
            };
            if !permission.matches(&request.scope, &request.action) {
                continue;
            }
            action_matched += 1;

            if !permission.constraints.is_empty() {
                let root = build_context(snapshot, resource, request);
                let (matched, rendered) = evaluator.evaluate(&permission.constraints, &root)?;
                if !matched {
                    debug!(
                        permission = %permission.id,
                        rendered = %rendered,
                        "constraint did not match"
                    );
                    constraint_blocked += 1;
                    continue;
                }
            }

            outcomes
                .entry(permission.effect.ordinal())
                .or_default()
                .push(permission.id.clone());
        }
    }

    if outcomes.is_empty() {
        return Err(AuthzError::auth(
            CODE_NO_PERMISSIONS,
            format!(
                "no permission applies: {} matched action '{}', {} blocked by constraints",
                action_matched, request.action, constraint_blocked
            ),
        ));
    }

    if outcomes.len() > 1 {
        let ids: Vec<&String> = outcomes.values().flatten().collect();
        warn!(
            principal = %request.principal_id,
            resource = %request.resource_name,
            ?ids,
            "permissions conflict; denying"
        );
        return Ok(AuthResponse::denied().with_message(format!(
            "[{}] permissions {:?} disagree on '{}'; denied",
            CODE_CONFLICT, ids, request.action
        )));
    }

    let (ordinal, ids) = outcomes
        .iter()
        .next()
        .map(|(k, v)| (*k, v.clone()))
        .unwrap_or((Effect::Denied.ordinal(), Vec::new()));
    let effect = if ordinal == Effect::Permitted.ordinal() {
        Effect::Permitted
    } else {
        Effect::Denied
    };

    let mut response = match effect {
        Effect::Permitted => AuthResponse::permitted(),
        Effect::Denied => AuthResponse::denied(),
    };
    if ids.len() > 1 {
        warn!(
            principal = %request.principal_id,
            resource = %request.resource_name,
            ?ids,
            "multiple permissions produced the same effect"
        );
        response = response.with_message(format!(
            "[{}] permissions {:?} all produced {}",
            CODE_AMBIGUOUS, ids, effect
        ));
    }
    Ok(response)
}

/// Match a stored resource name against the requested one. Stored names may
/// embed `*` wildcards; everything else is literal.
fn resource_name_matches(stored: &str, requested: &str) -> bool {
    if stored == requested {
        return true;
    }
    if !stored.contains('*') {
        return false;
    }
    let pattern = format!("^{}$", regex::escape(stored).replace("\\*", ".*"));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(requested),
        Err(_) => false,
    }
}

/// Assemble the constraint evaluation root for one `(resource, request)`
/// pair. Caller context sits at the top level; the `Principal`, `Resource`
/// and `Relations` sections always win over caller keys of the same name.
fn build_context(
    snapshot: &PrincipalSnapshot,
    resource: &Resource,
    request: &AuthRequest,
) -> Value {
    let mut root: BTreeMap<String, Value> = request
        .context
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let principal = &snapshot.principal;
    let mut principal_section = match Value::from_attributes(&principal.attributes) {
        Value::Map(map) => map,
        _ => BTreeMap::new(),
    };
    principal_section.insert("Id".to_string(), Value::from(principal.id.as_str()));
    principal_section.insert(
        "Username".to_string(),
        Value::from(principal.username.as_str()),
    );
    principal_section.insert("Name".to_string(), Value::from(principal.name.as_str()));
    principal_section.insert("Email".to_string(), Value::from(principal.email.as_str()));
    principal_section.insert("Groups".to_string(), Value::str_seq(snapshot.group_names()));
    principal_section.insert("Roles".to_string(), Value::str_seq(snapshot.role_names()));
    principal_section.insert("Action".to_string(), Value::from(request.action.as_str()));
    principal_section.insert("Scope".to_string(), Value::from(request.scope.as_str()));
    root.insert("Principal".to_string(), Value::Map(principal_section));

    let mut resource_section = match Value::from_attributes(&resource.attributes) {
        Value::Map(map) => map,
        _ => BTreeMap::new(),
    };
    resource_section.insert("Id".to_string(), Value::from(resource.id.as_str()));
    resource_section.insert("Name".to_string(), Value::from(resource.name.as_str()));
    resource_section.insert("Capacity".to_string(), Value::from(resource.capacity));
    resource_section.insert(
        "AllowedActions".to_string(),
        Value::str_seq(resource.allowed_actions.iter().cloned()),
    );
    root.insert("Resource".to_string(), Value::Map(resource_section));

    let relations: BTreeMap<String, Value> = snapshot
        .relations_for(&resource.id)
        .into_iter()
        .map(|(name, rel)| (name, Value::from_attributes(&rel.attributes)))
        .collect();
    root.insert("Relations".to_string(), Value::Map(relations));

    Value::Map(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Permission, Principal, Relationship};
    use std::collections::HashMap;

    fn snapshot_with(
        resources: Vec<Resource>,
        permissions: Vec<Permission>,
        relationships: Vec<Relationship>,
    ) -> PrincipalSnapshot {
        let mut principal = Principal::new("org1", "alice", vec!["sales".to_string()]);
        principal.id = "p1".to_string();
        principal
            .attributes
            .insert("Age".to_string(), "30".to_string());

        let resource_map: HashMap<String, Resource> = resources
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        let mut by_resource: HashMap<String, Vec<String>> = HashMap::new();
        for perm in &permissions {
            if let Some(resource) = resource_map.get(&perm.resource_id) {
                by_resource
                    .entry(resource.name.clone())
                    .or_default()
                    .push(perm.id.clone());
            }
        }
        for ids in by_resource.values_mut() {
            ids.sort();
        }

        PrincipalSnapshot {
            organization_id: "org1".to_string(),
            principal,
            groups: HashMap::new(),
            roles: HashMap::new(),
            permissions: permissions.into_iter().map(|p| (p.id.clone(), p)).collect(),
            permissions_by_resource: by_resource,
            resources: resource_map,
            relationships,
        }
    }

    fn resource(id: &str, name: &str, actions: &[&str]) -> Resource {
        let mut r = Resource::new("sales", name, actions.iter().map(|s| s.to_string()).collect());
        r.id = id.to_string();
        r
    }

    fn permission(id: &str, resource_id: &str, actions: &[&str], effect: Effect) -> Permission {
        let mut p = Permission::new(
            "sales",
            resource_id,
            actions.iter().map(|s| s.to_string()).collect(),
            effect,
        );
        p.id = id.to_string();
        p
    }

    fn request(action: &str, resource_name: &str) -> AuthRequest {
        AuthRequest::new("org1", "sales", "p1", action, resource_name)
    }

    #[test]
    fn test_single_permit() {
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![permission("perm1", "r1", &["read"], Effect::Permitted)],
            vec![],
        );
        let response = resolve(&snapshot, &request("read", "report"), &Evaluator::new()).unwrap();
        assert!(response.is_permitted());
        assert!(response.message.is_empty());
    }

    #[test]
    fn test_no_resource_is_auth_error() {
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![permission("perm1", "r1", &["read"], Effect::Permitted)],
            vec![],
        );
        let err = resolve(&snapshot, &request("read", "ledger"), &Evaluator::new());
        assert!(
            matches!(err, Err(AuthzError::Auth { ref code, .. }) if code == CODE_NO_RESOURCE)
        );

        // Resource exists but does not allow the action
        let err = resolve(&snapshot, &request("delete", "report"), &Evaluator::new());
        assert!(
            matches!(err, Err(AuthzError::Auth { ref code, .. }) if code == CODE_NO_RESOURCE)
        );
    }

    #[test]
    fn test_wildcard_resource_name() {
        let snapshot = snapshot_with(
            vec![resource("r1", "urn:org-sales-*-project-1000-*", &["read"])],
            vec![permission("perm1", "r1", &["read"], Effect::Permitted)],
            vec![],
        );
        let response = resolve(
            &snapshot,
            &request("read", "urn:org-sales-west-project-1000-report"),
            &Evaluator::new(),
        )
        .unwrap();
        assert!(response.is_permitted());

        let err = resolve(
            &snapshot,
            &request("read", "urn:org-sales-west-project-2000-report"),
            &Evaluator::new(),
        );
        assert!(matches!(err, Err(AuthzError::Auth { .. })));
    }

    #[test]
    fn test_conflicting_effects_deny() {
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![
                permission("perm1", "r1", &["read"], Effect::Permitted),
                permission("perm2", "r1", &["read"], Effect::Denied),
            ],
            vec![],
        );
        let response = resolve(&snapshot, &request("read", "report"), &Evaluator::new()).unwrap();
        assert_eq!(response.effect, Effect::Denied);
        assert!(response.message.contains(CODE_CONFLICT));
    }

    #[test]
    fn test_same_effect_twice_is_ambiguous_but_stands() {
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![
                permission("perm1", "r1", &["read"], Effect::Permitted),
                permission("perm2", "r1", &["*"], Effect::Permitted),
            ],
            vec![],
        );
        let response = resolve(&snapshot, &request("read", "report"), &Evaluator::new()).unwrap();
        assert!(response.is_permitted());
        assert!(response.message.contains(CODE_AMBIGUOUS));
    }

    #[test]
    fn test_constraint_gates_permission() {
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![permission("perm1", "r1", &["read"], Effect::Permitted)
                .with_constraints("GE .Principal.Age 21")],
            vec![],
        );
        // Age attribute is "30", so the gate passes
        let response = resolve(&snapshot, &request("read", "report"), &Evaluator::new()).unwrap();
        assert!(response.is_permitted());

        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![permission("perm1", "r1", &["read"], Effect::Permitted)
                .with_constraints("GE .Principal.Age 65")],
            vec![],
        );
        let err = resolve(&snapshot, &request("read", "report"), &Evaluator::new());
        assert!(
            matches!(err, Err(AuthzError::Auth { ref code, .. }) if code == CODE_NO_PERMISSIONS)
        );
    }

    #[test]
    fn test_malformed_constraint_is_marshal_error() {
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![permission("perm1", "r1", &["read"], Effect::Permitted)
                .with_constraints("{{ EQ .A 1")],
            vec![],
        );
        let err = resolve(&snapshot, &request("read", "report"), &Evaluator::new());
        assert!(matches!(err, Err(AuthzError::Marshal(_))));
    }

    #[test]
    fn test_scope_mismatch_blocks() {
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![{
                let mut p = permission("perm1", "r1", &["read"], Effect::Permitted);
                p.scope = "reports".to_string();
                p
            }],
            vec![],
        );
        let err = resolve(
            &snapshot,
            &request("read", "report").with_scope("billing"),
            &Evaluator::new(),
        );
        assert!(
            matches!(err, Err(AuthzError::Auth { ref code, .. }) if code == CODE_NO_PERMISSIONS)
        );

        let ok = resolve(
            &snapshot,
            &request("read", "report").with_scope("reports"),
            &Evaluator::new(),
        )
        .unwrap();
        assert!(ok.is_permitted());
    }

    #[test]
    fn test_relations_reach_constraints() {
        let mut rel = Relationship::new("sales", "owner", "p1", "r1");
        rel.attributes
            .insert("Since".to_string(), "2024".to_string());
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![permission("perm1", "r1", &["read"], Effect::Permitted)
                .with_constraints("HasRelation \"owner\"")],
            vec![rel],
        );
        let response = resolve(&snapshot, &request("read", "report"), &Evaluator::new()).unwrap();
        assert!(response.is_permitted());
    }

    #[test]
    fn test_caller_context_cannot_shadow_sections() {
        let snapshot = snapshot_with(
            vec![resource("r1", "report", &["read"])],
            vec![permission("perm1", "r1", &["read"], Effect::Permitted)
                .with_constraints("EQ .Principal.Username \"alice\"")],
            vec![],
        );
        let req = request("read", "report").with_context("Principal", "spoofed");
        let response = resolve(&snapshot, &req, &Evaluator::new()).unwrap();
        assert!(response.is_permitted());
    }
}
