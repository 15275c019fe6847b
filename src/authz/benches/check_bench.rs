use criterion::{black_box, criterion_group, criterion_main, Criterion};
use portcullis_authz::engine::resolve;
use portcullis_authz::{
    AuthRequest, Effect, Evaluator, Permission, Principal, PrincipalSnapshot, Resource,
};
use std::collections::HashMap;

fn build_snapshot(resources: usize, permissions_per_resource: usize) -> PrincipalSnapshot {
    let mut principal = Principal::new("org1", "bench", vec!["sales".to_string()]);
    principal.id = "p1".to_string();
    principal
        .attributes
        .insert("Age".to_string(), "30".to_string());

    let mut resource_map = HashMap::new();
    let mut permission_map = HashMap::new();
    let mut by_resource: HashMap<String, Vec<String>> = HashMap::new();

    for r in 0..resources {
        let mut resource = Resource::new("sales", format!("res-{r}"), vec!["read".to_string()]);
        resource.id = format!("r{r}");
        for p in 0..permissions_per_resource {
            let mut perm = Permission::new(
                "sales",
                &resource.id,
                vec!["read".to_string()],
                Effect::Permitted,
            );
            perm.id = format!("perm-{r}-{p}");
            if p % 2 == 1 {
                perm.constraints = "GE .Principal.Age 21".to_string();
            }
            by_resource
                .entry(resource.name.clone())
                .or_default()
                .push(perm.id.clone());
            permission_map.insert(perm.id.clone(), perm);
        }
        resource_map.insert(resource.id.clone(), resource);
    }

    PrincipalSnapshot {
        organization_id: "org1".to_string(),
        principal,
        groups: HashMap::new(),
        roles: HashMap::new(),
        permissions: permission_map,
        permissions_by_resource: by_resource,
        resources: resource_map,
        relationships: Vec::new(),
    }
}

fn bench_resolve(c: &mut Criterion) {
    let evaluator = Evaluator::new();

    let snapshot = build_snapshot(100, 1);
    let request = AuthRequest::new("org1", "sales", "p1", "read", "res-50");
    c.bench_function("resolve_100_resources", |b| {
        b.iter(|| resolve(black_box(&snapshot), black_box(&request), &evaluator))
    });

    let snapshot = build_snapshot(1, 8);
    let request = AuthRequest::new("org1", "sales", "p1", "read", "res-0");
    c.bench_function("resolve_constrained_permissions", |b| {
        b.iter(|| resolve(black_box(&snapshot), black_box(&request), &evaluator))
    });
}

fn bench_constraint_eval(c: &mut Criterion) {
    let evaluator = Evaluator::new();
    let snapshot = build_snapshot(1, 1);
    let request = AuthRequest::new("org1", "sales", "p1", "read", "res-0");
    // Warm the template cache once, then measure cached evaluation
    let _ = resolve(&snapshot, &request, &evaluator);
    c.bench_function("resolve_cached_templates", |b| {
        b.iter(|| resolve(black_box(&snapshot), black_box(&request), &evaluator))
    });
}

criterion_group!(benches, bench_resolve, bench_constraint_eval);
criterion_main!(benches);
