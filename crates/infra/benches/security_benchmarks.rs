use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use argon2::Params;
use chrono::Utc;
use keystone_auth::{
    CredentialHasher, DenyConditional, Permission, PermissionAction, RefreshToken, Role,
    resolve_effective_permissions, revoke_all, validate_password,
};
use keystone_core::{Entity, UserId};
use keystone_infra::{Argon2CredentialHasher, InMemoryRefreshTokenRepository, RefreshTokenRepository};
use std::collections::HashMap;

/// `roles` roles with `per_role` permissions each, over a shared catalog.
fn catalog(roles: usize, per_role: usize) -> (Vec<Role>, HashMap<keystone_core::PermissionId, Permission>) {
    let now = Utc::now();
    let mut permissions = HashMap::new();
    let roles = (0..roles)
        .map(|r| {
            let mut role = Role::create(format!("role_{r}"), None, now).unwrap();
            for p in 0..per_role {
                let permission =
                    Permission::create(format!("entity_{}", (r * per_role + p) % 50), PermissionAction::Read, None, None)
                        .unwrap();
                role.grant(*permission.id(), now);
                permissions.insert(*permission.id(), permission);
            }
            role
        })
        .collect();
    (roles, permissions)
}

fn bench_permission_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("permission_resolution");

    for role_count in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*role_count as u64));
        group.bench_with_input(
            BenchmarkId::new("resolve_and_decide", role_count),
            role_count,
            |b, &count| {
                let (roles, permissions) = catalog(count, 10);
                let user_id = UserId::new();

                b.iter(|| {
                    let effective =
                        resolve_effective_permissions(user_id, &roles, |id| permissions.get(id).cloned());
                    black_box(effective.decide("entity_7", PermissionAction::Read, &DenyConditional));
                });
            },
        );
    }

    group.finish();
}

fn bench_credential_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("credential_checks");

    group.bench_function("password_policy", |b| {
        b.iter(|| black_box(validate_password(black_box("Secure@123"))).is_ok());
    });

    // Minimum-cost parameters: measures the adapter, not argon2 itself.
    group.bench_function("argon2_verify_cheap", |b| {
        let hasher = Argon2CredentialHasher::with_params(Params::new(1024, 1, 1, None).unwrap());
        let hash = hasher.hash("Secure@123").unwrap();
        b.iter(|| black_box(hasher.verify(black_box("Secure@123"), &hash).unwrap()));
    });

    group.finish();
}

fn bench_revocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_token_revocation");

    for token_count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*token_count as u64));

        group.bench_with_input(
            BenchmarkId::new("revoke_all_in_place", token_count),
            token_count,
            |b, &count| {
                let owner = UserId::new();
                let now = Utc::now();
                let tokens: Vec<RefreshToken> = (0..count)
                    .map(|i| RefreshToken::issue(owner, format!("t{i}"), 7, now))
                    .collect();

                b.iter(|| {
                    let mut batch = tokens.clone();
                    black_box(revoke_all(batch.iter_mut(), owner));
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("revoke_all_in_memory_store", token_count),
            token_count,
            |b, &count| {
                let now = Utc::now();
                b.iter(|| {
                    let repo = InMemoryRefreshTokenRepository::new();
                    let owner = UserId::new();
                    for i in 0..count {
                        repo.insert(RefreshToken::issue(owner, format!("t{i}"), 7, now)).unwrap();
                    }
                    black_box(repo.revoke_all_by_user_id(owner).unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_permission_resolution,
    bench_credential_checks,
    bench_revocation
);
criterion_main!(benches);
