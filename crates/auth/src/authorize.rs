//! Effective permission resolution and authorization decisions.
//!
//! A user's effective permissions are the union, over the active roles
//! assigned to them, of each role's permission set. Membership is by record
//! identity ([`PermissionId`]): two separately stored permissions with the same
//! entity/action stay distinct. [`EffectivePermissions::distinct_grants`] is
//! the opt-in structural view.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use keystone_core::{Entity, PermissionId, UserId};

use crate::permissions::{ConditionEvaluator, Permission, PermissionAction, PolicyCondition};
use crate::roles::Role;
use crate::AuthError;

/// The resolved permission set of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePermissions {
    user_id: UserId,
    grants: BTreeMap<PermissionId, Permission>,
}

/// Structural identity of a grant, used by [`EffectivePermissions::distinct_grants`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GrantKey {
    pub entity: String,
    pub action: PermissionAction,
    pub condition: Option<PolicyCondition>,
}

/// Outcome of checking one entity/action pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Granted by the given permission record.
    Allowed(PermissionId),
    Denied,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed(_))
    }
}

/// Resolve the effective permissions of `user_id`.
///
/// - `roles`: the roles currently assigned to the user. Inactive roles grant nothing.
/// - `catalog`: permission lookup by id. References with no catalog entry are skipped.
///
/// No IO: the caller loads roles and permissions from its store first.
pub fn resolve_effective_permissions<'a, F>(
    user_id: UserId,
    roles: impl IntoIterator<Item = &'a Role>,
    catalog: F,
) -> EffectivePermissions
where
    F: Fn(&PermissionId) -> Option<Permission>,
{
    let mut grants = BTreeMap::new();

    for role in roles {
        if !role.is_active() {
            tracing::debug!(role = %role.name(), "skipping inactive role");
            continue;
        }
        for permission_id in role.permission_ids() {
            if grants.contains_key(permission_id) {
                continue;
            }
            match catalog(permission_id) {
                Some(permission) => {
                    grants.insert(*permission_id, permission);
                }
                None => {
                    tracing::debug!(
                        role = %role.name(),
                        permission_id = %permission_id,
                        "role references unknown permission"
                    );
                }
            }
        }
    }

    EffectivePermissions { user_id, grants }
}

impl EffectivePermissions {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            grants: BTreeMap::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn contains(&self, permission: &PermissionId) -> bool {
        self.grants.contains_key(permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.grants.values()
    }

    /// Grants keyed by `(entity, action, condition)`, collapsing records
    /// that differ only by id.
    pub fn distinct_grants(&self) -> BTreeSet<GrantKey> {
        self.grants
            .values()
            .map(|p| GrantKey {
                entity: p.entity().to_string(),
                action: p.action(),
                condition: p.condition().cloned(),
            })
            .collect()
    }

    /// Decide whether `entity`/`action` is granted.
    ///
    /// Unconditional grants win outright; conditional grants apply only when
    /// `evaluator` accepts their expression.
    pub fn decide<E>(&self, entity: &str, action: PermissionAction, evaluator: &E) -> AccessDecision
    where
        E: ConditionEvaluator + ?Sized,
    {
        let (unconditional, conditional): (Vec<&Permission>, Vec<&Permission>) = self
            .grants
            .values()
            .filter(|p| p.covers(entity, action))
            .partition(|p| !p.has_condition());

        if let Some(p) = unconditional.first() {
            return AccessDecision::Allowed(*p.id());
        }

        conditional
            .into_iter()
            .find(|p| p.condition().is_some_and(|c| evaluator.evaluate(c)))
            .map(|p| AccessDecision::Allowed(*p.id()))
            .unwrap_or(AccessDecision::Denied)
    }
}

/// Authorize `entity`/`action` against a resolved permission set.
///
/// - No IO
/// - No panics
pub fn authorize<E>(
    permissions: &EffectivePermissions,
    entity: &str,
    action: PermissionAction,
    evaluator: &E,
) -> Result<PermissionId, AuthError>
where
    E: ConditionEvaluator + ?Sized,
{
    match permissions.decide(entity, action, evaluator) {
        AccessDecision::Allowed(id) => Ok(id),
        AccessDecision::Denied => Err(AuthError::Forbidden {
            entity: entity.to_string(),
            action: action.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;

    use crate::permissions::DenyConditional;

    struct Fixture {
        catalog: HashMap<PermissionId, Permission>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                catalog: HashMap::new(),
            }
        }

        fn permission(
            &mut self,
            entity: &str,
            action: PermissionAction,
            condition: Option<&str>,
        ) -> PermissionId {
            let p = Permission::create(entity, action, condition.map(PolicyCondition::new), None).unwrap();
            let id = *p.id();
            self.catalog.insert(id, p);
            id
        }

        fn role(&self, name: &str, permissions: &[PermissionId]) -> Role {
            let mut role = Role::create(name, None, Utc::now()).unwrap();
            role.assign_permissions(permissions.iter().copied(), Utc::now());
            role
        }

        fn resolve(&self, roles: &[Role]) -> EffectivePermissions {
            resolve_effective_permissions(UserId::new(), roles, |id| self.catalog.get(id).cloned())
        }
    }

    #[test]
    fn union_over_roles() {
        let mut fx = Fixture::new();
        let read = fx.permission("warehouses", PermissionAction::Read, None);
        let update = fx.permission("warehouses", PermissionAction::Update, None);
        let delete = fx.permission("warehouses", PermissionAction::Delete, None);

        let viewer = fx.role("viewer", &[read]);
        let editor = fx.role("editor", &[read, update]);
        let admin = fx.role("admin", &[delete]);

        let perms = fx.resolve(&[viewer, editor, admin]);
        assert_eq!(perms.len(), 3);
        assert!(perms.contains(&read));
        assert!(perms.contains(&update));
        assert!(perms.contains(&delete));
    }

    #[test]
    fn identical_records_are_not_structurally_merged() {
        let mut fx = Fixture::new();
        let a = fx.permission("units", PermissionAction::Read, None);
        let b = fx.permission("units", PermissionAction::Read, None);

        let perms = fx.resolve(&[fx.role("one", &[a]), fx.role("two", &[b])]);
        assert_eq!(perms.len(), 2);
        assert_eq!(perms.distinct_grants().len(), 1);
    }

    #[test]
    fn inactive_roles_and_dangling_references_grant_nothing() {
        let mut fx = Fixture::new();
        let read = fx.permission("taxes", PermissionAction::Read, None);
        let mut retired = fx.role("retired", &[read]);
        retired.deactivate(Utc::now());
        let dangling = fx.role("dangling", &[PermissionId::new()]);

        let perms = fx.resolve(&[retired, dangling]);
        assert!(perms.is_empty());
    }

    #[test]
    fn unconditional_grant_allows() {
        let mut fx = Fixture::new();
        let read = fx.permission("users", PermissionAction::Read, None);
        let perms = fx.resolve(&[fx.role("viewer", &[read])]);

        assert_eq!(
            perms.decide("users", PermissionAction::Read, &DenyConditional),
            AccessDecision::Allowed(read)
        );
        assert_eq!(
            perms.decide("users", PermissionAction::Delete, &DenyConditional),
            AccessDecision::Denied
        );
        assert_eq!(
            perms.decide("roles", PermissionAction::Read, &DenyConditional),
            AccessDecision::Denied
        );
    }

    #[test]
    fn conditional_grant_defers_to_evaluator() {
        let mut fx = Fixture::new();
        let own = fx.permission("users", PermissionAction::Update, Some("subject.id == resource.id"));
        let perms = fx.resolve(&[fx.role("self_service", &[own])]);

        assert!(!perms.decide("users", PermissionAction::Update, &DenyConditional).is_allowed());

        let accept = |c: &PolicyCondition| c.as_str() == "subject.id == resource.id";
        assert_eq!(
            perms.decide("users", PermissionAction::Update, &accept),
            AccessDecision::Allowed(own)
        );
    }

    #[test]
    fn authorize_reports_forbidden() {
        let perms = EffectivePermissions::empty(UserId::new());
        let err = authorize(&perms, "roles", PermissionAction::Delete, &DenyConditional).unwrap_err();
        assert_eq!(
            err,
            AuthError::Forbidden {
                entity: "roles".into(),
                action: "DELETE".into()
            }
        );
    }
}
