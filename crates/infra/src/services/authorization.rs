//! Permission resolution against the role store.

use std::collections::BTreeSet;

use keystone_auth::{
    ConditionEvaluator, EffectivePermissions, PermissionAction, authorize, resolve_effective_permissions,
};
use keystone_core::{Entity, PermissionId, UserId};

use super::{Collaborators, ServiceError};

pub struct AuthorizationService {
    deps: Collaborators,
}

impl AuthorizationService {
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    /// Union of the permissions of every active role assigned to `user_id`.
    ///
    /// Accounts that cannot authenticate (missing, deleted, locked or
    /// deactivated) hold no permissions whatever their role assignments.
    #[tracing::instrument(name = "authz.effective_permissions", skip(self))]
    pub fn effective_permissions(&self, user_id: UserId) -> Result<EffectivePermissions, ServiceError> {
        let standing = self
            .deps
            .users
            .find_by_id(user_id)?
            .map(|u| u.ensure_can_authenticate());
        match standing {
            Some(Ok(())) => {}
            Some(Err(cause)) => {
                tracing::info!(cause = %cause, "account holds no permissions");
                return Ok(EffectivePermissions::empty(user_id));
            }
            None => {
                tracing::info!("no live account; holds no permissions");
                return Ok(EffectivePermissions::empty(user_id));
            }
        }

        let roles = self.deps.rbac.roles_for_user(user_id)?;

        let wanted: BTreeSet<PermissionId> = roles
            .iter()
            .filter(|r| r.is_active())
            .flat_map(|r| r.permission_ids().copied())
            .collect();
        let catalog = self.deps.rbac.find_permissions(&wanted)?;

        Ok(resolve_effective_permissions(user_id, &roles, |id| {
            catalog.iter().find(|p| p.id() == id).cloned()
        }))
    }

    /// Require `entity`/`action` for `user_id`; returns the granting permission.
    #[tracing::instrument(name = "authz.authorize", skip(self, evaluator))]
    pub fn authorize<E>(
        &self,
        user_id: UserId,
        entity: &str,
        action: PermissionAction,
        evaluator: &E,
    ) -> Result<PermissionId, ServiceError>
    where
        E: ConditionEvaluator + ?Sized,
    {
        let permissions = self.effective_permissions(user_id)?;
        authorize(&permissions, entity, action, evaluator).map_err(|e| {
            tracing::info!(error = %e, "access denied");
            ServiceError::from(e)
        })
    }
}
