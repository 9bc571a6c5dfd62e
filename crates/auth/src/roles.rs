//! Roles: named, unordered bundles of permission references.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::{DomainError, Entity, PermissionId, RoleId};

/// A named permission bundle.
///
/// Holds permission ids, not permission records: a permission belongs to the
/// catalog and may be shared by many roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: String,
    description: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    permissions: BTreeSet<PermissionId>,
}

fn normalize_name(name: impl Into<String>) -> Result<String, DomainError> {
    let name = name.into().trim().to_string();
    if name.is_empty() {
        return Err(DomainError::validation("role name cannot be empty"));
    }
    Ok(name)
}

impl Role {
    pub fn create(
        name: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: RoleId::new(),
            name: normalize_name(name)?,
            description,
            active: true,
            created_at: now,
            updated_at: now,
            permissions: BTreeSet::new(),
        })
    }

    pub fn update(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.name = normalize_name(name)?;
        self.description = description;
        self.updated_at = now;
        Ok(())
    }

    /// Add a permission reference. Returns `false` if it was already present.
    pub fn grant(&mut self, permission: PermissionId, now: DateTime<Utc>) -> bool {
        let added = self.permissions.insert(permission);
        if added {
            self.updated_at = now;
        }
        added
    }

    pub fn revoke(&mut self, permission: PermissionId, now: DateTime<Utc>) -> bool {
        let removed = self.permissions.remove(&permission);
        if removed {
            self.updated_at = now;
        }
        removed
    }

    /// Replace the whole permission set.
    pub fn assign_permissions(&mut self, permissions: impl IntoIterator<Item = PermissionId>, now: DateTime<Utc>) {
        self.permissions = permissions.into_iter().collect();
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        if self.active {
            self.active = false;
            self.updated_at = now;
        }
    }

    pub fn activate(&mut self, now: DateTime<Utc>) {
        if !self.active {
            self.active = true;
            self.updated_at = now;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn permission_ids(&self) -> impl Iterator<Item = &PermissionId> {
        self.permissions.iter()
    }

    pub fn has_permission(&self, permission: &PermissionId) -> bool {
        self.permissions.contains(permission)
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_role_is_active_and_empty() {
        let role = Role::create(" auditor ", Some("Read-only".into()), Utc::now()).unwrap();
        assert!(role.is_active());
        assert_eq!(role.name(), "auditor");
        assert_eq!(role.permission_ids().count(), 0);
    }

    #[test]
    fn membership_is_unique() {
        let now = Utc::now();
        let mut role = Role::create("clerk", None, now).unwrap();
        let p = PermissionId::new();

        assert!(role.grant(p, now));
        assert!(!role.grant(p, now));
        assert_eq!(role.permission_ids().count(), 1);
        assert!(role.revoke(p, now));
        assert!(!role.has_permission(&p));
    }

    #[test]
    fn update_renames_and_stamps() {
        let t0 = Utc::now();
        let mut role = Role::create("clerk", None, t0).unwrap();
        let t1 = t0 + Duration::hours(1);

        role.update("senior_clerk", Some("Promoted".into()), t1).unwrap();
        assert_eq!(role.name(), "senior_clerk");
        assert_eq!(role.description(), Some("Promoted"));
        assert_eq!(role.updated_at(), t1);
        assert_eq!(role.created_at(), t0);

        assert!(role.update("   ", None, t1).is_err());
        assert_eq!(role.name(), "senior_clerk");
    }
}
