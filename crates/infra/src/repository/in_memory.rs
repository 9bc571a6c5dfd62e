use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use keystone_auth::{Permission, RefreshToken, Role, User, UserRecord, revoke_all};
use keystone_core::{AggregateRoot, Entity, ExpectedVersion, PermissionId, RoleId, UserId};

use super::{RbacRepository, RefreshTokenRepository, RepositoryError, UserRepository};

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory account store keeping flat [`UserRecord`]s.
///
/// Intended for tests/dev. Uniqueness scans are linear.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    records: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_live<P>(&self, predicate: P) -> Result<Option<User>, RepositoryError>
    where
        P: Fn(&UserRecord) -> bool,
    {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .values()
            .find(|r| r.deleted_at.is_none() && predicate(r))
            .cloned()
            .map(User::restore))
    }

    fn ensure_unique(
        records: &HashMap<UserId, UserRecord>,
        candidate: &UserRecord,
    ) -> Result<(), RepositoryError> {
        if candidate.deleted_at.is_some() {
            return Ok(());
        }
        for other in records.values() {
            if other.id == candidate.id || other.deleted_at.is_some() {
                continue;
            }
            if other.username == candidate.username {
                return Err(RepositoryError::Duplicate(format!(
                    "username '{}' is taken",
                    candidate.username
                )));
            }
            if other.email == candidate.email {
                return Err(RepositoryError::Duplicate(format!(
                    "email '{}' is taken",
                    candidate.email
                )));
            }
        }
        Ok(())
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.find_live(|r| r.id == id)
    }

    fn find_by_id_including_deleted(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(&id).cloned().map(User::restore))
    }

    fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.find_live(|r| r.username.as_str() == username)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = email.trim().to_lowercase();
        self.find_live(|r| r.email.as_str() == email)
    }

    fn insert(&self, user: User) -> Result<(), RepositoryError> {
        let record = user.to_record();
        let mut records = self.records.write().map_err(poisoned)?;

        if records.contains_key(&record.id) {
            return Err(RepositoryError::Duplicate(format!("user {} already exists", record.id)));
        }
        Self::ensure_unique(&records, &record)?;

        records.insert(record.id, record);
        Ok(())
    }

    fn save(&self, user: User, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        let record = user.to_record();
        let mut records = self.records.write().map_err(poisoned)?;

        let stored = records.get(&record.id).ok_or(RepositoryError::NotFound)?;
        expected
            .check(stored.version)
            .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
        Self::ensure_unique(&records, &record)?;

        tracing::trace!(user_id = %record.id, version = user.version(), "user saved");
        records.insert(record.id, record);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh tokens
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory refresh token store keyed by the bearer string.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenRepository {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl InMemoryRefreshTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefreshTokenRepository for InMemoryRefreshTokenRepository {
    fn insert(&self, token: RefreshToken) -> Result<(), RepositoryError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        if tokens.contains_key(token.token()) {
            return Err(RepositoryError::Duplicate("refresh token collision".to_string()));
        }
        tokens.insert(token.token().to_string(), token);
        Ok(())
    }

    fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        let tokens = self.tokens.read().map_err(poisoned)?;
        Ok(tokens.get(token).cloned())
    }

    fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<RefreshToken>, RepositoryError> {
        let tokens = self.tokens.read().map_err(poisoned)?;
        let mut owned: Vec<RefreshToken> = tokens
            .values()
            .filter(|t| t.user_id() == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|t| t.created_at());
        Ok(owned)
    }

    fn revoke(&self, token: &str) -> Result<bool, RepositoryError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        Ok(tokens.get_mut(token).is_some_and(RefreshToken::revoke))
    }

    fn revoke_all_by_user_id(&self, user_id: UserId) -> Result<usize, RepositoryError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        Ok(revoke_all(tokens.values_mut(), user_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles and permissions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RbacState {
    permissions: HashMap<PermissionId, Permission>,
    roles: HashMap<RoleId, Role>,
    assignments: HashMap<UserId, BTreeSet<RoleId>>,
}

/// In-memory role/permission catalog plus user-role assignments.
///
/// The management methods stand in for the external administration surface
/// that owns these records.
#[derive(Debug, Default)]
pub struct InMemoryRbacRepository {
    state: RwLock<RbacState>,
}

impl InMemoryRbacRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_permission(&self, permission: Permission) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.permissions.insert(*permission.id(), permission);
        Ok(())
    }

    pub fn remove_permission(&self, id: PermissionId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().map_err(poisoned)?;
        Ok(state.permissions.remove(&id).is_some())
    }

    /// Insert or replace a role. Role names are unique.
    pub fn save_role(&self, role: Role) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state
            .roles
            .values()
            .any(|r| r.id() != role.id() && r.name() == role.name())
        {
            return Err(RepositoryError::Duplicate(format!("role '{}' already exists", role.name())));
        }
        state.roles.insert(*role.id(), role);
        Ok(())
    }

    pub fn assign_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if !state.roles.contains_key(&role_id) {
            return Err(RepositoryError::NotFound);
        }
        Ok(state.assignments.entry(user_id).or_default().insert(role_id))
    }

    pub fn unassign_role(&self, user_id: UserId, role_id: RoleId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().map_err(poisoned)?;
        Ok(state
            .assignments
            .get_mut(&user_id)
            .is_some_and(|roles| roles.remove(&role_id)))
    }
}

impl RbacRepository for InMemoryRbacRepository {
    fn roles_for_user(&self, user_id: UserId) -> Result<Vec<Role>, RepositoryError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .assignments
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.roles.get(id).cloned())
            .collect())
    }

    fn find_role(&self, id: RoleId) -> Result<Option<Role>, RepositoryError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.roles.get(&id).cloned())
    }

    fn find_permissions(&self, ids: &BTreeSet<PermissionId>) -> Result<Vec<Permission>, RepositoryError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.permissions.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, Utc};
    use keystone_auth::{EmailAddress, NewUser, PasswordHash, PermissionAction, Username};

    fn user(username: &str, email: &str) -> User {
        User::create(
            UserId::new(),
            NewUser {
                username: Username::parse(username).unwrap(),
                email: EmailAddress::parse(email).unwrap(),
                password_hash: PasswordHash::new("hash"),
                first_name: "Test".into(),
                last_name: "User".into(),
                document: None,
                created_by: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn stale_save_is_a_conflict() {
        let repo = InMemoryUserRepository::new();
        let alice = user("alice", "alice@example.com");
        let id = *alice.id();
        repo.insert(alice).unwrap();

        let mut first = repo.find_by_id(id).unwrap().unwrap();
        let mut second = repo.find_by_id(id).unwrap().unwrap();
        let loaded = first.version();

        first.record_failed_login(Utc::now());
        repo.save(first, ExpectedVersion::Exact(loaded)).unwrap();

        second.record_failed_login(Utc::now());
        let err = repo.save(second, ExpectedVersion::Exact(loaded)).unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        assert_eq!(repo.find_by_id(id).unwrap().unwrap().failed_attempts(), 1);
    }

    #[test]
    fn username_and_email_are_unique_among_live_accounts() {
        let repo = InMemoryUserRepository::new();
        let alice = user("alice", "alice@example.com");
        let alice_id = *alice.id();
        repo.insert(alice).unwrap();

        assert!(matches!(
            repo.insert(user("alice", "other@example.com")),
            Err(RepositoryError::Duplicate(_))
        ));
        assert!(matches!(
            repo.insert(user("alice2", "ALICE@example.com")),
            Err(RepositoryError::Duplicate(_))
        ));

        let mut deleted = repo.find_by_id(alice_id).unwrap().unwrap();
        let v = deleted.version();
        deleted.soft_delete(Utc::now(), None);
        repo.save(deleted, ExpectedVersion::Exact(v)).unwrap();

        repo.insert(user("alice", "alice@example.com")).unwrap();
    }

    #[test]
    fn deleted_accounts_are_hidden_from_default_lookups() {
        let repo = InMemoryUserRepository::new();
        let mut bob = user("bob", "bob@example.com");
        let id = *bob.id();
        bob.soft_delete(Utc::now(), None);
        repo.insert(bob).unwrap();

        assert!(repo.find_by_id(id).unwrap().is_none());
        assert!(repo.find_by_username("bob").unwrap().is_none());
        assert!(repo.find_by_email("bob@example.com").unwrap().is_none());
        assert!(repo.find_by_id_including_deleted(id).unwrap().is_some());
    }

    #[test]
    fn revoke_all_leaves_other_users_alone() {
        let repo = InMemoryRefreshTokenRepository::new();
        let now = Utc::now();
        let alice = UserId::new();
        let bob = UserId::new();

        repo.insert(RefreshToken::issue(alice, "a1".into(), 7, now)).unwrap();
        repo.insert(RefreshToken::issue(alice, "a2".into(), 7, now + Duration::seconds(1))).unwrap();
        repo.insert(RefreshToken::issue(bob, "b1".into(), 7, now)).unwrap();

        assert_eq!(repo.revoke_all_by_user_id(alice).unwrap(), 2);
        assert_eq!(repo.revoke_all_by_user_id(alice).unwrap(), 0);
        assert!(repo.find_by_token("b1").unwrap().unwrap().is_valid(now));
        assert!(repo.find_by_user_id(alice).unwrap().iter().all(|t| t.is_revoked()));
    }

    #[test]
    fn duplicate_token_strings_are_rejected() {
        let repo = InMemoryRefreshTokenRepository::new();
        let now = Utc::now();
        repo.insert(RefreshToken::issue(UserId::new(), "same".into(), 7, now)).unwrap();
        assert!(matches!(
            repo.insert(RefreshToken::issue(UserId::new(), "same".into(), 7, now)),
            Err(RepositoryError::Duplicate(_))
        ));
        assert!(!repo.revoke("missing").unwrap());
        assert!(repo.revoke("same").unwrap());
        assert!(!repo.revoke("same").unwrap());
    }

    #[test]
    fn roles_resolve_through_assignments() {
        let repo = InMemoryRbacRepository::new();
        let now = Utc::now();
        let read = Permission::create("users", PermissionAction::Read, None, None).unwrap();
        let read_id = *read.id();
        repo.insert_permission(read).unwrap();

        let mut viewer = Role::create("viewer", None, now).unwrap();
        viewer.grant(read_id, now);
        let viewer_id = *viewer.id();
        repo.save_role(viewer).unwrap();

        assert!(matches!(
            repo.save_role(Role::create("viewer", None, now).unwrap()),
            Err(RepositoryError::Duplicate(_))
        ));

        let user_id = UserId::new();
        assert!(repo.assign_role(user_id, viewer_id).unwrap());
        assert!(matches!(
            repo.assign_role(user_id, RoleId::new()),
            Err(RepositoryError::NotFound)
        ));

        let roles = repo.roles_for_user(user_id).unwrap();
        assert_eq!(roles.len(), 1);

        let ids: BTreeSet<_> = [read_id, PermissionId::new()].into_iter().collect();
        assert_eq!(repo.find_permissions(&ids).unwrap().len(), 1);

        assert!(repo.unassign_role(user_id, viewer_id).unwrap());
        assert!(repo.roles_for_user(user_id).unwrap().is_empty());
    }
}
