//! User account state machine.
//!
//! Credential state is encoded by three raw fields (`active`,
//! `failed_attempts`, `deleted_at`) that jointly yield four logical states.
//! Callers only see the derived predicates and [`AccountState`]; the raw
//! flags stay private so the encoding can change without breaking them.
//!
//! Transitions are plain in-memory mutations. Serializing concurrent
//! transitions on the same account is the job of the surrounding
//! read-modify-write (see [`AggregateRoot::version`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::{AggregateRoot, DocumentTypeId, UserId};

use crate::AuthError;
use crate::credentials::{EmailAddress, PasswordHash, Username};

/// Failed logins at which an account locks.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Derived state
// ─────────────────────────────────────────────────────────────────────────────

/// Logical account state, derived from the stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountState {
    /// Enabled and able to authenticate.
    Active,
    /// Disabled by an administrator; not a lockout.
    Deactivated,
    /// Disabled by reaching [`MAX_FAILED_ATTEMPTS`]; needs an explicit unlock.
    Locked,
    /// Logically deleted. Terminal and supersedes the others.
    Deleted,
}

impl core::fmt::Display for AccountState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AccountState::Active => write!(f, "Active"),
            AccountState::Deactivated => write!(f, "Deactivated"),
            AccountState::Locked => write!(f, "Locked"),
            AccountState::Deleted => write!(f, "Deleted"),
        }
    }
}

/// Result of recording a failed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    /// Counter value after the increment.
    pub attempts: u32,
    /// True when this failure is the one that locked the account.
    pub locked_now: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Value types
// ─────────────────────────────────────────────────────────────────────────────

/// Optional identity document attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDocument {
    pub document_type_id: DocumentTypeId,
    pub number: String,
}

/// Audit stamps. `*_by` is the acting user, absent for self-service/system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<UserId>,
}

/// Input for [`User::create`]. Identity fields are already policy-checked by
/// construction; the password was validated before it was hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Username,
    pub email: EmailAddress,
    pub password_hash: PasswordHash,
    pub first_name: String,
    pub last_name: String,
    pub document: Option<IdentityDocument>,
    pub created_by: Option<UserId>,
}

/// Contact fields replaced by [`User::update_profile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub email: EmailAddress,
    pub first_name: String,
    pub last_name: String,
    pub document: Option<IdentityDocument>,
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A user account: identity plus credential state.
///
/// # Invariants
/// - `failed_attempts` only grows through [`User::record_failed_login`] and
///   only resets through [`User::record_successful_login`] or [`User::unlock`].
/// - Reaching [`MAX_FAILED_ATTEMPTS`] disables the account and stamps `locked_at`
///   in the same transition.
/// - Once deleted, an account stays deleted.
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
    username: Username,
    email: EmailAddress,
    password_hash: PasswordHash,
    first_name: String,
    last_name: String,
    document: Option<IdentityDocument>,
    active: bool,
    failed_attempts: u32,
    locked_at: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
    last_failed_login_at: Option<DateTime<Utc>>,
    audit: AuditTrail,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
}

impl User {
    /// Create an active account with a clean failure counter.
    pub fn create(id: UserId, new: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            document: new.document,
            active: true,
            failed_attempts: 0,
            locked_at: None,
            last_login: None,
            last_failed_login_at: None,
            audit: AuditTrail {
                created_at: now,
                created_by: new.created_by,
                updated_at: now,
                updated_by: new.created_by,
            },
            deleted_at: None,
            version: 1,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Predicates
    // ─────────────────────────────────────────────────────────────────────────

    /// Disabled because the failure threshold was reached.
    pub fn is_locked(&self) -> bool {
        !self.active && self.failed_attempts >= MAX_FAILED_ATTEMPTS
    }

    pub fn is_enabled(&self) -> bool {
        self.active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn state(&self) -> AccountState {
        if self.is_deleted() {
            AccountState::Deleted
        } else if self.active {
            AccountState::Active
        } else if self.is_locked() {
            AccountState::Locked
        } else {
            AccountState::Deactivated
        }
    }

    /// Reject accounts that must not reach a credential check.
    ///
    /// The returned cause is for internal use; callers facing an
    /// unauthenticated client collapse it with [`AuthError::into_public`].
    pub fn ensure_can_authenticate(&self) -> Result<(), AuthError> {
        match self.state() {
            AccountState::Active => Ok(()),
            AccountState::Deleted => Err(AuthError::AccountDeleted),
            AccountState::Locked => Err(AuthError::AccountLocked),
            AccountState::Deactivated => Err(AuthError::AccountDeactivated),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Login outcomes (never fail)
    // ─────────────────────────────────────────────────────────────────────────

    /// Count a failed credential check, locking the account at the threshold.
    ///
    /// A repeat failure on an already locked account keeps the original
    /// `locked_at`.
    pub fn record_failed_login(&mut self, now: DateTime<Utc>) -> FailedLogin {
        let was_locked = self.is_locked();

        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.last_failed_login_at = Some(now);

        if self.failed_attempts >= MAX_FAILED_ATTEMPTS {
            self.active = false;
            self.locked_at.get_or_insert(now);
        }
        self.version += 1;

        FailedLogin {
            attempts: self.failed_attempts,
            locked_now: !was_locked && self.is_locked(),
        }
    }

    /// Record a successful credential check.
    ///
    /// Resets the failure counter but never re-enables the account.
    pub fn record_successful_login(&mut self, now: DateTime<Utc>) {
        self.last_login = Some(now);
        self.failed_attempts = 0;
        self.last_failed_login_at = None;
        self.version += 1;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administrative transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Clear a lockout (or an administrative deactivation) and re-enable.
    pub fn unlock(&mut self, now: DateTime<Utc>, actor: Option<UserId>) {
        self.active = true;
        self.failed_attempts = 0;
        self.locked_at = None;
        self.stamp(now, actor);
    }

    /// Administratively disable the account. Keeps the failure counter.
    pub fn deactivate(&mut self, now: DateTime<Utc>, actor: Option<UserId>) {
        if self.active {
            self.active = false;
            self.stamp(now, actor);
        }
    }

    /// Re-enable an administratively deactivated account.
    ///
    /// A locked account is refused: only [`User::unlock`] clears a lockout.
    pub fn activate(&mut self, now: DateTime<Utc>, actor: Option<UserId>) -> Result<(), AuthError> {
        match self.state() {
            AccountState::Deleted => Err(AuthError::AccountDeleted),
            AccountState::Locked => Err(AuthError::AccountLocked),
            AccountState::Active => Ok(()),
            AccountState::Deactivated => {
                self.active = true;
                self.stamp(now, actor);
                Ok(())
            }
        }
    }

    /// Mark the account as logically deleted. Idempotent; the first
    /// deletion timestamp is kept.
    pub fn soft_delete(&mut self, now: DateTime<Utc>, actor: Option<UserId>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
            self.stamp(now, actor);
        }
    }

    /// Replace contact fields. Lockout state is untouched.
    pub fn update_profile(&mut self, update: ProfileUpdate, now: DateTime<Utc>, actor: Option<UserId>) {
        self.email = update.email;
        self.first_name = update.first_name.trim().to_string();
        self.last_name = update.last_name.trim().to_string();
        self.document = update.document;
        self.stamp(now, actor);
    }

    /// Replace the stored password hash. Lockout state is untouched.
    pub fn update_password_hash(&mut self, hash: PasswordHash, now: DateTime<Utc>, actor: Option<UserId>) {
        self.password_hash = hash;
        self.stamp(now, actor);
    }

    fn stamp(&mut self, now: DateTime<Utc>, actor: Option<UserId>) {
        self.audit.updated_at = now;
        self.audit.updated_by = actor;
        self.version += 1;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn password_hash(&self) -> &PasswordHash {
        &self.password_hash
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn document(&self) -> Option<&IdentityDocument> {
        self.document.as_ref()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.locked_at
    }

    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }

    pub fn last_failed_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_failed_login_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Guards
// ─────────────────────────────────────────────────────────────────────────────

/// Refuse a restricted operation aimed at the protected account.
///
/// Fails iff `protected` is present and equals `target`.
pub fn ensure_not_protected_user(target: UserId, protected: Option<UserId>) -> Result<(), AuthError> {
    match protected {
        Some(protected) if protected == target => Err(AuthError::ProtectedUserViolation),
        _ => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage record
// ─────────────────────────────────────────────────────────────────────────────

/// Flat storage representation of a [`User`].
///
/// Storage adapters round-trip through this type; it is the only place the
/// raw flags are visible outside the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: Username,
    pub email: EmailAddress,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub document: Option<IdentityDocument>,
    pub active: bool,
    pub failed_attempts: u32,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub audit: AuditTrail,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl User {
    pub fn to_record(&self) -> UserRecord {
        UserRecord {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            password_hash: self.password_hash.expose().to_string(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            document: self.document.clone(),
            active: self.active,
            failed_attempts: self.failed_attempts,
            locked_at: self.locked_at,
            last_login: self.last_login,
            last_failed_login_at: self.last_failed_login_at,
            audit: self.audit.clone(),
            deleted_at: self.deleted_at,
            version: self.version,
        }
    }

    pub fn restore(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            password_hash: PasswordHash::new(record.password_hash),
            first_name: record.first_name,
            last_name: record.last_name,
            document: record.document,
            active: record.active,
            failed_attempts: record.failed_attempts,
            locked_at: record.locked_at,
            last_login: record.last_login,
            last_failed_login_at: record.last_failed_login_at,
            audit: record.audit,
            deleted_at: record.deleted_at,
            version: record.version,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn alice() -> User {
        User::create(
            UserId::new(),
            NewUser {
                username: Username::parse("alice").unwrap(),
                email: EmailAddress::parse("alice@example.com").unwrap(),
                password_hash: PasswordHash::new("hash"),
                first_name: "Alice".to_string(),
                last_name: "Smith".to_string(),
                document: None,
                created_by: None,
            },
            now(),
        )
    }

    #[test]
    fn created_user_is_active_with_clean_counter() {
        let user = alice();
        assert!(user.is_enabled());
        assert!(!user.is_locked());
        assert!(!user.is_deleted());
        assert_eq!(user.failed_attempts(), 0);
        assert_eq!(user.state(), AccountState::Active);
    }

    #[test]
    fn lockout_scenario() {
        let mut user = alice();
        let t = now();

        for i in 1..=4 {
            let outcome = user.record_failed_login(t);
            assert_eq!(outcome.attempts, i);
            assert!(!outcome.locked_now);
        }
        assert!(!user.is_locked());
        assert!(user.is_enabled());

        let outcome = user.record_failed_login(t);
        assert!(outcome.locked_now);
        assert!(user.is_locked());
        assert!(!user.is_enabled());
        assert_eq!(user.locked_at(), Some(t));
        assert_eq!(user.state(), AccountState::Locked);

        user.unlock(t, None);
        assert!(!user.is_locked());
        assert!(user.is_enabled());
        assert_eq!(user.failed_attempts(), 0);
        assert_eq!(user.locked_at(), None);
    }

    #[test]
    fn success_just_below_threshold_resets_counter() {
        let mut user = alice();
        for _ in 0..MAX_FAILED_ATTEMPTS - 1 {
            user.record_failed_login(now());
        }

        let t = now();
        user.record_successful_login(t);
        assert_eq!(user.failed_attempts(), 0);
        assert!(user.is_enabled());
        assert_eq!(user.last_login(), Some(t));
        assert_eq!(user.last_failed_login_at(), None);
    }

    #[test]
    fn success_does_not_reenable_locked_account() {
        let mut user = alice();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            user.record_failed_login(now());
        }
        user.record_successful_login(now());
        assert!(!user.is_enabled());
    }

    #[test]
    fn repeat_failure_keeps_first_lock_time() {
        let mut user = alice();
        let t0 = now();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            user.record_failed_login(t0);
        }
        let outcome = user.record_failed_login(t0 + Duration::minutes(5));
        assert!(!outcome.locked_now);
        assert_eq!(outcome.attempts, MAX_FAILED_ATTEMPTS + 1);
        assert_eq!(user.locked_at(), Some(t0));
    }

    #[test]
    fn deactivation_is_not_a_lockout() {
        let mut user = alice();
        user.record_failed_login(now());
        user.deactivate(now(), None);

        assert!(!user.is_enabled());
        assert!(!user.is_locked());
        assert_eq!(user.failed_attempts(), 1);
        assert_eq!(user.state(), AccountState::Deactivated);
        assert_eq!(user.ensure_can_authenticate(), Err(AuthError::AccountDeactivated));

        user.activate(now(), None).unwrap();
        assert_eq!(user.state(), AccountState::Active);
    }

    #[test]
    fn activate_refuses_locked_account() {
        let mut user = alice();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            user.record_failed_login(now());
        }
        assert_eq!(user.activate(now(), None), Err(AuthError::AccountLocked));
        assert!(user.is_locked());
    }

    #[test]
    fn deletion_supersedes_other_states() {
        let mut user = alice();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            user.record_failed_login(now());
        }
        let t = now();
        user.soft_delete(t, None);
        user.soft_delete(t + Duration::days(1), None);

        assert!(user.is_deleted());
        assert_eq!(user.deleted_at(), Some(t));
        assert_eq!(user.state(), AccountState::Deleted);
        assert_eq!(user.ensure_can_authenticate(), Err(AuthError::AccountDeleted));

        user.unlock(now(), None);
        assert_eq!(user.state(), AccountState::Deleted);
    }

    #[test]
    fn profile_and_password_updates_keep_lockout_state() {
        let mut user = alice();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            user.record_failed_login(now());
        }
        let actor = UserId::new();
        let t = now();

        user.update_profile(
            ProfileUpdate {
                email: EmailAddress::parse("alice@corp.example").unwrap(),
                first_name: " Alicia ".to_string(),
                last_name: "Smith".to_string(),
                document: Some(IdentityDocument {
                    document_type_id: DocumentTypeId::new(),
                    number: "123456".to_string(),
                }),
            },
            t,
            Some(actor),
        );
        user.update_password_hash(PasswordHash::new("new-hash"), t, Some(actor));

        assert!(user.is_locked());
        assert_eq!(user.first_name(), "Alicia");
        assert_eq!(user.email().as_str(), "alice@corp.example");
        assert_eq!(user.password_hash().expose(), "new-hash");
        assert_eq!(user.audit().updated_by, Some(actor));
        assert_eq!(user.audit().updated_at, t);
    }

    #[test]
    fn every_transition_bumps_version() {
        let mut user = alice();
        let v = user.version();
        user.record_failed_login(now());
        user.record_successful_login(now());
        user.unlock(now(), None);
        assert_eq!(user.version(), v + 3);
    }

    #[test]
    fn protected_user_guard() {
        let x = UserId::new();
        let y = UserId::new();
        assert_eq!(
            ensure_not_protected_user(x, Some(x)),
            Err(AuthError::ProtectedUserViolation)
        );
        assert!(ensure_not_protected_user(x, None).is_ok());
        assert!(ensure_not_protected_user(x, Some(y)).is_ok());
    }

    #[test]
    fn record_round_trip_preserves_state() {
        let mut user = alice();
        user.record_failed_login(now());
        user.deactivate(now(), None);

        let json = serde_json::to_string(&user.to_record()).unwrap();
        let restored = User::restore(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.state(), AccountState::Deactivated);
        assert_eq!(restored.failed_attempts(), 1);
        assert_eq!(restored.version(), user.version());
        assert_eq!(restored.password_hash().expose(), "hash");
    }

    proptest! {
        #[test]
        fn threshold_failures_always_lock(extra_successes in 0usize..5) {
            let mut user = alice();
            for _ in 0..extra_successes {
                user.record_failed_login(now());
                user.record_successful_login(now());
            }
            for _ in 0..MAX_FAILED_ATTEMPTS {
                user.record_failed_login(now());
            }
            prop_assert!(user.is_locked());
            prop_assert!(!user.is_enabled());
        }

        #[test]
        fn fewer_failures_never_lock(failures in 0u32..MAX_FAILED_ATTEMPTS) {
            let mut user = alice();
            for _ in 0..failures {
                user.record_failed_login(now());
            }
            prop_assert!(!user.is_locked());
            prop_assert!(user.is_enabled());
        }

        #[test]
        fn unlock_always_clears_lock(failures in MAX_FAILED_ATTEMPTS..20u32) {
            let mut user = alice();
            for _ in 0..failures {
                user.record_failed_login(now());
            }
            user.unlock(now(), None);
            prop_assert!(!user.is_locked());
            prop_assert_eq!(user.failed_attempts(), 0);
            prop_assert!(user.is_enabled());
        }
    }
}
