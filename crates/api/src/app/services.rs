//! Service wiring for the HTTP layer.

use std::sync::Arc;

use chrono::Duration;
use secrecy::SecretString;

use keystone_auth::{Permission, PermissionAction, Role, TokenVerifier};
use keystone_core::{Clock, Entity, SystemClock, UserId};
use keystone_infra::{
    AccountAdminService, Argon2CredentialHasher, AuthenticationService, AuthorizationService, Collaborators,
    InMemoryAccessTokens, InMemoryRbacRepository, InMemoryRefreshTokenRepository, InMemoryUserRepository,
    RandomTokenGenerator, Registration, SecurityConfig, ServiceError,
};

/// Entity name guarded by the admin user routes.
pub const USERS_ENTITY: &str = "users";

pub const ADMIN_ROLE: &str = "administrator";

pub const ENV_BOOTSTRAP_ADMIN_USERNAME: &str = "KEYSTONE_BOOTSTRAP_ADMIN_USERNAME";
pub const ENV_BOOTSTRAP_ADMIN_EMAIL: &str = "KEYSTONE_BOOTSTRAP_ADMIN_EMAIL";
pub const ENV_BOOTSTRAP_ADMIN_PASSWORD: &str = "KEYSTONE_BOOTSTRAP_ADMIN_PASSWORD";

pub struct AppServices {
    pub auth: AuthenticationService,
    pub accounts: AccountAdminService,
    pub authz: AuthorizationService,
    pub rbac: Arc<InMemoryRbacRepository>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub clock: Arc<dyn Clock>,
    pub config: SecurityConfig,
}

/// In-memory wiring (dev/test): stores, argon2 hasher, opaque access tokens.
pub fn build_in_memory_services(config: SecurityConfig) -> AppServices {
    build_in_memory_services_with(config, Argon2CredentialHasher::new(), Arc::new(SystemClock))
}

pub fn build_in_memory_services_with(
    config: SecurityConfig,
    hasher: Argon2CredentialHasher,
    clock: Arc<dyn Clock>,
) -> AppServices {
    let generator = Arc::new(RandomTokenGenerator::default());
    let access_tokens = Arc::new(InMemoryAccessTokens::new(
        generator.clone(),
        clock.clone(),
        Duration::minutes(i64::from(config.access_token_ttl_minutes)),
    ));
    let rbac = Arc::new(InMemoryRbacRepository::new());

    let deps = Collaborators {
        users: Arc::new(InMemoryUserRepository::new()),
        refresh_tokens: Arc::new(InMemoryRefreshTokenRepository::new()),
        rbac: rbac.clone(),
        hasher: Arc::new(hasher),
        token_generator: generator,
        access_tokens: access_tokens.clone(),
        clock: clock.clone(),
    };

    AppServices {
        auth: AuthenticationService::new(deps.clone(), config.clone()),
        accounts: AccountAdminService::new(deps.clone(), config.clone()),
        authz: AuthorizationService::new(deps),
        rbac,
        verifier: access_tokens,
        clock,
        config,
    }
}

/// First administrator, created at startup when configured.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

impl BootstrapAdmin {
    /// All three variables must be set; otherwise no admin is created.
    pub fn from_env() -> Option<Self> {
        let var = |key| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Some(Self {
            username: var(ENV_BOOTSTRAP_ADMIN_USERNAME)?,
            email: var(ENV_BOOTSTRAP_ADMIN_EMAIL)?,
            password: SecretString::new(var(ENV_BOOTSTRAP_ADMIN_PASSWORD)?),
        })
    }
}

impl AppServices {
    /// Register an account holding every unconditional permission on users.
    pub fn bootstrap_admin(&self, admin: BootstrapAdmin) -> Result<UserId, ServiceError> {
        let user_id = self.accounts.register(
            Registration {
                username: admin.username,
                email: admin.email,
                password: admin.password,
                first_name: "System".into(),
                last_name: "Administrator".into(),
                document: None,
            },
            None,
        )?;

        let actions = [
            PermissionAction::Create,
            PermissionAction::Read,
            PermissionAction::Update,
            PermissionAction::Delete,
            PermissionAction::List,
        ];
        let now = self.clock.now();
        let mut role = Role::create(ADMIN_ROLE, Some("Full user administration".into()), now)?;
        for action in actions {
            let permission = Permission::create(USERS_ENTITY, action, None, None)?;
            role.grant(*permission.id(), now);
            self.rbac.insert_permission(permission)?;
        }
        let role_id = *role.id();
        self.rbac.save_role(role)?;
        self.rbac.assign_role(user_id, role_id)?;

        tracing::info!(user_id = %user_id, "bootstrap administrator created");
        Ok(user_id)
    }
}
