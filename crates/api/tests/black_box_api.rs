use std::sync::Arc;

use argon2::Params;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::json;

use keystone_api::app::services::{self, AppServices, BootstrapAdmin, USERS_ENTITY};
use keystone_auth::{Permission, PermissionAction, Role};
use keystone_core::{Clock, Entity, SystemClock, UserId};
use keystone_infra::{Argon2CredentialHasher, SecurityConfig};

const ADMIN_PASSWORD: &str = "Admin@1234";
const USER_PASSWORD: &str = "Secure@123";

struct TestServer {
    base_url: String,
    admin_id: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod with cheap hashing, bound to an ephemeral port.
        let hasher = Argon2CredentialHasher::with_params(Params::new(1024, 1, 1, None).unwrap());
        let services = Arc::new(services::build_in_memory_services_with(
            SecurityConfig::default(),
            hasher,
            Arc::new(SystemClock),
        ));
        let admin_id = services
            .bootstrap_admin(BootstrapAdmin {
                username: "root".into(),
                email: "root@example.com".into(),
                password: SecretString::new(ADMIN_PASSWORD.into()),
            })
            .expect("failed to bootstrap admin");

        let app = keystone_api::app::build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            admin_id: admin_id.to_string(),
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Give `user_id` read and delete rights over users through a fresh role.
    fn grant_user_admin(&self, user_id: &str) {
        let user_id: UserId = user_id.parse().unwrap();
        let now = self.services.clock.now();
        let mut role = Role::create(format!("deputy_{user_id}"), None, now).unwrap();
        for action in [PermissionAction::Read, PermissionAction::Delete] {
            let permission = Permission::create(USERS_ENTITY, action, None, None).unwrap();
            role.grant(*permission.id(), now);
            self.services.rbac.insert_permission(permission).unwrap();
        }
        let role_id = *role.id();
        self.services.rbac.save_role(role).unwrap();
        self.services.rbac.assign_role(user_id, role_id).unwrap();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn login(client: &reqwest::Client, srv: &TestServer, identifier: &str, password: &str) -> reqwest::Response {
    client
        .post(srv.url("/auth/login"))
        .json(&json!({ "identifier": identifier, "password": password }))
        .send()
        .await
        .unwrap()
}

async fn login_ok(client: &reqwest::Client, srv: &TestServer, identifier: &str, password: &str) -> serde_json::Value {
    let res = login(client, srv, identifier, password).await;
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn create_user(client: &reqwest::Client, srv: &TestServer, admin_token: &str, username: &str) -> String {
    let res = client
        .post(srv.url("/admin/users"))
        .bearer_auth(admin_token)
        .json(&json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": USER_PASSWORD,
            "first_name": "Test",
            "last_name": "User",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

fn access_token(tokens: &serde_json::Value) -> String {
    tokens["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn anonymous_and_forged_tokens_reach_handlers_as_anonymous() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "authentication_required");

    let res = client.get(srv.url("/me")).bearer_auth("forged").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // A bad Authorization header does not block public endpoints.
    let res = client
        .post(srv.url("/auth/login"))
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .json(&json!({ "identifier": "root", "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_then_whoami() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let tokens = login_ok(&client, &srv, "root", ADMIN_PASSWORD).await;
    assert_eq!(tokens["user_id"].as_str().unwrap(), srv.admin_id);

    let res = client
        .get(srv.url("/me"))
        .bearer_auth(access_token(&tokens))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: serde_json::Value = res.json().await.unwrap();
    assert_eq!(me["username"], "root");
    assert_eq!(me["state"], "ACTIVE");
}

#[tokio::test]
async fn failed_logins_are_indistinguishable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let unknown = login(&client, &srv, "nobody", USER_PASSWORD).await;
    let unknown_status = unknown.status();
    let unknown_body: serde_json::Value = unknown.json().await.unwrap();

    let wrong = login(&client, &srv, "root", "Wrong@1234").await;
    let wrong_status = wrong.status();
    let wrong_body: serde_json::Value = wrong.json().await.unwrap();

    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, wrong_status);
    assert_eq!(unknown_body, wrong_body);
    assert_eq!(wrong_body["error"], "invalid_credentials");
}

#[tokio::test]
async fn lockout_and_admin_unlock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = access_token(&login_ok(&client, &srv, "root", ADMIN_PASSWORD).await);
    let alice = create_user(&client, &srv, &admin, "alice").await;

    for _ in 0..5 {
        let res = login(&client, &srv, "alice", "Wrong@1234").await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
    let res = login(&client, &srv, "alice", USER_PASSWORD).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url(&format!("/admin/users/{alice}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let view: serde_json::Value = res.json().await.unwrap();
    assert_eq!(view["state"], "LOCKED");
    assert_eq!(view["failed_attempts"], 5);

    let res = client
        .post(srv.url(&format!("/admin/users/{alice}/unlock")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    login_ok(&client, &srv, "alice", USER_PASSWORD).await;
}

#[tokio::test]
async fn refresh_until_logout() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tokens = login_ok(&client, &srv, "root", ADMIN_PASSWORD).await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    for _ in 0..2 {
        let res = client
            .post(srv.url("/auth/refresh"))
            .json(&json!({ "refresh_token": refresh }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client
        .post(srv.url("/auth/logout"))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn admin_routes_require_permissions() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = access_token(&login_ok(&client, &srv, "root", ADMIN_PASSWORD).await);
    create_user(&client, &srv, &admin, "bob").await;
    let bob = access_token(&login_ok(&client, &srv, "bob", USER_PASSWORD).await);

    let res = client
        .post(srv.url("/admin/users"))
        .bearer_auth(&bob)
        .json(&json!({
            "username": "eve",
            "email": "eve@example.com",
            "password": USER_PASSWORD,
            "first_name": "Eve",
            "last_name": "X",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/me/permissions"))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["permissions"].as_array().unwrap().is_empty());

    let res = client
        .get(srv.url("/me/permissions"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["permissions"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn admins_cannot_delete_themselves() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = access_token(&login_ok(&client, &srv, "root", ADMIN_PASSWORD).await);

    let res = client
        .delete(srv.url(&format!("/admin/users/{}", srv.admin_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "protected_user");

    let carol = create_user(&client, &srv, &admin, "carol").await;
    let res = client
        .delete(srv.url(&format!("/admin/users/{carol}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = login(&client, &srv, "carol", USER_PASSWORD).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleted_admin_loses_admin_access_immediately() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let root = access_token(&login_ok(&client, &srv, "root", ADMIN_PASSWORD).await);

    let deputy_id = create_user(&client, &srv, &root, "deputy").await;
    let frank = create_user(&client, &srv, &root, "frank").await;
    srv.grant_user_admin(&deputy_id);
    let deputy = access_token(&login_ok(&client, &srv, "deputy", USER_PASSWORD).await);

    let res = client
        .get(srv.url(&format!("/admin/users/{frank}")))
        .bearer_auth(&deputy)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url(&format!("/admin/users/{deputy_id}")))
        .bearer_auth(&root)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    for path in [format!("/admin/users/{frank}"), "/me/permissions".to_string()] {
        let res = client.get(srv.url(&path)).bearer_auth(&deputy).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
    let res = client
        .delete(srv.url(&format!("/admin/users/{frank}")))
        .bearer_auth(&deputy)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn weak_passwords_are_rejected_on_create() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = access_token(&login_ok(&client, &srv, "root", ADMIN_PASSWORD).await);

    let res = client
        .post(srv.url("/admin/users"))
        .bearer_auth(&admin)
        .json(&json!({
            "username": "dave",
            "email": "dave@example.com",
            "password": "secure123",
            "first_name": "Dave",
            "last_name": "X",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "weak_credential");
}
