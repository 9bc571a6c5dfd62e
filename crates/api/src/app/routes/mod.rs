use axum::Router;

pub mod admin;
pub mod auth;
pub mod me;
pub mod system;

/// Router for every endpoint behind the authentication gate layer.
///
/// The gate never rejects, so `/auth/login` and `/auth/refresh` are reachable
/// anonymously; handlers that need an identity ask for it themselves.
pub fn router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/me", me::router())
        .nest("/admin", admin::router())
}
