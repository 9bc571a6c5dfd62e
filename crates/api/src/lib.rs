//! HTTP API: routing, the authentication gate layer, and request/response
//! mapping onto the account security services.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
