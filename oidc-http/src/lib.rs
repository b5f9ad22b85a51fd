//! Library surface for the `oidc-http-srv` binary and its integration
//! tests: the route table, the shared [`AppState`] it is built from, and
//! every handler module.

pub mod authorize;
pub mod config;
pub mod cookie;
pub mod error;
pub mod logout;
pub mod middleware;
pub mod state;
pub mod token;
pub mod userinfo;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Assemble the route table and middleware stack from a fully
/// constructed [`AppState`]. Used by `main` and by integration tests, so
/// both exercise the identical router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/openidconnect/authorize",
            get(authorize::authorize_get).post(authorize::authorize_post),
        )
        .route("/openidconnect/token", post(token::token))
        .route("/openidconnect/token/revoke", post(token::revoke))
        .route("/openidconnect/userinfo", get(userinfo::userinfo).post(userinfo::userinfo))
        .route("/openidconnect/public_keys", get(userinfo::public_keys))
        .route("/openidconnect/logout", get(logout::logout).post(logout::logout))
        .route("/cookie/nginx", post(cookie::introspect_nginx))
        .route("/cookie/entry/{domain_id}", get(cookie::cookie_entry))
        .layer(axum::middleware::from_fn(middleware::observability_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
