//! Crate-wide error type and its mapping onto HTTP responses.
//!
//! Two shapes are kept deliberately separate: [`AuthError`] covers
//! operations that respond with a plain HTTP status (introspection,
//! token exchange, userinfo), while [`AuthorizeError`] covers failures at
//! the `/openidconnect/authorize` endpoint that must be carried in a
//! redirect's query string once a client and redirect_uri are trusted.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced by token, introspection, userinfo and revocation flows.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not found")]
    NotFound,

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid client")]
    InvalidClient,

    #[error("invalid redirect_uri")]
    InvalidRedirectUri,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AuthError::InvalidGrant(_) => (StatusCode::BAD_REQUEST, "invalid_grant"),
            AuthError::AccessDenied(_) => (StatusCode::FORBIDDEN, "access_denied"),
            AuthError::InvalidClient => (StatusCode::UNAUTHORIZED, "invalid_client"),
            AuthError::InvalidRedirectUri => (StatusCode::BAD_REQUEST, "invalid_redirect_uri"),
            AuthError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AuthError::InvalidScope(_) => (StatusCode::BAD_REQUEST, "invalid_scope"),
            AuthError::UpstreamUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
            }
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let body = serde_json::json!({
            "error": code,
            "error_description": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Error kind carried in an `/openidconnect/authorize` redirect's query
/// string (`error`, `error_description`, echoed `state`).
#[derive(Debug, Clone, Error)]
pub enum AuthorizeError {
    #[error("invalid_request")]
    InvalidRequest(String),

    #[error("invalid_scope")]
    InvalidScope(String),

    #[error("access_denied")]
    AccessDenied(String),

    #[error("unauthorized_tenant")]
    UnauthorizedTenant,

    #[error("user_has_no_tenant")]
    UserHasNoTenant,

    #[error("login_required")]
    LoginRequired,
}

impl AuthorizeError {
    /// The OAuth `error` query parameter value.
    pub fn code(&self) -> &'static str {
        match self {
            AuthorizeError::InvalidRequest(_) => "invalid_request",
            AuthorizeError::InvalidScope(_) => "invalid_scope",
            AuthorizeError::AccessDenied(_) => "access_denied",
            AuthorizeError::UnauthorizedTenant => "unauthorized_tenant",
            AuthorizeError::UserHasNoTenant => "user_has_no_tenant",
            AuthorizeError::LoginRequired => "login_required",
        }
    }

    /// The OAuth `error_description` query parameter value.
    pub fn description(&self) -> String {
        match self {
            AuthorizeError::InvalidRequest(d) => d.clone(),
            AuthorizeError::InvalidScope(d) => d.clone(),
            AuthorizeError::AccessDenied(d) => d.clone(),
            AuthorizeError::UnauthorizedTenant => {
                "the requested tenant is not accessible".to_string()
            }
            AuthorizeError::UserHasNoTenant => "the user has no accessible tenant".to_string(),
            AuthorizeError::LoginRequired => "interactive login is required".to_string(),
        }
    }
}
