//! Thin wrapper mapping domain errors onto axum responses.
//!
//! Most handlers return `oidc_core::error::AuthError` directly (it already
//! implements `IntoResponse`). This module adds only what's specific to
//! the HTTP surface: wrapping ad-hoc `anyhow::Error`s from request parsing,
//! and the redirect-bound shape the authorize handler needs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use oidc_core::error::AuthorizeError;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error(transparent)]
    Auth(#[from] oidc_core::error::AuthError),

    #[error("internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::Auth(err) => err.into_response(),
            HttpError::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

/// Build the redirect response for an authorize-endpoint failure,
/// carrying `error`/`error_description` (and `state`, if present) in the
/// query string, per the OAuth2 error-reply shape.
pub fn authorize_error_redirect(
    redirect_uri: &str,
    state: Option<&str>,
    error: &AuthorizeError,
) -> Response {
    let mut url = match Url::parse(redirect_uri) {
        Ok(url) => url,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid redirect_uri").into_response(),
    };
    {
        let mut qs = url.query_pairs_mut();
        qs.append_pair("error", error.code());
        qs.append_pair("error_description", &error.description());
        if let Some(state) = state {
            qs.append_pair("state", state);
        }
    }
    Redirect::to(url.as_str()).into_response()
}
