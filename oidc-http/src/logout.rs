//! `GET/POST /openidconnect/logout`.
//!
//! Deletes the whole session family rooted at the caller's root session
//! (not just the openidconnect child session the cookie names), revokes
//! every outstanding token bound to it, and clears the session cookie.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use oidc_core::cookie::find_session_cookie_id;

use crate::state::AppState;

const ROOT_COOKIE_DOMAIN: &str = "root";

#[derive(Debug, Deserialize)]
pub struct LogoutParams {
    pub post_logout_redirect_uri: Option<String>,
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LogoutParams>,
) -> Response {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if let Some(session_id) =
        find_session_cookie_id(cookie_header, &state.config.cookies.cookie_name, ROOT_COOKIE_DOMAIN)
    {
        if let Err(err) = state.tokens.revoke_session_tokens(session_id).await {
            tracing::warn!(error = ?err, "failed to revoke tokens during logout");
        }
        if let Err(err) = state.sessions.delete_family(session_id).await {
            tracing::warn!(error = ?err, "failed to delete session family during logout");
        }
    }

    let clear_cookie = format!(
        "{}=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Lax",
        state.config.cookies.cookie_name
    );

    // Only honor a post_logout_redirect_uri that matches a registered
    // client's redirect_uri; anything else is a potential open redirect and
    // is silently ignored in favor of a plain 204.
    let redirect_target = params
        .post_logout_redirect_uri
        .filter(|uri| state.clients.is_known_redirect_uri(uri));
    let mut response = match redirect_target {
        Some(uri) => Redirect::to(&uri).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    if let Ok(value) = clear_cookie.parse() {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}
