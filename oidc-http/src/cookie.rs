//! `POST /cookie/nginx` (session cookie → Bearer introspection for
//! reverse proxies) and `GET /cookie/entry/{domain_id}` (authorization
//! code → session cookie exchange for a named application domain).

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use oidc_core::cookie::{CookieStripper, encode_cookie_value, find_session_cookie_id};
use oidc_core::token::TokenKind;

use crate::state::AppState;

const ROOT_COOKIE_DOMAIN: &str = "root";
/// Whitelist of user-info projection fields `add=<field>` may request,
/// each emitted as `X-<Field>`.
const ALLOWED_PROJECTION_FIELDS: &[&str] = &["email", "username"];

#[derive(Debug, Deserialize)]
pub struct IntrospectParams {
    pub domain_id: Option<String>,
    pub keepcookie: Option<String>,
    #[serde(default)]
    pub add: Vec<String>,
}

fn clear_cookie_header(cookie_name: &str) -> HeaderValue {
    format!("{cookie_name}=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Lax")
        .parse()
        .expect("clear-cookie header value is always valid")
}

/// `POST /cookie/nginx`. Resolves the session cookie to a short-lived
/// Bearer access token and optional `X-<Field>` identity headers, and
/// strips this application's cookie from the forwarded `Cookie` header.
pub async fn introspect_nginx(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<IntrospectParams>,
) -> Response {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let domain_id = params.domain_id.as_deref().unwrap_or(ROOT_COOKIE_DOMAIN);

    let Some(session_id) =
        find_session_cookie_id(cookie_header, &state.config.cookies.cookie_name, domain_id)
    else {
        return unauthorized(&state);
    };

    let session = match state.sessions.get(session_id).await {
        Ok(Some(session)) if !session.is_expired() => session,
        _ => return unauthorized(&state),
    };

    let expected_modified_at = session.modified_at;
    let mut touched = session.clone();
    touched.touch(Utc::now() + Duration::seconds(state.config.tokens.root_session_expiration_secs));
    if let Err(err) = state.sessions.update(touched, expected_modified_at).await {
        tracing::warn!(error = ?err, "failed to slide session expiry during introspection");
    }

    let access = match state
        .tokens
        .mint(
            TokenKind::AccessToken,
            session_id,
            Duration::seconds(state.config.tokens.access_token_expiration_secs),
            None,
        )
        .await
    {
        Ok(issued) => issued,
        Err(err) => {
            tracing::error!(error = ?err, "failed to mint introspection access token");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    let bearer = format!("Bearer {}", access.plaintext);
    if let Ok(value) = bearer.parse() {
        response_headers.insert(header::AUTHORIZATION, value);
    }

    if params.keepcookie.is_none() {
        let stripper = CookieStripper::new(&state.config.cookies.cookie_name);
        let stripped = stripper.strip(cookie_header);
        if let Ok(value) = stripped.parse() {
            response_headers.insert(header::COOKIE, value);
        }
    } else if let Ok(value) = cookie_header.parse() {
        response_headers.insert(header::COOKIE, value);
    }

    let credentials_id = session.credentials_id.clone().unwrap_or_default();
    if !params.add.is_empty() {
        if let Ok(Some(detail)) = state.credentials.get(&credentials_id).await {
            for field in &params.add {
                if !ALLOWED_PROJECTION_FIELDS.contains(&field.as_str()) {
                    continue;
                }
                let value = match field.as_str() {
                    "email" => detail.email.clone(),
                    "username" => Some(detail.username.clone()),
                    _ => None,
                };
                if let Some(value) = value {
                    let header_name = format!("X-{}", capitalize(field));
                    if let (Ok(name), Ok(value)) = (
                        HeaderName::from_bytes(header_name.as_bytes()),
                        HeaderValue::from_str(&value),
                    ) {
                        response_headers.insert(name, value);
                    }
                }
            }
        }
    }

    (StatusCode::OK, response_headers).into_response()
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn unauthorized(state: &AppState) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, clear_cookie_header(&state.config.cookies.cookie_name));
    (StatusCode::UNAUTHORIZED, headers).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CookieEntryParams {
    pub grant_type: String,
    pub code: String,
}

/// `GET /cookie/entry/{domain_id}`. Exchanges an authorization code for a
/// domain-scoped session cookie and redirects to that domain's configured
/// redirect_uri. An unrecognized `domain_id` is a client error (§9 open
/// question: fail closed rather than silently passing the request through).
pub async fn cookie_entry(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
    Query(params): Query<CookieEntryParams>,
) -> Response {
    let Some(domain) = state.config.cookies.domain_by_id(&domain_id) else {
        return (StatusCode::BAD_REQUEST, "invalid_domain").into_response();
    };
    let domain = domain.clone();

    if params.grant_type != "authorization_code" {
        return (StatusCode::BAD_REQUEST, "invalid_request").into_response();
    }

    let session_id = match state.tokens.take(&params.code, TokenKind::AuthorizationCode).await {
        Ok(Some(id)) => id,
        Ok(None) => return (StatusCode::BAD_REQUEST, "invalid_grant").into_response(),
        Err(err) => {
            tracing::error!(error = ?err, "failed to redeem cookie-entry code");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let session = match state.sessions.get(session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return (StatusCode::BAD_REQUEST, "invalid_grant").into_response(),
        Err(err) => {
            tracing::error!(error = ?err, "failed to load session for cookie entry");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cookie_value = encode_cookie_value(&domain_id, session.session_id);
    let set_cookie = format!(
        "{}={}; Domain={}; Path=/; HttpOnly; Secure; SameSite=Lax",
        state.config.cookies.cookie_name, cookie_value, domain.domain
    );

    let mut response = Redirect::to(&domain.redirect_uri).into_response();
    if let Ok(value) = set_cookie.parse() {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalize_header_field() {
        assert_eq!(capitalize("email"), "Email");
        assert_eq!(capitalize(""), "");
    }
}
