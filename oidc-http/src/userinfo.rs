//! `GET/POST /openidconnect/userinfo` and `GET /openidconnect/public_keys`.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde_json::Value;

use oidc_core::error::AuthError;
use oidc_core::token::TokenKind;

use crate::state::AppState;

/// Extract the bearer token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::AccessDenied("missing bearer token".to_string()))?;
    header_value
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::AccessDenied("malformed authorization header".to_string()))
}

pub async fn userinfo(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AuthError> {
    let token = bearer_token(&headers)?;

    let session_id = state
        .tokens
        .lookup(token, TokenKind::AccessToken)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::AccessDenied("access token is unknown or expired".to_string()))?;

    let session = state
        .sessions
        .get(session_id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::AccessDenied("session no longer exists".to_string()))?;

    let credentials_id = session.credentials_id.clone().unwrap_or_default();
    let detail = state
        .credentials
        .get(&credentials_id)
        .await
        .map_err(AuthError::Internal)?;

    let mut claims = serde_json::json!({
        "iss": state.issuer,
        "sub": credentials_id,
        "sid": session.session_id.to_string(),
        "iat": session.created_at.timestamp(),
    });
    if let Some(detail) = detail {
        claims["preferred_username"] = Value::String(detail.username);
        if let Some(email) = detail.email {
            claims["email"] = Value::String(email);
        }
    }
    if let Some(parent) = session.parent_session_id {
        claims["psid"] = Value::String(parent.to_string());
    }
    if let Some(impersonator) = &session.impersonator_credentials_id {
        claims["impersonator_cid"] = Value::String(impersonator.clone());
    }
    if let Some(track_id) = session.track_id {
        claims["track_id"] = Value::String(track_id.to_string());
    }
    if !session.authentication.factors.is_empty() {
        claims["factors"] = serde_json::json!(session.authentication.factors);
    }
    if !session.assigned_tenants.is_empty() {
        claims["tenants"] = Value::Array(
            session
                .assigned_tenants
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        );
    }
    if !session.authz.is_empty() {
        claims["resources"] = serde_json::json!(session.authz);
    }

    Ok(Json(claims))
}

pub async fn public_keys(State(state): State<AppState>) -> impl IntoResponse {
    let jwks = state.identity_tokens.jwks();
    (StatusCode::OK, Json((*jwks).clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert!(bearer_token(&headers).is_err());
    }

    #[test]
    fn bearer_token_extracts_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer oat_abc123"),
        );
        assert_eq!(bearer_token(&headers).unwrap(), "oat_abc123");
    }
}
