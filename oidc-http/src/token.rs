//! `POST /openidconnect/token` (authorization_code and refresh_token
//! grants) and `POST /openidconnect/token/revoke`.

use axum::{Form, Json, extract::State, response::IntoResponse};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use oidc_core::client::ClientError;
use oidc_core::error::AuthError;
use oidc_core::identity_token::IdTokenClaims;
use oidc_core::pkce;
use oidc_core::token::TokenKind;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

pub async fn token(
    State(state): State<AppState>,
    Form(req): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    match req.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(&state, req).await,
        "refresh_token" => refresh_token_grant(&state, req).await,
        other => Err(AuthError::InvalidGrant(format!(
            "unsupported grant_type: {other}"
        ))),
    }
}

async fn authorization_code_grant(
    state: &AppState,
    req: TokenRequest,
) -> Result<Json<TokenResponse>, AuthError> {
    let code = req
        .code
        .ok_or_else(|| AuthError::InvalidRequest("code is required".to_string()))?;
    let redirect_uri = req
        .redirect_uri
        .ok_or_else(|| AuthError::InvalidRequest("redirect_uri is required".to_string()))?;

    let client = state
        .clients
        .authorize_client(&req.client_id, req.client_secret.as_deref(), &redirect_uri)
        .map_err(client_error_to_auth_error)?;

    let challenge = state
        .tokens
        .pkce_challenge(&code)
        .await
        .map_err(AuthError::Internal)?;
    if let Some(challenge) = &challenge {
        let verifier = req
            .code_verifier
            .ok_or_else(|| AuthError::InvalidGrant("code_verifier is required".to_string()))?;
        if !pkce::verify(challenge, &verifier) {
            return Err(AuthError::InvalidGrant("PKCE verification failed".to_string()));
        }
    }

    let session_id = state
        .tokens
        .take(&code, TokenKind::AuthorizationCode)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::InvalidGrant("authorization code is unknown or expired".to_string()))?;

    let session = state
        .sessions
        .get(session_id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::InvalidGrant("session no longer exists".to_string()))?;

    issue_tokens(state, client, session, req.scope).await
}

async fn refresh_token_grant(
    state: &AppState,
    req: TokenRequest,
) -> Result<Json<TokenResponse>, AuthError> {
    let refresh_token = req
        .refresh_token
        .ok_or_else(|| AuthError::InvalidRequest("refresh_token is required".to_string()))?;

    let client = state
        .clients
        .authorize_client_no_redirect(&req.client_id, req.client_secret.as_deref())
        .map_err(client_error_to_auth_error)?;

    let session_id = state
        .tokens
        .take(&refresh_token, TokenKind::RefreshToken)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::InvalidGrant("refresh token is unknown or expired".to_string()))?;

    let mut session = state
        .sessions
        .get(session_id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::InvalidGrant("session no longer exists".to_string()))?;

    if let Some(requested) = &req.scope {
        let requested: std::collections::BTreeSet<&str> = requested.split_whitespace().collect();
        let granted: std::collections::BTreeSet<&str> =
            session.oauth2.scope.iter().map(String::as_str).collect();
        if !requested.is_subset(&granted) {
            return Err(AuthError::InvalidScope(
                "requested scope exceeds the originally granted scope".to_string(),
            ));
        }
    }

    // Rebuild tenant binding and authz from current role assignments
    // (§4.8): a tenant unassigned since the original authorize drops out,
    // and resource grants reflect whatever roles now apply, not whatever
    // was true when this session was first built.
    let credentials_id = session.credentials_id.clone().unwrap_or_default();
    let currently_assigned = state
        .tenants
        .assigned_tenants(&credentials_id)
        .await
        .map_err(AuthError::Internal)?;
    let is_superuser = state
        .tenants
        .is_superuser(&credentials_id)
        .await
        .map_err(AuthError::Internal)?;
    session.assigned_tenants = session
        .assigned_tenants
        .iter()
        .filter(|t| is_superuser || currently_assigned.contains(*t))
        .cloned()
        .collect();
    session.authz = oidc_core::tenant::rebuild_authz(state.tenants.as_ref(), &credentials_id, &session.assigned_tenants)
        .await
        .map_err(AuthError::Internal)?;
    session.strip_impersonation_resources();

    issue_tokens(state, client, session, req.scope).await
}

async fn issue_tokens(
    state: &AppState,
    client: &oidc_core::client::Client,
    session: oidc_core::session::Session,
    requested_scope: Option<String>,
) -> Result<Json<TokenResponse>, AuthError> {
    let scope = requested_scope.unwrap_or_else(|| {
        session
            .oauth2
            .scope
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    });

    let access_ttl = Duration::seconds(
        state
            .clients
            .access_token_ttl(&client.client_id, state.config.tokens.access_token_expiration_secs),
    );
    let access = state
        .tokens
        .mint(TokenKind::AccessToken, session.session_id, access_ttl, None)
        .await
        .map_err(AuthError::Internal)?;

    // Algorithmic sessions carry their own encrypted state inside the
    // authorization code and are never persisted, so there is nothing a
    // refresh token could look up later: only mint one for a stored session.
    let refresh = if session.is_algorithmic {
        None
    } else {
        Some(
            state
                .tokens
                .mint(
                    TokenKind::RefreshToken,
                    session.session_id,
                    Duration::seconds(state.config.tokens.refresh_token_expiration_secs),
                    None,
                )
                .await
                .map_err(AuthError::Internal)?,
        )
    };

    let id_token = if session.oauth2.scope.contains("openid") {
        let now = Utc::now();
        let mut extra = std::collections::BTreeMap::new();
        if let Some(parent) = session.parent_session_id {
            extra.insert("psid".to_string(), serde_json::json!(parent.to_string()));
        }
        if let Some(impersonator) = &session.impersonator_credentials_id {
            extra.insert(
                "impersonator_cid".to_string(),
                serde_json::json!(impersonator),
            );
        }
        if let Some(track_id) = session.track_id {
            extra.insert("track_id".to_string(), serde_json::json!(track_id.to_string()));
        }
        if !session.assigned_tenants.is_empty() {
            extra.insert(
                "tenants".to_string(),
                serde_json::json!(session.assigned_tenants),
            );
        }
        if !session.authz.is_empty() {
            extra.insert("resources".to_string(), serde_json::json!(session.authz));
        }
        if !session.authentication.factors.is_empty() {
            extra.insert(
                "factors".to_string(),
                serde_json::json!(session.authentication.factors),
            );
        }
        let claims = IdTokenClaims {
            iss: state.issuer.clone(),
            sub: session.credentials_id.clone().unwrap_or_default(),
            sid: session.session_id.to_string(),
            aud: client.client_id.clone(),
            exp: (now + access_ttl).timestamp(),
            iat: now.timestamp(),
            nonce: session.oauth2.nonce.clone(),
            email: None,
            preferred_username: None,
            extra,
        };
        Some(
            state
                .identity_tokens
                .sign(&claims)
                .map_err(AuthError::Internal)?,
        )
    } else {
        None
    };

    Ok(Json(TokenResponse {
        access_token: access.plaintext,
        token_type: "Bearer",
        expires_in: access_ttl.num_seconds(),
        refresh_token: refresh.map(|issued| issued.plaintext),
        id_token,
        scope,
    }))
}

fn client_error_to_auth_error(err: ClientError) -> AuthError {
    match err {
        ClientError::InvalidClientId | ClientError::InvalidClientSecret => AuthError::InvalidClient,
        ClientError::InvalidRedirectUri => AuthError::InvalidRedirectUri,
    }
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// `POST /openidconnect/token/revoke` (RFC 7009). Revocation cascades: the
/// whole session's token family is revoked, not just the presented token,
/// since a single session backs at most one active access/refresh pair.
/// Per RFC 7009 §2.2, an unknown token is not an error; this always
/// returns 200.
pub async fn revoke(
    State(state): State<AppState>,
    Form(req): Form<RevokeRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .clients
        .authorize_client_no_redirect(&req.client_id, req.client_secret.as_deref())
        .map_err(client_error_to_auth_error)?;

    let hinted_first = matches!(req.token_type_hint.as_deref(), Some("refresh_token"));
    let kinds = if hinted_first {
        [TokenKind::RefreshToken, TokenKind::AccessToken]
    } else {
        [TokenKind::AccessToken, TokenKind::RefreshToken]
    };

    for kind in kinds {
        if let Some(session_id) = state
            .tokens
            .lookup(&req.token, kind)
            .await
            .map_err(AuthError::Internal)?
        {
            state
                .tokens
                .revoke_session_tokens(session_id)
                .await
                .map_err(AuthError::Internal)?;
            break;
        }
    }

    Ok(axum::http::StatusCode::OK)
}
