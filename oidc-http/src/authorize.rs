//! `GET/POST /openidconnect/authorize` — the Authorization Code Flow
//! entry point.
//!
//! Validation order: required-parameter presence (fatal only when
//! `redirect_uri` itself is missing), then client/redirect_uri (fatal, no
//! redirect — the redirect_uri is not trusted yet), then
//! response_type/scope/prompt (all redirect-bound, using the now-trusted
//! redirect_uri), then the root-session / prompt state machine, then
//! tenant/factor gating, then session construction and the success reply.

use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

use oidc_core::builders::{SessionBuilder, SessionField, apply_builders};
use oidc_core::client::ClientError;
use oidc_core::cookie::find_session_cookie_id;
use oidc_core::error::AuthorizeError;
use oidc_core::oauth_state::{OAuthState, sign_state};
use oidc_core::otp::factors_to_setup;
use oidc_core::pkce::{ChallengeMethod, PkceChallenge};
use oidc_core::session::{Session, SessionType};
use oidc_core::audit::AuditEvent;
use oidc_core::tenant::{resolve_bare_tenant, resolve_tenants_for_authorize};
use oidc_core::token::TokenKind;

use crate::error::authorize_error_redirect;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// `none`, `login`, `select_account`, or absent.
    pub prompt: Option<String>,
    /// Non-standard login-control parameter: pin a specific login descriptor.
    pub ldid: Option<String>,
    /// Non-standard login-control parameter: override child session TTL, seconds.
    pub expiration: Option<i64>,
}

const ROOT_COOKIE_DOMAIN: &str = "root";
const ALLOWED_PROMPTS: &[&str] = &["none", "login", "select_account"];

/// `GET /openidconnect/authorize` — parameters arrive in the query string.
pub async fn authorize_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    authorize(state, headers, params).await
}

/// `POST /openidconnect/authorize` — parameters arrive as a form body, the
/// shape the login UI's post-authentication loopback submits (spec.md
/// §4.6: "query for GET, form for POST").
pub async fn authorize_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<AuthorizeParams>,
) -> Response {
    authorize(state, headers, params).await
}

async fn authorize(state: AppState, headers: HeaderMap, params: AuthorizeParams) -> Response {
    // Step 1: presence of scope, client_id, response_type, redirect_uri.
    // A missing/empty redirect_uri can't be redirected to; everything
    // else missing is still redirect-bound once redirect_uri is present.
    for (name, value) in [
        ("scope", params.scope.as_deref()),
        ("client_id", params.client_id.as_deref()),
        ("response_type", params.response_type.as_deref()),
        ("redirect_uri", params.redirect_uri.as_deref()),
    ] {
        if value.is_none_or(str::is_empty) {
            return match params.redirect_uri.as_deref() {
                Some(redirect_uri) if !redirect_uri.is_empty() => authorize_error_redirect(
                    redirect_uri,
                    params.state.as_deref(),
                    &AuthorizeError::InvalidRequest(format!("missing required parameter: {name}")),
                ),
                _ => (
                    StatusCode::BAD_REQUEST,
                    format!("missing required parameter: {name}"),
                )
                    .into_response(),
            };
        }
    }
    let client_id = params.client_id.as_deref().unwrap();
    let redirect_uri = params.redirect_uri.as_deref().unwrap();
    let response_type = params.response_type.as_deref().unwrap();

    // Step 2: client + redirect_uri. Failures here are fatal, not redirects.
    // No client secret is checked here: confidential clients authenticate
    // only at the token endpoint once the redirect_uri is trusted.
    let client = match state.clients.validate_for_authorize(client_id, redirect_uri) {
        Ok(client) => client,
        Err(ClientError::InvalidClientId) => {
            return (StatusCode::BAD_REQUEST, "unknown client_id").into_response();
        }
        Err(ClientError::InvalidClientSecret) => {
            return (StatusCode::UNAUTHORIZED, "invalid client credentials").into_response();
        }
        Err(ClientError::InvalidRedirectUri) => {
            return (StatusCode::BAD_REQUEST, "invalid redirect_uri").into_response();
        }
    };

    // Step 3: response_type, now redirect-bound.
    if response_type != "code" {
        return authorize_error_redirect(
            redirect_uri,
            params.state.as_deref(),
            &AuthorizeError::InvalidRequest("unsupported response_type".to_string()),
        );
    }

    // Step 4: the openid scope is mandatory for this flow.
    let scope: BTreeSet<String> = params
        .scope
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if !scope.contains("openid") {
        return authorize_error_redirect(
            redirect_uri,
            params.state.as_deref(),
            &AuthorizeError::InvalidScope("scope must contain 'openid'".to_string()),
        );
    }
    if scope.contains("cookie") && !client.cookie_flow_allowed {
        return authorize_error_redirect(
            redirect_uri,
            params.state.as_deref(),
            &AuthorizeError::InvalidScope("cookie scope is not permitted for this client".to_string()),
        );
    }

    // Step 5: prompt must be one of the recognized values.
    if let Some(prompt) = params.prompt.as_deref() {
        if !ALLOWED_PROMPTS.contains(&prompt) {
            return authorize_error_redirect(
                redirect_uri,
                params.state.as_deref(),
                &AuthorizeError::InvalidRequest(format!("invalid prompt value: {prompt}")),
            );
        }
    }

    // Step 6: resolve (or redirect to establish) a root session.
    let cookie_header = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let root_session_id =
        find_session_cookie_id(cookie_header, &state.config.cookies.cookie_name, ROOT_COOKIE_DOMAIN);

    let prompt_login = params.prompt.as_deref() == Some("login");
    let prompt_none = params.prompt.as_deref() == Some("none");
    let prompt_select_account = params.prompt.as_deref() == Some("select_account");

    let mut root_session = match root_session_id {
        Some(id) => match state.sessions.get(id).await {
            Ok(Some(session)) if !session.is_expired() => Some(session),
            _ => None,
        },
        None => None,
    };

    // `prompt=login` forces re-authentication: drop the active session
    // entirely rather than merely ignoring it, so a stale cookie can't
    // resurrect it on a later request.
    if prompt_login {
        if let Some(session) = root_session.take() {
            if let Err(err) = state.tokens.revoke_session_tokens(session.session_id).await {
                tracing::warn!(error = ?err, "failed to revoke tokens for prompt=login");
            }
            if let Err(err) = state.sessions.delete_family(session.session_id).await {
                tracing::warn!(error = ?err, "failed to delete session family for prompt=login");
            }
        }
    }

    if root_session.is_none() && prompt_none {
        return authorize_error_redirect(
            redirect_uri,
            params.state.as_deref(),
            &AuthorizeError::LoginRequired,
        );
    }

    // `select_account` always bounces through the login UI, even with an
    // active session, so the user can switch identities.
    if root_session.is_none() || prompt_select_account {
        return redirect_to_login(&state, &params);
    }
    let root_session = root_session.unwrap();

    // Step 7: factor-setup gate.
    let credential = match state.credentials.get(root_session.credentials_id.as_deref().unwrap_or_default()).await {
        Ok(detail) => detail,
        Err(_) => None,
    };
    let credential_factors = credential
        .as_ref()
        .map(|c| c.enforce_factors.clone())
        .unwrap_or_default();
    let missing_factors = factors_to_setup(
        &state.config.globally_enforced_factors,
        &credential_factors,
        &root_session.authentication.factors,
    );
    if !missing_factors.is_empty() {
        return authorize_error_redirect(
            redirect_uri,
            params.state.as_deref(),
            &AuthorizeError::AccessDenied(format!(
                "factor setup required: {}",
                missing_factors.join(",")
            )),
        );
    }

    // Step 8: tenant resolution.
    let is_superuser = root_session
        .authz
        .get("*")
        .is_some_and(|r| r.contains(oidc_core::tenant::SUPERUSER_RESOURCE));
    let mut resolved_tenants = match resolve_tenants_for_authorize(
        &scope,
        &root_session.assigned_tenants,
        is_superuser,
    ) {
        Ok(tenants) => tenants,
        Err(_) => {
            return authorize_error_redirect(
                redirect_uri,
                params.state.as_deref(),
                &AuthorizeError::UnauthorizedTenant,
            );
        }
    };
    if scope.contains("tenant") && resolved_tenants.is_empty() {
        let credentials_id = root_session.credentials_id.as_deref().unwrap_or_default();
        match resolve_bare_tenant(state.audit.as_ref(), credentials_id, &root_session.assigned_tenants).await {
            Some(tenant) => {
                resolved_tenants.insert(tenant);
            }
            None => {
                return authorize_error_redirect(
                    redirect_uri,
                    params.state.as_deref(),
                    &AuthorizeError::UserHasNoTenant,
                );
            }
        }
    }
    for tenant in &resolved_tenants {
        let _ = state
            .audit
            .append(AuditEvent {
                at: Utc::now(),
                credentials_id: root_session.credentials_id.clone(),
                session_id: Some(root_session.session_id),
                event_type: "tenant_authorized".to_string(),
                detail: serde_json::json!({ "tenant_id": tenant }),
            })
            .await;
    }

    // Step 9: build the child session.
    let ttl = params
        .expiration
        .map(Duration::seconds)
        .unwrap_or_else(|| Duration::seconds(state.config.tokens.access_token_expiration_secs));
    let mut child = Session::new_child(&root_session, SessionType::OpenIdConnect, Utc::now() + ttl);
    apply_builders(
        &mut child,
        vec![
            SessionBuilder::new("oauth2").with(SessionField::ClientId(client.client_id.clone())),
            SessionBuilder::new("scope").with(SessionField::Scope(scope.clone())),
            SessionBuilder::new("tenants").with(SessionField::AssignedTenants(resolved_tenants)),
        ],
    );
    if let Some(nonce) = &params.nonce {
        apply_builders(
            &mut child,
            vec![SessionBuilder::new("nonce").with(SessionField::Nonce(nonce.clone()))],
        );
    }
    child.strip_impersonation_resources();

    if let Err(err) = state.sessions.insert(child.clone()).await {
        tracing::error!(error = ?err, "failed to persist authorize session");
        return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
    }

    // Step 10: mint the authorization code and reply.
    let pkce = match (&params.code_challenge, &params.code_challenge_method) {
        (Some(challenge), method) => {
            let method = method
                .as_deref()
                .and_then(ChallengeMethod::parse)
                .unwrap_or(ChallengeMethod::Plain);
            Some(PkceChallenge {
                code_challenge: challenge.clone(),
                method,
            })
        }
        (None, _) => None,
    };

    let issued = match state
        .tokens
        .mint(
            TokenKind::AuthorizationCode,
            child.session_id,
            Duration::seconds(state.config.tokens.authorization_code_expiration_secs),
            pkce,
        )
        .await
    {
        Ok(issued) => issued,
        Err(err) => {
            tracing::error!(error = ?err, "failed to mint authorization code");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
        }
    };

    reply_success(
        &state,
        redirect_uri,
        params.state.as_deref(),
        &root_session,
        scope.contains("cookie"),
        &issued.plaintext,
    )
}

/// Build the success redirect: always `redirect_uri?code=...&state=...`.
/// When `cookie` is in the granted scope, also attach a `Set-Cookie` for
/// whichever configured application domain matches `redirect_uri`, so the
/// client is authenticated against that domain without a second round
/// trip through `GET /cookie/entry/{domain_id}`.
fn reply_success(
    state: &AppState,
    redirect_uri: &str,
    oauth_state_param: Option<&str>,
    root_session: &Session,
    cookie_scope: bool,
    code: &str,
) -> Response {
    let mut url = match url::Url::parse(redirect_uri) {
        Ok(url) => url,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid redirect_uri").into_response(),
    };
    {
        let mut qs = url.query_pairs_mut();
        qs.append_pair("code", code);
        if let Some(state_param) = oauth_state_param {
            qs.append_pair("state", state_param);
        }
    }

    let mut response = Redirect::to(url.as_str()).into_response();
    if cookie_scope {
        if let Some(domain) = state
            .config
            .cookies
            .domains
            .iter()
            .find(|d| d.redirect_uri == redirect_uri)
        {
            let cookie_value = oidc_core::cookie::encode_cookie_value(
                &domain.domain_id,
                root_session.session_id,
            );
            let set_cookie = format!(
                "{}={}; Domain={}; Path=/; HttpOnly; Secure; SameSite=Lax",
                state.config.cookies.cookie_name, cookie_value, domain.domain
            );
            if let Ok(value) = set_cookie.parse() {
                response.headers_mut().insert(axum::http::header::SET_COOKIE, value);
            }
        }
    }
    response
}

/// Reply 404 with `Location` pointing at the interactive login UI,
/// passing the original authorize request back as a plain `redirect_uri`
/// loopback query parameter so the login page can re-enter this endpoint
/// with `prompt=login` once the user has authenticated. Also clears the
/// session cookie, since any cookie that led here didn't resolve to a
/// usable root session.
fn redirect_to_login(state: &AppState, params: &AuthorizeParams) -> Response {
    let mut authorize_qs = url::form_urlencoded::Serializer::new(String::new());
    authorize_qs.append_pair("response_type", params.response_type.as_deref().unwrap_or_default());
    authorize_qs.append_pair("scope", params.scope.as_deref().unwrap_or_default());
    authorize_qs.append_pair("client_id", params.client_id.as_deref().unwrap_or_default());
    authorize_qs.append_pair("redirect_uri", params.redirect_uri.as_deref().unwrap_or_default());
    if let Some(v) = &params.state {
        authorize_qs.append_pair("state", v);
    }
    if let Some(v) = &params.nonce {
        authorize_qs.append_pair("nonce", v);
    }
    if let Some(v) = &params.code_challenge {
        authorize_qs.append_pair("code_challenge", v);
    }
    if let Some(v) = &params.code_challenge_method {
        authorize_qs.append_pair("code_challenge_method", v);
    }
    let authorize_redirect_uri = format!(
        "{}/openidconnect/authorize?{}",
        state.config.public_api_base_url,
        authorize_qs.finish()
    );

    // Sign the loopback so a login page that merely echoes query
    // parameters back can't be tricked into completing a different
    // authorize request than the one the user actually started.
    let oauth_state = OAuthState {
        nonce: uuid::Uuid::new_v4().to_string(),
        return_url: authorize_redirect_uri.clone(),
        pkce_verifier: String::new(),
    };
    let signed_state = sign_state(&oauth_state, &state.config.signing_secret).ok();

    let mut login_qs = url::form_urlencoded::Serializer::new(String::new());
    if let Some(ldid) = &params.ldid {
        login_qs.append_pair("ldid", ldid);
    }
    if let Some(signed) = &signed_state {
        login_qs.append_pair("login_state", signed);
    }
    login_qs.append_pair("redirect_uri", &authorize_redirect_uri);
    let login_url = format!(
        "{}/#/login?{}",
        state.config.auth_ui_base_url,
        login_qs.finish()
    );

    let clear_cookie = format!(
        "{}=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Lax",
        state.config.cookies.cookie_name
    );

    let mut response = (StatusCode::NOT_FOUND, ()).into_response();
    if let Ok(value) = login_url.parse() {
        response.headers_mut().insert(axum::http::header::LOCATION, value);
    }
    if let Ok(value) = clear_cookie.parse() {
        response.headers_mut().insert(axum::http::header::SET_COOKIE, value);
    }
    response
}
