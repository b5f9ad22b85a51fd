//! Shared fixtures for the HTTP-level end-to-end tests: an in-memory
//! [`AppState`] wired the way `main` wires one, plus a couple of seeding
//! helpers so each test doesn't repeat the login/assignment plumbing.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use oidc_core::audit::InMemoryAuditSink;
use oidc_core::client::{Client, ClientRegistry};
use oidc_core::config::{CookieConfig, CookieDomain, ServerConfig, TokenConfig};
use oidc_core::credentials::CredentialsFacade;
use oidc_core::identity_token::IdentityTokenSigner;
use oidc_core::otp::NoOtpService;
use oidc_core::session::{AuthenticationInfo, Session};
use oidc_core::storage::{InMemorySessionStorage, SessionStorage};
use oidc_core::tenant::{InMemoryTenantStorage, Role, TenantStorage};
use oidc_core::token::InMemoryTokenStore;

use oidc_http::AppState;

pub const COOKIE_NAME: &str = "SeaCatSCI";
pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const REDIRECT_URI: &str = "https://app.example.invalid/callback";
pub const DOMAIN_ID: &str = "myapp";
pub const DOMAIN: &str = "myapp.example.invalid";
pub const CREDENTIALS_ID: &str = "alice";

/// An `AppState` built entirely from in-memory collaborators, mirroring
/// what `main` assembles when no `--database-url` is given. The
/// `InMemoryTenantStorage` is also returned directly (not just as the
/// trait object inside `AppState`) so tests can seed roles/assignments
/// through its inherent methods.
pub fn build_state() -> (AppState, Arc<InMemoryTenantStorage>) {
    let cookies = CookieConfig {
        cookie_name: COOKIE_NAME.to_string(),
        domains: vec![CookieDomain {
            domain_id: DOMAIN_ID.to_string(),
            domain: DOMAIN.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
        }],
    };
    let config = Arc::new(ServerConfig {
        tokens: TokenConfig::default(),
        cookies,
        signing_secret: vec![7u8; 32],
        globally_enforced_factors: Vec::new(),
        auth_ui_base_url: "https://auth-ui.example.invalid".to_string(),
        public_api_base_url: "https://api.example.invalid".to_string(),
    });

    let mut registry = ClientRegistry::new();
    registry.register(Client {
        client_id: CLIENT_ID.to_string(),
        client_secret: Some(CLIENT_SECRET.to_string()),
        redirect_uris: vec![REDIRECT_URI.to_string()],
        access_token_ttl_secs: None,
        cookie_flow_allowed: true,
    });

    let tenants = Arc::new(InMemoryTenantStorage::new());

    let state = AppState {
        config,
        sessions: Arc::new(InMemorySessionStorage::new()),
        tokens: Arc::new(InMemoryTokenStore::new()),
        clients: Arc::new(registry),
        credentials: Arc::new(CredentialsFacade::new()),
        identity_tokens: Arc::new(IdentityTokenSigner::new()),
        audit: Arc::new(InMemoryAuditSink::new(100)),
        otp: Arc::new(NoOtpService),
        tenants: tenants.clone(),
        issuer: "https://auth.example.invalid".to_string(),
    };
    (state, tenants)
}

/// Insert an already-authenticated root session for [`CREDENTIALS_ID`] and
/// return its id together with the `Cookie` header value that resolves it
/// against the `root` cookie domain.
pub async fn seed_root_session(state: &AppState) -> (Uuid, String) {
    let mut session = Session::new_root(CREDENTIALS_ID.to_string(), Utc::now() + Duration::hours(1));
    session.authentication = AuthenticationInfo {
        login_descriptor: Some(format!("{CREDENTIALS_ID}:password")),
        factors: Default::default(),
        authenticated_at: Some(Utc::now()),
    };
    let session_id = session.session_id;
    state.sessions.insert(session).await.expect("seed root session");
    let cookie_value = oidc_core::cookie::encode_cookie_value("root", session_id);
    (session_id, format!("{COOKIE_NAME}={cookie_value}"))
}

/// Assign `tenant_id` to [`CREDENTIALS_ID`] and grant a role scoped to
/// that tenant carrying `resources`.
pub async fn grant_tenant(tenants: &InMemoryTenantStorage, tenant_id: &str, resources: &[&str]) {
    tenants
        .assign_tenant(CREDENTIALS_ID, tenant_id)
        .await
        .expect("assign tenant");
    let role_id = format!("{tenant_id}-role");
    tenants
        .add_role(Role {
            id: role_id.clone(),
            tenant_id: Some(tenant_id.to_string()),
            resources: resources.iter().map(|r| r.to_string()).collect(),
        })
        .await;
    tenants.grant_role(CREDENTIALS_ID, &role_id).await;
}
