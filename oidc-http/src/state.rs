//! Shared application state, built once in `main` and cloned (cheaply,
//! via `Arc`) into every handler.

use std::sync::Arc;

use oidc_core::audit::AuditSink;
use oidc_core::client::ClientRegistry;
use oidc_core::config::ServerConfig;
use oidc_core::credentials::CredentialsFacade;
use oidc_core::identity_token::IdentityTokenSigner;
use oidc_core::otp::OtpService;
use oidc_core::storage::SessionStorage;
use oidc_core::tenant::TenantStorage;
use oidc_core::token::TokenStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<dyn SessionStorage>,
    pub tokens: Arc<dyn TokenStore>,
    pub clients: Arc<ClientRegistry>,
    pub credentials: Arc<CredentialsFacade>,
    pub identity_tokens: Arc<IdentityTokenSigner>,
    pub audit: Arc<dyn AuditSink>,
    pub otp: Arc<dyn OtpService>,
    pub tenants: Arc<dyn TenantStorage>,
    pub issuer: String,
}
