//! Environment-driven configuration for token lifetimes, cookie domains
//! and the identity-token signing key.

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use std::collections::HashMap;

/// Token time-to-live configuration, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub authorization_code_expiration_secs: i64,
    pub access_token_expiration_secs: i64,
    pub refresh_token_expiration_secs: i64,
    pub root_session_expiration_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            authorization_code_expiration_secs: 60,
            access_token_expiration_secs: 5 * 60,
            refresh_token_expiration_secs: 7 * 24 * 3600,
            root_session_expiration_secs: 12 * 3600,
        }
    }
}

impl TokenConfig {
    pub fn from_env() -> Result<Self> {
        if let Ok(config_json) = std::env::var("OIDC_TOKEN_CONFIG") {
            serde_json::from_str(&config_json).context("failed to parse OIDC_TOKEN_CONFIG")
        } else {
            Ok(Self::default())
        }
    }
}

/// One registered application cookie domain (spec: `cookie.ApplicationCookies`).
#[derive(Debug, Clone, Deserialize)]
pub struct CookieDomain {
    pub domain_id: String,
    pub domain: String,
    pub redirect_uri: String,
}

/// Cookie Service configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CookieConfig {
    pub cookie_name: String,
    pub domains: Vec<CookieDomain>,
}

impl CookieConfig {
    pub fn from_env() -> Result<Self> {
        let cookie_name =
            std::env::var("OIDC_COOKIE_NAME").unwrap_or_else(|_| "SeaCatSCI".to_string());
        let domains = if let Ok(config_json) = std::env::var("OIDC_COOKIE_DOMAINS") {
            serde_json::from_str(&config_json).context("failed to parse OIDC_COOKIE_DOMAINS")?
        } else {
            Vec::new()
        };
        Ok(Self {
            cookie_name,
            domains,
        })
    }

    pub fn domain_by_id(&self, domain_id: &str) -> Option<&CookieDomain> {
        self.domains.iter().find(|d| d.domain_id == domain_id)
    }

    pub fn as_map(&self) -> HashMap<String, CookieDomain> {
        self.domains
            .iter()
            .map(|d| (d.domain_id.clone(), d.clone()))
            .collect()
    }
}

/// Top-level server configuration, assembled once in `main` and shared via
/// `Arc` with every handler.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tokens: TokenConfig,
    pub cookies: CookieConfig,
    /// Secret backing the HMAC-signed internal login-redirect state and the
    /// AES key used for algorithmic sessions (32 raw bytes).
    pub signing_secret: Vec<u8>,
    /// Resources granted implicitly to every authenticated session.
    pub globally_enforced_factors: Vec<String>,
    /// Base URL of the interactive login web UI (no trailing slash), used
    /// to build the `Location` header on "redirect to login" replies.
    pub auth_ui_base_url: String,
    /// Base URL at which this server's own `/openidconnect/authorize` is
    /// publicly reachable (no trailing slash), used to build the loopback
    /// `redirect_uri` the login UI returns to after interactive login.
    pub public_api_base_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let signing_secret_b64 = std::env::var("OIDC_SIGNING_SECRET")
            .context("OIDC_SIGNING_SECRET environment variable is required")?;
        let signing_secret = base64::engine::general_purpose::STANDARD
            .decode(signing_secret_b64)
            .context("OIDC_SIGNING_SECRET must be base64")?;
        anyhow::ensure!(
            signing_secret.len() >= 32,
            "OIDC_SIGNING_SECRET must decode to at least 32 bytes"
        );

        let globally_enforced_factors = std::env::var("OIDC_ENFORCED_FACTORS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        let auth_ui_base_url = std::env::var("OIDC_AUTH_UI_BASE_URL")
            .unwrap_or_else(|_| "https://auth.example.invalid".to_string())
            .trim_end_matches('/')
            .to_string();
        let public_api_base_url = std::env::var("OIDC_PUBLIC_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.example.invalid".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            tokens: TokenConfig::from_env()?,
            cookies: CookieConfig::from_env()?,
            signing_secret,
            globally_enforced_factors,
            auth_ui_base_url,
            public_api_base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_token_config_has_sane_ttls() {
        let cfg = TokenConfig::default();
        assert!(cfg.authorization_code_expiration_secs < cfg.access_token_expiration_secs);
        assert!(cfg.access_token_expiration_secs < cfg.refresh_token_expiration_secs);
    }

    #[test]
    fn cookie_config_domain_lookup() {
        let cfg = CookieConfig {
            cookie_name: "SeaCatSCI".to_string(),
            domains: vec![CookieDomain {
                domain_id: "myapp".to_string(),
                domain: "myapp.example.com".to_string(),
                redirect_uri: "https://myapp.example.com/".to_string(),
            }],
        };
        assert!(cfg.domain_by_id("myapp").is_some());
        assert!(cfg.domain_by_id("other").is_none());
    }
}
