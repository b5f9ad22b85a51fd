//! OIDC client registry.
//!
//! `authorize_client` resolves a `(client_id, client_secret?, redirect_uri,
//! scope)` tuple against a registered [`Client`] with exact redirect-URI
//! matching. Unlike the system this was modeled on, lookup failures here
//! are fatal: an unknown client id or a wrong client secret aborts the
//! request with an error page rather than being silently downgraded, since
//! the redirect_uri cannot be trusted until the client is verified.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Deserialize)]
pub struct Client {
    pub client_id: String,
    /// `None` for public clients (PKCE-only, e.g. native/SPA apps).
    pub client_secret: Option<String>,
    pub redirect_uris: Vec<String>,
    /// Per-client access-token TTL override; falls back to the server
    /// default when `None`.
    pub access_token_ttl_secs: Option<i64>,
    /// Whether cookie-scoped authorize responses are permitted for this
    /// client (spec §4.6.1).
    pub cookie_flow_allowed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid_client_id")]
    InvalidClientId,
    #[error("invalid_client_secret")]
    InvalidClientSecret,
    #[error("invalid_redirect_uri")]
    InvalidRedirectUri,
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bootstrap a registry from `OIDC_CLIENTS_JSON`, a JSON array of
    /// [`Client`] records. Absent the variable, returns an empty registry
    /// (useful for tests and for deployments that register clients some
    /// other way before serving traffic).
    pub fn from_env() -> Result<Self> {
        let mut registry = Self::new();
        if let Ok(config_json) = std::env::var("OIDC_CLIENTS_JSON") {
            let clients: Vec<Client> =
                serde_json::from_str(&config_json).context("failed to parse OIDC_CLIENTS_JSON")?;
            for client in clients {
                registry.register(client);
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }

    pub fn get(&self, client_id: &str) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Validate a client id, optional secret, and redirect_uri, returning
    /// the matched [`Client`] on success. `redirect_uri` must match one of
    /// the client's registered URIs exactly, not by prefix.
    pub fn authorize_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        redirect_uri: &str,
    ) -> Result<&Client, ClientError> {
        let client = self
            .clients
            .get(client_id)
            .ok_or(ClientError::InvalidClientId)?;

        if let Some(expected) = &client.client_secret {
            let provided = client_secret.ok_or(ClientError::InvalidClientSecret)?;
            let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
            if !matches {
                return Err(ClientError::InvalidClientSecret);
            }
        }

        if !client.redirect_uris.iter().any(|u| u == redirect_uri) {
            return Err(ClientError::InvalidRedirectUri);
        }

        Ok(client)
    }

    /// Validate a client id and redirect_uri at the `/openidconnect/authorize`
    /// step, where no client secret is presented (confidential clients
    /// authenticate only at the token endpoint, per RFC 6749 §4.1.1).
    pub fn validate_for_authorize(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<&Client, ClientError> {
        let client = self
            .clients
            .get(client_id)
            .ok_or(ClientError::InvalidClientId)?;
        if !client.redirect_uris.iter().any(|u| u == redirect_uri) {
            return Err(ClientError::InvalidRedirectUri);
        }
        Ok(client)
    }

    /// Validate a client id and secret with no redirect_uri check, for
    /// grants that carry no redirect_uri (refresh_token, revocation).
    pub fn authorize_client_no_redirect(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<&Client, ClientError> {
        let client = self
            .clients
            .get(client_id)
            .ok_or(ClientError::InvalidClientId)?;
        if let Some(expected) = &client.client_secret {
            let provided = client_secret.ok_or(ClientError::InvalidClientSecret)?;
            let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
            if !matches {
                return Err(ClientError::InvalidClientSecret);
            }
        }
        Ok(client)
    }

    /// Whether `uri` matches a registered redirect_uri of any client.
    /// Used to guard redirect-target parameters (e.g. logout's
    /// `post_logout_redirect_uri`) that carry no client_id of their own to
    /// validate against directly.
    pub fn is_known_redirect_uri(&self, uri: &str) -> bool {
        self.clients
            .values()
            .any(|c| c.redirect_uris.iter().any(|u| u == uri))
    }

    pub fn access_token_ttl(&self, client_id: &str, default_secs: i64) -> i64 {
        self.clients
            .get(client_id)
            .and_then(|c| c.access_token_ttl_secs)
            .unwrap_or(default_secs)
    }
}

/// Validate that every `tenant*`/non-tenant scope entry requested is one
/// the server recognizes at all (distinct from whether it is *assigned*,
/// which `tenant::resolve_tenants_for_authorize` handles).
pub fn validate_scope(requested: &BTreeSet<String>, supported: &BTreeSet<String>) -> bool {
    requested.iter().all(|s| {
        s == "tenant"
            || s.starts_with("tenant:")
            || s.starts_with("authz:")
            || supported.contains(s)
    })
}
