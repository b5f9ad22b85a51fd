//! Domain logic for an OpenID Connect 1.0 Authorization Code Flow provider
//! plus a cookie-based session introspection gateway.
//!
//! This crate has no HTTP surface of its own (see `oidc-http` for that); it
//! models the long-lived state machine: sessions, opaque tokens, tenant
//! authorization, signed identity tokens, and the credentials façade that
//! fronts pluggable identity providers.
//!
//! # Example: exchanging an authorization code
//!
//! ```rust,no_run
//! use oidc_core::token::{TokenStore, TokenKind, InMemoryTokenStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = InMemoryTokenStore::new();
//! if let Some(session_id) = store.take("the-opaque-code", TokenKind::AuthorizationCode).await? {
//!     println!("resolved session {session_id}");
//! }
//! # Ok(())
//! # }
//! ```

/// Crate-wide error type and HTTP status/redirect mapping.
pub mod error;

/// Environment-driven configuration for cookies, tokens and signing keys.
pub mod config;

/// PKCE code_challenge / code_verifier verification.
pub mod pkce;

/// Opaque token model: authorization codes, access tokens, refresh tokens.
pub mod token;

/// Session model and algorithmic (stateless) session encoding.
pub mod session;

/// Ordered session-field builders.
pub mod builders;

/// ES256 identity token signing and JWKS view.
pub mod identity_token;

/// Tenant/role storage and scope-to-tenant authorization resolution.
pub mod tenant;

/// Session cookie encoding and Cookie header parsing.
pub mod cookie;

/// Credentials façade over pluggable identity providers (incl. LDAP).
pub mod credentials;

/// AEAD helpers for algorithmic sessions and encrypted storage columns.
pub mod crypto;

/// Session/token persistence traits plus in-memory and Postgres backends.
pub mod storage;

/// OIDC client registry.
pub mod client;

/// Audit sink collaborator contract.
pub mod audit;

/// OTP service collaborator contract.
pub mod otp;

/// HMAC-signed opaque state values (used for the internal login redirect).
pub mod oauth_state;

/// Open-redirect guard for return-url parameters.
pub mod url_validation;

/// Test helpers for building sessions, tokens and clients in tests.
#[cfg(test)]
pub mod test_utils;
