//! Test helpers for building sessions, tokens and clients without
//! repeating the same boilerplate in every module's test suite.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::client::Client;
use crate::session::Session;
use crate::token::{InMemoryTokenStore, IssuedToken, TokenKind, TokenStore};

/// A root session with a fixed one-hour expiry, for tests that don't care
/// about TTL edge cases.
pub fn test_root_session(credentials_id: &str) -> Session {
    Session::new_root(credentials_id.to_string(), Utc::now() + Duration::hours(1))
}

/// A confidential client registered under a fixed redirect_uri, useful as
/// a drop-in for authorize/token endpoint tests.
pub fn test_client(client_id: &str, redirect_uri: &str) -> Client {
    Client {
        client_id: client_id.to_string(),
        client_secret: Some("test-secret".to_string()),
        redirect_uris: vec![redirect_uri.to_string()],
        access_token_ttl_secs: None,
        cookie_flow_allowed: false,
    }
}

/// Mint an authorization code bound to `session_id` in a fresh in-memory
/// token store, returning both the store and the issued code.
pub async fn mint_test_authorization_code(
    session_id: Uuid,
) -> (InMemoryTokenStore, IssuedToken) {
    let store = InMemoryTokenStore::new();
    let issued = store
        .mint(
            TokenKind::AuthorizationCode,
            session_id,
            Duration::seconds(60),
            None,
        )
        .await
        .expect("minting a test authorization code cannot fail");
    (store, issued)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn minted_authorization_code_resolves_to_its_session() {
        let session = test_root_session("alice");
        let (store, issued) = mint_test_authorization_code(session.session_id).await;
        let resolved = store
            .take(&issued.plaintext, TokenKind::AuthorizationCode)
            .await
            .unwrap();
        assert_eq!(resolved, Some(session.session_id));
    }
}
