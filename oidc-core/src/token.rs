//! Opaque token model: authorization codes (`oac`), access tokens (`oat`)
//! and refresh tokens (`ort`).
//!
//! Tokens are minted as random byte strings, stored hashed (SHA-256), and
//! never logged or persisted in plaintext. Lookup re-hashes the presented
//! value and compares against the stored digest.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pkce::PkceChallenge;

/// The three token kinds this store mints and redeems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    AuthorizationCode,
    AccessToken,
    RefreshToken,
}

impl TokenKind {
    /// The short prefix used in spec.md's glossary (`oac`/`oat`/`ort`).
    pub fn prefix(self) -> &'static str {
        match self {
            TokenKind::AuthorizationCode => "oac",
            TokenKind::AccessToken => "oat",
            TokenKind::RefreshToken => "ort",
        }
    }

    fn byte_len(self) -> usize {
        match self {
            TokenKind::AuthorizationCode => 16,
            TokenKind::AccessToken => 32,
            TokenKind::RefreshToken => 32,
        }
    }
}

/// A minted token's plaintext value together with the metadata recorded
/// server-side for lookup and expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plaintext: String,
    pub kind: TokenKind,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct StoredToken {
    kind: TokenKind,
    session_id: Uuid,
    expires_at: DateTime<Utc>,
    pkce: Option<PkceChallenge>,
}

fn hash_token(kind: TokenKind, plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.prefix().as_bytes());
    hasher.update(b":");
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

fn mint_plaintext(kind: TokenKind) -> String {
    let mut bytes = vec![0u8; kind.byte_len()];
    rand::thread_rng().fill_bytes(&mut bytes);
    use base64::Engine as _;
    format!(
        "{}_{}",
        kind.prefix(),
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    )
}

/// Persistence and lifecycle operations for opaque tokens.
///
/// `take` combines lookup and deletion atomically: an authorization code
/// can be redeemed by exactly one concurrent caller, closing the
/// get-then-delete race present in systems that implement single-use
/// tokens as two separate steps.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    async fn mint(
        &self,
        kind: TokenKind,
        session_id: Uuid,
        ttl: Duration,
        pkce: Option<PkceChallenge>,
    ) -> Result<IssuedToken>;

    /// Look up a token without consuming it (access/refresh tokens).
    async fn lookup(&self, plaintext: &str, kind: TokenKind) -> Result<Option<Uuid>>;

    /// Look up and delete a token atomically (authorization codes).
    async fn take(&self, plaintext: &str, kind: TokenKind) -> Result<Option<Uuid>>;

    /// Look up the PKCE challenge bound to an authorization code, if any.
    async fn pkce_challenge(&self, plaintext: &str) -> Result<Option<PkceChallenge>>;

    async fn revoke(&self, plaintext: &str, kind: TokenKind) -> Result<()>;

    /// Revoke every token bound to a session (cascades on logout/revoke).
    async fn revoke_session_tokens(&self, session_id: Uuid) -> Result<()>;

    /// Delete every token past its `expires_at`; returns the count removed.
    async fn sweep_expired(&self) -> Result<usize>;
}

/// In-memory `TokenStore`, suitable for tests and single-process
/// deployments. Index key is the SHA-256 hash of the minted value.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Arc<RwLock<HashMap<String, StoredToken>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn mint(
        &self,
        kind: TokenKind,
        session_id: Uuid,
        ttl: Duration,
        pkce: Option<PkceChallenge>,
    ) -> Result<IssuedToken> {
        let plaintext = mint_plaintext(kind);
        let key = hash_token(kind, &plaintext);
        let expires_at = Utc::now() + ttl;
        self.tokens.write().await.insert(
            key,
            StoredToken {
                kind,
                session_id,
                expires_at,
                pkce,
            },
        );
        Ok(IssuedToken {
            plaintext,
            kind,
            session_id,
            expires_at,
        })
    }

    async fn lookup(&self, plaintext: &str, kind: TokenKind) -> Result<Option<Uuid>> {
        let key = hash_token(kind, plaintext);
        let tokens = self.tokens.read().await;
        Ok(tokens.get(&key).and_then(|t| {
            if t.kind == kind && t.expires_at > Utc::now() {
                Some(t.session_id)
            } else {
                None
            }
        }))
    }

    async fn take(&self, plaintext: &str, kind: TokenKind) -> Result<Option<Uuid>> {
        let key = hash_token(kind, plaintext);
        let mut tokens = self.tokens.write().await;
        match tokens.remove(&key) {
            Some(t) if t.kind == kind && t.expires_at > Utc::now() => Ok(Some(t.session_id)),
            _ => Ok(None),
        }
    }

    async fn pkce_challenge(&self, plaintext: &str) -> Result<Option<PkceChallenge>> {
        let key = hash_token(TokenKind::AuthorizationCode, plaintext);
        let tokens = self.tokens.read().await;
        Ok(tokens.get(&key).and_then(|t| t.pkce.clone()))
    }

    async fn revoke(&self, plaintext: &str, kind: TokenKind) -> Result<()> {
        let key = hash_token(kind, plaintext);
        self.tokens.write().await.remove(&key);
        Ok(())
    }

    async fn revoke_session_tokens(&self, session_id: Uuid) -> Result<()> {
        self.tokens
            .write()
            .await
            .retain(|_, t| t.session_id != session_id);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        Ok(before - tokens.len())
    }
}

/// A minimal hex encoder, avoiding a dependency purely for this.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            write!(out, "{b:02x}").expect("writing to a String cannot fail");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mint_then_take_resolves_once() {
        let store = InMemoryTokenStore::new();
        let session_id = Uuid::new_v4();
        let issued = store
            .mint(
                TokenKind::AuthorizationCode,
                session_id,
                Duration::seconds(60),
                None,
            )
            .await
            .unwrap();

        let resolved = store
            .take(&issued.plaintext, TokenKind::AuthorizationCode)
            .await
            .unwrap();
        assert_eq!(resolved, Some(session_id));

        let second = store
            .take(&issued.plaintext, TokenKind::AuthorizationCode)
            .await
            .unwrap();
        assert_eq!(second, None, "a code must be redeemable exactly once");
    }

    #[tokio::test]
    async fn lookup_does_not_consume() {
        let store = InMemoryTokenStore::new();
        let session_id = Uuid::new_v4();
        let issued = store
            .mint(TokenKind::AccessToken, session_id, Duration::seconds(60), None)
            .await
            .unwrap();

        assert_eq!(
            store
                .lookup(&issued.plaintext, TokenKind::AccessToken)
                .await
                .unwrap(),
            Some(session_id)
        );
        assert_eq!(
            store
                .lookup(&issued.plaintext, TokenKind::AccessToken)
                .await
                .unwrap(),
            Some(session_id),
            "access tokens are not single-use"
        );
    }

    #[tokio::test]
    async fn expired_tokens_are_not_resolved() {
        let store = InMemoryTokenStore::new();
        let session_id = Uuid::new_v4();
        let issued = store
            .mint(
                TokenKind::AccessToken,
                session_id,
                Duration::seconds(-1),
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            store
                .lookup(&issued.plaintext, TokenKind::AccessToken)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn revoke_session_tokens_cascades() {
        let store = InMemoryTokenStore::new();
        let session_id = Uuid::new_v4();
        let access = store
            .mint(TokenKind::AccessToken, session_id, Duration::seconds(60), None)
            .await
            .unwrap();
        let refresh = store
            .mint(
                TokenKind::RefreshToken,
                session_id,
                Duration::seconds(60),
                None,
            )
            .await
            .unwrap();

        store.revoke_session_tokens(session_id).await.unwrap();

        assert_eq!(
            store
                .lookup(&access.plaintext, TokenKind::AccessToken)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            store
                .lookup(&refresh.plaintext, TokenKind::RefreshToken)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn sweep_expired_removes_only_expired() {
        let store = InMemoryTokenStore::new();
        let session_id = Uuid::new_v4();
        store
            .mint(
                TokenKind::AccessToken,
                session_id,
                Duration::seconds(-1),
                None,
            )
            .await
            .unwrap();
        let live = store
            .mint(TokenKind::AccessToken, session_id, Duration::seconds(60), None)
            .await
            .unwrap();

        let removed = store.sweep_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(
            store
                .lookup(&live.plaintext, TokenKind::AccessToken)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn pkce_challenge_is_retrievable_for_codes() {
        let store = InMemoryTokenStore::new();
        let session_id = Uuid::new_v4();
        let challenge = PkceChallenge {
            code_challenge: "abc".to_string(),
            method: crate::pkce::ChallengeMethod::Plain,
        };
        let issued = store
            .mint(
                TokenKind::AuthorizationCode,
                session_id,
                Duration::seconds(60),
                Some(challenge.clone()),
            )
            .await
            .unwrap();

        let fetched = store.pkce_challenge(&issued.plaintext).await.unwrap();
        assert_eq!(fetched.unwrap().code_challenge, challenge.code_challenge);
    }
}
