//! Session model.
//!
//! A session is either persisted (looked up by id through a
//! [`crate::storage::SessionStorage`]) or algorithmic: a stateless,
//! AES-256-GCM encrypted blob threaded through the authorization code and
//! never written to storage at all, used for anonymous/machine flows
//! where persisting a row per session would be pure overhead.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::crypto;

/// The kind of session, mirroring the root/openidconnect/m2m/anonymous
/// distinction: a root session represents an interactive login, an
/// openidconnect session is a child bound to one OAuth2 client
/// authorization, m2m sessions are client-credential grants with no human
/// behind them, and anonymous sessions are algorithmic by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Root,
    OpenIdConnect,
    M2M,
    Anonymous,
}

/// Authentication metadata recorded on the root session at login time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthenticationInfo {
    pub login_descriptor: Option<String>,
    /// Authentication factor types already satisfied (e.g. `"password"`, `"totp"`).
    pub factors: BTreeSet<String>,
    pub authenticated_at: Option<DateTime<Utc>>,
}

/// OAuth2/OIDC metadata recorded on an openidconnect child session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuth2Info {
    pub client_id: Option<String>,
    pub scope: BTreeSet<String>,
    pub nonce: Option<String>,
    pub access_token_plaintext: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub session_type: SessionType,
    pub parent_session_id: Option<Uuid>,
    pub credentials_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub track_id: Option<Uuid>,
    pub authentication: AuthenticationInfo,
    pub oauth2: OAuth2Info,
    pub assigned_tenants: BTreeSet<String>,
    /// Effective resource set, keyed by tenant (or `"*"` for global grants).
    pub authz: BTreeMap<String, BTreeSet<String>>,
    /// True when impersonating another credentials id; such a session must
    /// never carry `authz:superuser` or `authz:impersonate`.
    pub impersonator_credentials_id: Option<String>,
    /// True when this session exists only as an encrypted blob carried by
    /// its authorization code, never persisted through `SessionStorage`.
    pub is_algorithmic: bool,
}

impl Session {
    pub fn new_root(credentials_id: String, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            session_type: SessionType::Root,
            parent_session_id: None,
            credentials_id: Some(credentials_id),
            created_at: now,
            modified_at: now,
            expires_at,
            track_id: Some(Uuid::new_v4()),
            authentication: AuthenticationInfo::default(),
            oauth2: OAuth2Info::default(),
            assigned_tenants: BTreeSet::new(),
            authz: BTreeMap::new(),
            impersonator_credentials_id: None,
            is_algorithmic: false,
        }
    }

    pub fn new_child(parent: &Session, session_type: SessionType, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            session_type,
            parent_session_id: Some(parent.session_id),
            credentials_id: parent.credentials_id.clone(),
            created_at: now,
            modified_at: now,
            expires_at,
            track_id: parent.track_id,
            authentication: parent.authentication.clone(),
            oauth2: OAuth2Info::default(),
            assigned_tenants: parent.assigned_tenants.clone(),
            authz: parent.authz.clone(),
            impersonator_credentials_id: parent.impersonator_credentials_id.clone(),
            is_algorithmic: false,
        }
    }

    /// Apply the impersonated-session invariant: strip superuser/impersonate
    /// grants whenever a session is acting on behalf of another identity.
    pub fn strip_impersonation_resources(&mut self) {
        if self.impersonator_credentials_id.is_some() {
            for resources in self.authz.values_mut() {
                resources.remove("authz:superuser");
                resources.remove("authz:impersonate");
            }
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn touch(&mut self, new_expires_at: DateTime<Utc>) {
        self.modified_at = Utc::now();
        self.expires_at = new_expires_at;
    }

    /// Encrypt this session into an opaque blob for algorithmic (anonymous)
    /// flows, so it can travel inside an authorization code without a
    /// storage round-trip.
    pub fn encode_algorithmic(&self, key: &[u8]) -> Result<String> {
        let plaintext = serde_json::to_vec(self).context("serializing algorithmic session")?;
        crypto::encrypt_to_b64(key, &plaintext)
    }

    pub fn decode_algorithmic(key: &[u8], encoded: &str) -> Result<Self> {
        let plaintext = crypto::decrypt_from_b64(key, encoded)?;
        let mut session: Session =
            serde_json::from_slice(&plaintext).context("deserializing algorithmic session")?;
        session.is_algorithmic = true;
        Ok(session)
    }
}
