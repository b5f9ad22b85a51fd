//! ES256-signed identity tokens (the OIDC `id_token`) with `kid`-based key
//! rotation and a JWKS view for `/openidconnect/public_keys`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use p256::SecretKey;
use p256::pkcs8::EncodePrivateKey;
use serde_json::Value;
use std::sync::Arc;
use std::sync::RwLock;

/// One signing key in the rotation. The newest key (by `created_at`) is
/// always used for new signatures; older keys remain published in the
/// JWKS view until they age out, so tokens signed just before a rotation
/// still verify.
struct SigningKey {
    kid: String,
    secret: SecretKey,
    created_at: DateTime<Utc>,
}

/// Claim set for an id_token / userinfo response. Optional fields are
/// only emitted when present, matching the conditional claim assembly
/// described for the userinfo endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    /// The OIDC (child) session id backing this token.
    pub sid: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(flatten)]
    pub extra: std::collections::BTreeMap<String, Value>,
}

/// Signs identity tokens and serves a JWKS view of the active public keys.
pub struct IdentityTokenSigner {
    keys: RwLock<Vec<Arc<SigningKey>>>,
    jwks_cache: moka::sync::Cache<(), Arc<Value>>,
}

impl IdentityTokenSigner {
    /// Start with a freshly generated ES256 key pair.
    pub fn new() -> Self {
        let key = SigningKey {
            kid: uuid::Uuid::new_v4().to_string(),
            secret: SecretKey::random(&mut rand::rngs::OsRng),
            created_at: Utc::now(),
        };
        Self {
            keys: RwLock::new(vec![Arc::new(key)]),
            jwks_cache: moka::sync::Cache::builder()
                .time_to_live(std::time::Duration::from_secs(60))
                .max_capacity(1)
                .build(),
        }
    }

    /// Rotate in a new signing key; older keys stay published for `retain`
    /// calls so tokens signed moments ago still verify against the JWKS.
    pub fn rotate(&self) {
        let key = SigningKey {
            kid: uuid::Uuid::new_v4().to_string(),
            secret: SecretKey::random(&mut rand::rngs::OsRng),
            created_at: Utc::now(),
        };
        let mut keys = self.keys.write().expect("signing key lock poisoned");
        keys.push(Arc::new(key));
        self.jwks_cache.invalidate_all();
    }

    /// Drop signing keys older than `max_age`, provided at least one key
    /// remains.
    pub fn retire_keys_older_than(&self, max_age: chrono::Duration) {
        let cutoff = Utc::now() - max_age;
        let mut keys = self.keys.write().expect("signing key lock poisoned");
        if keys.iter().filter(|k| k.created_at >= cutoff).count() > 0 {
            keys.retain(|k| k.created_at >= cutoff);
            self.jwks_cache.invalidate_all();
        }
    }

    fn current_key(&self) -> Arc<SigningKey> {
        let keys = self.keys.read().expect("signing key lock poisoned");
        keys.iter()
            .max_by_key(|k| k.created_at)
            .cloned()
            .expect("at least one signing key is always present")
    }

    pub fn sign(&self, claims: &IdTokenClaims) -> Result<String> {
        let key = self.current_key();
        let pem = key
            .secret
            .to_pkcs8_pem(p256::pkcs8::LineEnding::LF)
            .context("encoding EC private key as PKCS8 PEM")?;
        let encoding_key =
            EncodingKey::from_ec_pem(pem.as_bytes()).context("loading EC encoding key")?;
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(key.kid.clone());
        encode(&header, claims, &encoding_key).context("signing identity token")
    }

    /// Render the JWKS document for `/openidconnect/public_keys`.
    pub fn jwks(&self) -> Arc<Value> {
        if let Some(cached) = self.jwks_cache.get(&()) {
            return cached;
        }
        let keys = self.keys.read().expect("signing key lock poisoned");
        let jwk_entries: Vec<Value> = keys
            .iter()
            .map(|k| {
                let public = k.secret.public_key();
                let mut jwk: Value =
                    serde_json::to_value(public.to_jwk()).expect("JWK serialization cannot fail");
                jwk["kid"] = Value::String(k.kid.clone());
                jwk["use"] = Value::String("sig".to_string());
                jwk["alg"] = Value::String("ES256".to_string());
                jwk
            })
            .collect();
        let doc = Arc::new(serde_json::json!({ "keys": jwk_entries }));
        self.jwks_cache.insert((), doc.clone());
        doc
    }
}

impl Default for IdentityTokenSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use uuid::Uuid;

    #[test]
    fn signed_token_verifies_against_its_own_jwks() {
        let signer = IdentityTokenSigner::new();
        let claims = IdTokenClaims {
            iss: "https://auth.example.invalid".to_string(),
            sub: "alice".to_string(),
            sid: Uuid::new_v4().to_string(),
            aud: "client-1".to_string(),
            exp: (Utc::now() + chrono::Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
            nonce: Some("nonce-1".to_string()),
            email: None,
            preferred_username: None,
            extra: Default::default(),
        };
        let token = signer.sign(&claims).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        let kid = header.kid.unwrap();
        let jwks = signer.jwks();
        let jwk = jwks["keys"]
            .as_array()
            .unwrap()
            .iter()
            .find(|k| k["kid"] == kid)
            .unwrap();
        let decoding_key = DecodingKey::from_jwk(&serde_json::from_value(jwk.clone()).unwrap())
            .unwrap();
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&["client-1"]);
        let decoded = decode::<IdTokenClaims>(&token, &decoding_key, &validation);
        assert!(decoded.is_ok());
    }

    #[test]
    fn rotation_keeps_old_key_published_until_retired() {
        let signer = IdentityTokenSigner::new();
        let old_kid = signer.current_key().kid.clone();
        signer.rotate();

        let jwks = signer.jwks();
        let kids: Vec<String> = jwks["keys"]
            .as_array()
            .unwrap()
            .iter()
            .map(|k| k["kid"].as_str().unwrap().to_string())
            .collect();
        assert!(kids.contains(&old_kid));
        assert_eq!(kids.len(), 2);

        signer.retire_keys_older_than(chrono::Duration::seconds(0));
        let jwks_after = signer.jwks();
        assert_eq!(jwks_after["keys"].as_array().unwrap().len(), 1);
    }
}
