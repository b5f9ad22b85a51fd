//! PKCE (RFC 7636) code_challenge / code_verifier verification.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The `code_challenge_method` bound to an authorization code at the
/// `/openidconnect/authorize` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeMethod {
    #[serde(rename = "S256")]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl ChallengeMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "S256" => Some(Self::S256),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }
}

/// The PKCE binding stored alongside an authorization code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceChallenge {
    pub code_challenge: String,
    pub method: ChallengeMethod,
}

/// Verify a `code_verifier` presented at the token endpoint against the
/// `code_challenge` recorded when the authorization code was issued.
///
/// Returns `false` on any mismatch, including a missing verifier when a
/// challenge was recorded (PKCE is mandatory once requested; there is no
/// silent downgrade).
pub fn verify(challenge: &PkceChallenge, verifier: &str) -> bool {
    match challenge.method {
        ChallengeMethod::Plain => {
            constant_time_eq(challenge.code_challenge.as_bytes(), verifier.as_bytes())
        }
        ChallengeMethod::S256 => {
            let digest = Sha256::digest(verifier.as_bytes());
            let computed = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
            constant_time_eq(challenge.code_challenge.as_bytes(), computed.as_bytes())
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s256_round_trip() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = PkceChallenge {
            code_challenge: base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest),
            method: ChallengeMethod::S256,
        };
        assert!(verify(&challenge, verifier));
        assert!(!verify(&challenge, "wrong-verifier"));
    }

    #[test]
    fn plain_round_trip() {
        let challenge = PkceChallenge {
            code_challenge: "plain-value".to_string(),
            method: ChallengeMethod::Plain,
        };
        assert!(verify(&challenge, "plain-value"));
        assert!(!verify(&challenge, "other-value"));
    }

    #[test]
    fn parse_rejects_unknown_method() {
        assert!(ChallengeMethod::parse("md5").is_none());
    }
}
