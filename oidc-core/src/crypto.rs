//! AES-256-GCM helpers backing algorithmic sessions and encrypted storage
//! columns.
//!
//! Ciphertext layout: `nonce (12 bytes) || ciphertext+tag`, base64url
//! (no padding) encoded as a whole so it can be embedded in an
//! authorization code or a cookie value.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use anyhow::{Context, Result, anyhow};
use base64::Engine as _;

const NONCE_LEN: usize = 12;

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    anyhow::ensure!(key.len() == 32, "AES-256-GCM key must be exactly 32 bytes");
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
}

pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| anyhow!("AES-GCM encryption failed: {e}"))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn decrypt(key: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
    anyhow::ensure!(blob.len() > NONCE_LEN, "ciphertext too short");
    let cipher = cipher(key)?;
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow!("AES-GCM decryption failed (tampered or wrong key)"))
}

pub fn encrypt_to_b64(key: &[u8], plaintext: &[u8]) -> Result<String> {
    let blob = encrypt(key, plaintext)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(blob))
}

pub fn decrypt_from_b64(key: &[u8], encoded: &str) -> Result<Vec<u8>> {
    let blob = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .context("invalid base64 ciphertext")?;
    decrypt(key, &blob)
}

/// A value transparently AES-GCM-encrypted at rest. `T` must round-trip
/// through JSON; used for storage columns spec.md marks `encrypt=True`
/// (e.g. refresh-token metadata, LDAP bind credentials cached server-side).
pub struct EncryptedColumn<T> {
    pub value: T,
}

impl<T: serde::Serialize + serde::de::DeserializeOwned> EncryptedColumn<T> {
    pub fn seal(key: &[u8], value: &T) -> Result<String> {
        let json = serde_json::to_vec(value)?;
        encrypt_to_b64(key, &json)
    }

    pub fn open(key: &[u8], encoded: &str) -> Result<T> {
        let json = decrypt_from_b64(key, encoded)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = [1u8; 32];
        let ciphertext = encrypt(&key, b"hello world").unwrap();
        let plaintext = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let ciphertext = encrypt(&[1u8; 32], b"secret").unwrap();
        assert!(decrypt(&[2u8; 32], &ciphertext).is_err());
    }

    #[test]
    fn encrypted_column_round_trips_typed_value() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Payload {
            n: u32,
        }
        let key = [9u8; 32];
        let sealed = EncryptedColumn::seal(&key, &Payload { n: 42 }).unwrap();
        let opened: Payload = EncryptedColumn::open(&key, &sealed).unwrap();
        assert_eq!(opened, Payload { n: 42 });
    }
}
