//! Shared API key handling

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use tracing::warn;

use crate::error::{Error, Result};

/// Random bytes in a generated key
const KEY_BYTES: usize = 32;

/// A freshly generated key and the hash that goes in the config file
pub struct GeneratedKey {
    pub key: String,
    pub hash: String,
}

pub fn hash_key(key: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(key.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::KeyHash(e.to_string()))
}

pub fn generate_key() -> Result<GeneratedKey> {
    let mut bytes = [0u8; KEY_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let key = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_key(&key)?;
    Ok(GeneratedKey { key, hash })
}

/// Checks presented keys against the configured hash
pub struct KeyVerifier {
    hash: Option<String>,
}

impl KeyVerifier {
    pub fn new(hash: Option<String>) -> Result<Self> {
        if let Some(hash) = &hash {
            PasswordHash::new(hash)
                .map_err(|e| Error::ConfigInvalid(format!("auth.api_key_hash: {}", e)))?;
        }
        Ok(Self { hash })
    }

    pub fn verify(&self, key: &str) -> bool {
        let Some(hash) = &self.hash else {
            warn!("No API key configured, refusing connection");
            return false;
        };
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(key.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
