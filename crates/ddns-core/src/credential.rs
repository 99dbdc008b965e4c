//! Credential hashing
//!
//! Per-hostname update tokens and the operator password are stored only as
//! Argon2id PHC strings. Hashing and verification are CPU-bound and
//! deliberately slow, so both run on the blocking thread pool.
//!
//! Verification reads the cost parameters from the stored PHC string, which
//! means raising the cost for new hashes never invalidates existing ones.

use crate::error::{Error, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{error, warn};

/// Number of random bytes in a generated token
pub const TOKEN_BYTES: usize = 32;

/// Argon2id hasher with configurable cost
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// Hasher using the Argon2 default cost
    pub fn new() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Hasher with explicit cost parameters
    ///
    /// `memory_kib` is the memory cost in KiB, `iterations` the time cost and
    /// `parallelism` the lane count.
    pub fn with_cost(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| Error::hashing(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Self { params })
    }

    /// Mint a fresh random token (32 bytes, URL-safe base64, no padding)
    pub fn generate_token() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Hash a secret into a PHC string
    pub async fn hash(&self, secret: &str) -> Result<String> {
        let secret = secret.to_owned();
        let params = self.params.clone();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| Error::hashing(format!("Failed to hash credential: {}", e)))
        })
        .await
        .map_err(|e| Error::hashing(format!("Hashing task failed: {}", e)))?
    }

    /// Check a secret against a stored PHC string
    ///
    /// An unparseable stored hash is treated as a mismatch.
    pub async fn verify(&self, secret: &str, stored_hash: &str) -> bool {
        let secret = secret.to_owned();
        let stored_hash = stored_hash.to_owned();

        let outcome = tokio::task::spawn_blocking(move || match PasswordHash::new(&stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                error!("Stored credential hash could not be parsed: {}", e);
                false
            }
        })
        .await;

        match outcome {
            Ok(valid) => valid,
            Err(e) => {
                warn!("Credential verification task failed: {}", e);
                false
            }
        }
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new()
    }
}
