//! Salted, cost-tunable secret hashing
//!
//! Digests are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`)
//! returned as bytes. The salt is random per call and embedded in the digest.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Secret hashing errors
#[derive(Error, Debug)]
pub enum HashError {
    /// Cost parameters rejected by Argon2
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Hashing failed
    #[error("Hashing failed: {0}")]
    Hashing(String),

    /// Stored digest could not be parsed
    #[error("Malformed digest: {0}")]
    MalformedDigest(String),

    /// Blocking task was cancelled or panicked
    #[error("Hashing task failed: {0}")]
    Task(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, HashError>;

/// Salted one-way hashing of secrets
pub trait SecretHasher: Send + Sync {
    /// Hash a secret with a fresh random salt
    fn hash(&self, secret: &[u8]) -> Result<Vec<u8>>;

    /// Check a secret against a stored digest.
    ///
    /// A wrong secret is `Ok(false)`; a digest that cannot be parsed is an error.
    fn verify(&self, secret: &[u8], digest: &[u8]) -> Result<bool>;
}

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherConfig {
    /// Memory cost (KiB)
    pub memory_kib: u32,

    /// Number of passes
    pub iterations: u32,

    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456, // 19 MiB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Argon2id implementation of [`SecretHasher`]
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    config: HasherConfig,
    params: Params,
}

impl Argon2Hasher {
    /// Create hasher, validating the cost parameters
    pub fn new(config: HasherConfig) -> Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| HashError::Config(e.to_string()))?;

        Ok(Self { config, params })
    }

    /// Active cost parameters
    pub fn config(&self) -> &HasherConfig {
        &self.config
    }

    /// Whether `digest` was produced with different cost parameters than the
    /// ones configured now
    pub fn needs_rehash(&self, digest: &[u8]) -> Result<bool> {
        let encoded = as_phc(digest)?;
        let parsed =
            PasswordHash::new(encoded).map_err(|e| HashError::MalformedDigest(e.to_string()))?;

        let stored = (
            parsed.params.get_decimal("m"),
            parsed.params.get_decimal("t"),
            parsed.params.get_decimal("p"),
        );
        let current = (
            Some(self.config.memory_kib),
            Some(self.config.iterations),
            Some(self.config.parallelism),
        );

        Ok(parsed.algorithm != Algorithm::Argon2id.ident() || stored != current)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, secret: &[u8]) -> Result<Vec<u8>> {
        let started = Instant::now();
        let salt = SaltString::generate(&mut OsRng);

        let digest = self
            .argon2()
            .hash_password(secret, &salt)
            .map_err(|e| HashError::Hashing(e.to_string()))?
            .to_string();

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            memory_kib = self.config.memory_kib,
            iterations = self.config.iterations,
            "Secret hashed"
        );
        Ok(digest.into_bytes())
    }

    fn verify(&self, secret: &[u8], digest: &[u8]) -> Result<bool> {
        let encoded = as_phc(digest)?;
        let parsed =
            PasswordHash::new(encoded).map_err(|e| HashError::MalformedDigest(e.to_string()))?;

        // Parameters come from the digest, not from `self.config`
        match self.argon2().verify_password(secret, &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::MalformedDigest(e.to_string())),
        }
    }
}

fn as_phc(digest: &[u8]) -> Result<&str> {
    std::str::from_utf8(digest).map_err(|e| HashError::MalformedDigest(e.to_string()))
}

/// Hash on tokio's blocking pool so the expensive work stays off async workers
pub async fn hash_blocking<H>(hasher: Arc<H>, secret: Vec<u8>) -> Result<Vec<u8>>
where
    H: SecretHasher + ?Sized + 'static,
{
    tokio::task::spawn_blocking(move || hasher.hash(&secret))
        .await
        .map_err(|e| HashError::Task(e.to_string()))?
}

/// Verify on tokio's blocking pool
pub async fn verify_blocking<H>(hasher: Arc<H>, secret: Vec<u8>, digest: Vec<u8>) -> Result<bool>
where
    H: SecretHasher + ?Sized + 'static,
{
    tokio::task::spawn_blocking(move || hasher.verify(&secret, &digest))
        .await
        .map_err(|e| HashError::Task(e.to_string()))?
}
