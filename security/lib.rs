//! Security Module for TxGuard
//!
//! Secret hashing for credential checks that sit in front of the risk engine.
//! The engine itself never depends on this crate; callers wire the two
//! together.
//!
//! # Usage
//!
//! ```rust,no_run
//! use security::secret_hasher::{Argon2Hasher, HasherConfig, SecretHasher};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hasher = Argon2Hasher::new(HasherConfig::default())?;
//!
//! // Store the digest, never the secret
//! let digest = hasher.hash(b"MyS3cr3tP@ssw0rd!")?;
//!
//! assert!(hasher.verify(b"MyS3cr3tP@ssw0rd!", &digest)?);
//! assert!(!hasher.verify(b"wrongpassword", &digest)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Cost tuning
//!
//! Argon2id cost is set by memory (KiB), iterations and lanes. The defaults
//! take tens of milliseconds on commodity hardware. Raising them only affects
//! new digests: every digest carries its own parameters, so old ones still
//! verify and [`secret_hasher::Argon2Hasher::needs_rehash`] reports them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod secret_hasher;

pub use secret_hasher::{Argon2Hasher, HashError, HasherConfig, SecretHasher};
