//! Credential hashing and verification using Argon2id.
//!
//! Account secrets are stored as PHC strings. Verification reads the
//! parameters back out of the stored hash, so hashes produced under an older
//! policy keep verifying after the policy changes.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        Error as PhcError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};

use crate::error::{DirectoryError, DirectoryResult};

/// Argon2id cost parameters.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Time cost (iterations).
    pub time_cost: u32,
    /// Parallelism factor.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        // OWASP minimum for Argon2id
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
            hash_length: 32,
        }
    }
}

impl PasswordPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap parameters for tests. Never use for stored credentials.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
            hash_length: 32,
        }
    }

    /// Sets the memory cost in KiB.
    #[must_use]
    pub const fn memory_cost(mut self, kib: u32) -> Self {
        self.memory_cost = kib;
        self
    }

    /// Sets the time cost (iterations).
    #[must_use]
    pub const fn time_cost(mut self, iterations: u32) -> Self {
        self.time_cost = iterations;
        self
    }

    fn argon2(&self) -> DirectoryResult<Argon2<'static>> {
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(self.hash_length as usize),
        )
        .map_err(|e| DirectoryError::Hashing(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hashes and verifies account secrets.
#[derive(Debug, Clone, Default)]
pub struct PasswordHasherService {
    policy: PasswordPolicy,
}

impl PasswordHasherService {
    /// Creates a hasher with the given policy.
    #[must_use]
    pub const fn new(policy: PasswordPolicy) -> Self {
        Self { policy }
    }

    /// Creates a hasher with the default policy.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(PasswordPolicy::default())
    }

    /// Hashes a secret into a PHC string with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Hashing` if the policy parameters are invalid.
    pub fn hash(&self, secret: &str) -> DirectoryResult<String> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .policy
            .argon2()?
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| DirectoryError::Hashing(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verifies a secret against a stored PHC string.
    ///
    /// Returns `Ok(false)` when the secret does not match.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Hashing` if the stored hash is malformed.
    pub fn verify(&self, secret: &str, hash: &str) -> DirectoryResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| DirectoryError::Hashing(e.to_string()))?;

        match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(e) => Err(DirectoryError::Hashing(e.to_string())),
        }
    }
}
