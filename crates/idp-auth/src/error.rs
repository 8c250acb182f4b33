//! Account directory error types.

use std::fmt;

use thiserror::Error;

/// Why an authentication attempt failed.
///
/// Only used for internal logging. Both reasons share one external message
/// so a caller cannot probe which login identifiers exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No account matches the login identifier.
    NotFound,
    /// The account exists but the secret does not match.
    BadSecret,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not_found"),
            Self::BadSecret => f.write_str("bad_secret"),
        }
    }
}

/// Account directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Authentication failed. The message never reveals the reason.
    #[error("invalid credentials")]
    Authentication(AuthFailure),

    /// No account with the given id.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Two seeds share a unique attribute.
    #[error("duplicate account {field}: '{value}'")]
    Duplicate {
        /// Attribute that collided (`id`, `login_name` or `email`).
        field: &'static str,
        /// Colliding value.
        value: String,
    },

    /// Seed data could not be read.
    #[error("invalid account seed: {0}")]
    InvalidSeed(String),

    /// Password hashing failed.
    #[error("credential hashing failed: {0}")]
    Hashing(String),
}

impl DirectoryError {
    /// Returns the internal failure reason for authentication errors.
    #[must_use]
    pub const fn auth_failure(&self) -> Option<AuthFailure> {
        match self {
            Self::Authentication(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Checks if this is an expected user-facing failure.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::AccountNotFound(_))
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
