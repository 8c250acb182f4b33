//! # idp-auth
//!
//! Account directory for the identity provider.
//!
//! ## Features
//!
//! - [`AccountDirectory`]: authenticate a login identifier and secret
//! - [`AccountAdapter`]: the read-only face the protocol engine calls back into
//! - [`InMemoryAccountDirectory`]: seeded directory, replaceable by a persistent store
//! - Argon2id password hashing
//!
//! ## Example
//!
//! ```ignore
//! use idp_auth::{AccountDirectory, AccountSeed, InMemoryAccountDirectory};
//!
//! let directory = InMemoryAccountDirectory::from_seeds(AccountSeed::development())?;
//! let account = directory.authenticate("admin", "admin123").await?;
//! let claims = directory.resolve_claims(&account.id, "openid email").await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod directory;
pub mod error;
pub mod password;

pub use directory::{AccountAdapter, AccountDirectory, AccountSeed, InMemoryAccountDirectory};
pub use error::{AuthFailure, DirectoryError, DirectoryResult};
pub use password::{PasswordHasherService, PasswordPolicy};
