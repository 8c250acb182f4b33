//! Account directory.
//!
//! The directory is the source of truth for authentication and claims.
//! [`AccountAdapter`] is the read-only face handed to the protocol engine at
//! construction time; [`AccountDirectory`] adds authentication for the
//! login form. [`InMemoryAccountDirectory`] is provisioned once from seeds
//! and is immutable afterwards, so it is shared without locking.

use std::collections::HashMap;

use async_trait::async_trait;
use idp_model::{Account, Claims, Profile};
use serde::Deserialize;

use crate::error::{AuthFailure, DirectoryError, DirectoryResult};
use crate::password::PasswordHasherService;

/// Read access to accounts, as used by the protocol engine.
#[async_trait]
pub trait AccountAdapter: Send + Sync {
    /// Gets an account by id.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::AccountNotFound` if no account has this id.
    async fn find_by_id(&self, id: &str) -> DirectoryResult<Account>;

    /// Resolves the claims released for `scope`.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::AccountNotFound` if no account has this id.
    async fn resolve_claims(&self, id: &str, scope: &str) -> DirectoryResult<Claims> {
        let account = self.find_by_id(id).await?;
        Ok(Claims::project(&account, scope))
    }
}

/// Account directory used by the login flow.
#[async_trait]
pub trait AccountDirectory: AccountAdapter {
    /// Authenticates a login name or email with a secret.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::Authentication` when the identifier is
    /// unknown or the secret is wrong. Any other error is a server fault.
    async fn authenticate(&self, login_identifier: &str, secret: &str) -> DirectoryResult<Account>;
}

/// Provisioning record for one account.
///
/// `password` is plaintext and is hashed when the directory is built.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSeed {
    /// Stable account id.
    pub id: String,
    /// Login name.
    #[serde(alias = "username")]
    pub login_name: String,
    /// Email address.
    pub email: String,
    /// Display name.
    #[serde(alias = "name")]
    pub display_name: String,
    /// Plaintext password.
    pub password: String,
    /// Optional profile attributes.
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl AccountSeed {
    /// Parses a JSON array of seeds.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::InvalidSeed` if the document is malformed.
    pub fn from_json(json: &str) -> DirectoryResult<Vec<Self>> {
        serde_json::from_str(json).map_err(|e| DirectoryError::InvalidSeed(e.to_string()))
    }

    /// Development accounts.
    #[must_use]
    pub fn development() -> Vec<Self> {
        let placeholder = "https://via.placeholder.com/150";
        vec![
            Self {
                id: "user123".to_string(),
                login_name: "john.doe".to_string(),
                email: "john.doe@example.com".to_string(),
                display_name: "John Doe".to_string(),
                password: "password123".to_string(),
                profile: Some(
                    Profile::new()
                        .with_given_name("John")
                        .with_family_name("Doe")
                        .with_picture(placeholder)
                        .with_locale("en-US"),
                ),
            },
            Self {
                id: "user456".to_string(),
                login_name: "jane.smith".to_string(),
                email: "jane.smith@example.com".to_string(),
                display_name: "Jane Smith".to_string(),
                password: "password456".to_string(),
                profile: Some(
                    Profile::new()
                        .with_given_name("Jane")
                        .with_family_name("Smith")
                        .with_picture(placeholder)
                        .with_locale("en-US"),
                ),
            },
            Self {
                id: "admin789".to_string(),
                login_name: "admin".to_string(),
                email: "admin@example.com".to_string(),
                display_name: "Administrator".to_string(),
                password: "admin123".to_string(),
                profile: Some(
                    Profile::new()
                        .with_given_name("Admin")
                        .with_family_name("User")
                        .with_picture(placeholder)
                        .with_locale("en-US"),
                ),
            },
        ]
    }
}

/// Directory held in memory and fixed after provisioning.
#[derive(Debug)]
pub struct InMemoryAccountDirectory {
    accounts: Vec<Account>,
    by_id: HashMap<String, usize>,
    by_identifier: HashMap<String, usize>,
    hasher: PasswordHasherService,
    decoy_hash: String,
}

impl InMemoryAccountDirectory {
    /// Builds a directory from seeds using the default hashing policy.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::Duplicate` if a unique attribute repeats.
    pub fn from_seeds(seeds: Vec<AccountSeed>) -> DirectoryResult<Self> {
        Self::from_seeds_with(seeds, PasswordHasherService::with_defaults())
    }

    /// Builds a directory from seeds, hashing each password with `hasher`.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::Duplicate` if a unique attribute repeats.
    pub fn from_seeds_with(
        seeds: Vec<AccountSeed>,
        hasher: PasswordHasherService,
    ) -> DirectoryResult<Self> {
        let accounts = seeds
            .into_iter()
            .map(|seed| -> DirectoryResult<Account> {
                let secret = hasher.hash(&seed.password)?;
                let account =
                    Account::new(seed.id, seed.login_name, seed.email, seed.display_name, secret);
                Ok(match seed.profile {
                    Some(profile) => account.with_profile(profile),
                    None => account,
                })
            })
            .collect::<DirectoryResult<Vec<_>>>()?;

        Self::from_accounts(accounts, hasher)
    }

    /// Builds a directory from accounts whose secrets are already hashed.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::Duplicate` if an id, login name or email
    /// repeats, or if a login name equals another account's email.
    pub fn from_accounts(
        accounts: Vec<Account>,
        hasher: PasswordHasherService,
    ) -> DirectoryResult<Self> {
        let mut by_id = HashMap::with_capacity(accounts.len());
        let mut by_identifier = HashMap::with_capacity(accounts.len() * 2);

        for (index, account) in accounts.iter().enumerate() {
            if by_id.insert(account.id.clone(), index).is_some() {
                return Err(DirectoryError::Duplicate {
                    field: "id",
                    value: account.id.clone(),
                });
            }
            for (field, identifier) in [("login_name", &account.login_name), ("email", &account.email)] {
                match by_identifier.insert(identifier.clone(), index) {
                    // An account may use the same string as login name and email.
                    Some(previous) if previous != index => {
                        return Err(DirectoryError::Duplicate {
                            field,
                            value: identifier.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        let decoy_hash = hasher.hash("decoy-credential")?;

        tracing::info!(accounts = accounts.len(), "Account directory provisioned");

        Ok(Self {
            accounts,
            by_id,
            by_identifier,
            hasher,
            decoy_hash,
        })
    }
}

#[async_trait]
impl AccountAdapter for InMemoryAccountDirectory {
    async fn find_by_id(&self, id: &str) -> DirectoryResult<Account> {
        self.by_id
            .get(id)
            .map(|&index| self.accounts[index].clone())
            .ok_or_else(|| DirectoryError::AccountNotFound(id.to_string()))
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn authenticate(&self, login_identifier: &str, secret: &str) -> DirectoryResult<Account> {
        let Some(&index) = self.by_identifier.get(login_identifier) else {
            // Same hashing cost as a real account.
            let _ = self.hasher.verify(secret, &self.decoy_hash);
            tracing::debug!(reason = %AuthFailure::NotFound, "Authentication failed");
            return Err(DirectoryError::Authentication(AuthFailure::NotFound));
        };

        let account = &self.accounts[index];
        if self.hasher.verify(secret, account.credential_secret())? {
            tracing::debug!(account_id = %account.id, "Authentication succeeded");
            Ok(account.clone())
        } else {
            tracing::debug!(
                account_id = %account.id,
                reason = %AuthFailure::BadSecret,
                "Authentication failed"
            );
            Err(DirectoryError::Authentication(AuthFailure::BadSecret))
        }
    }
}
