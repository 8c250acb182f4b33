//! Claims released to clients.
//!
//! Claims are a per-request projection of an [`Account`], filtered by the
//! granted scope. They are never stored.
//!
//! | scope token | claims added |
//! |---|---|
//! | (always) | `sub` |
//! | `email` | `email`, `email_verified` |
//! | `profile` | `name`, `given_name`, `family_name`, `picture`, `locale` |

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::account::Account;

/// The `openid` scope.
pub const SCOPE_OPENID: &str = "openid";

/// The `email` scope.
pub const SCOPE_EMAIL: &str = "email";

/// The `profile` scope.
pub const SCOPE_PROFILE: &str = "profile";

/// Splits a space-delimited scope string into its distinct tokens.
#[must_use]
pub fn scope_tokens(scope: &str) -> BTreeSet<&str> {
    scope.split_whitespace().collect()
}

/// Standard OIDC claims for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier.
    pub sub: String,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Email verified flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    /// Full name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Given (first) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    /// Family (last) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Profile picture URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Claims {
    /// Creates claims carrying only the subject.
    #[must_use]
    pub fn for_subject(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            email: None,
            email_verified: None,
            name: None,
            given_name: None,
            family_name: None,
            picture: None,
            locale: None,
        }
    }

    /// Projects an account into claims for the given scope string.
    ///
    /// Unknown scope tokens are ignored.
    #[must_use]
    pub fn project(account: &Account, scope: &str) -> Self {
        let scopes = scope_tokens(scope);
        let mut claims = Self::for_subject(account.id.clone());

        if scopes.contains(SCOPE_EMAIL) {
            claims.email = Some(account.email.clone());
            claims.email_verified = Some(true);
        }

        if scopes.contains(SCOPE_PROFILE) {
            claims.name = Some(account.display_name.clone()).filter(|n| !n.is_empty());
            if let Some(profile) = &account.profile {
                claims.given_name.clone_from(&profile.given_name);
                claims.family_name.clone_from(&profile.family_name);
                claims.picture.clone_from(&profile.picture);
                claims.locale.clone_from(&profile.locale);
            }
        }

        claims
    }
}
