//! Account domain model.
//!
//! Accounts are the end users the provider authenticates. An account is
//! created when the directory is provisioned and is never mutated by the
//! interaction flow afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Optional profile attributes of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Given (first) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Family (last) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Avatar URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Preferred locale (BCP 47 tag).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Profile {
    /// Creates an empty profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the given name.
    #[must_use]
    pub fn with_given_name(mut self, given_name: impl Into<String>) -> Self {
        self.given_name = Some(given_name.into());
        self
    }

    /// Sets the family name.
    #[must_use]
    pub fn with_family_name(mut self, family_name: impl Into<String>) -> Self {
        self.family_name = Some(family_name.into());
        self
    }

    /// Sets the avatar URI.
    #[must_use]
    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    /// Sets the locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// A registered end user.
///
/// `id` is the stable subject identifier; `login_name` and `email` are the
/// two identifiers a user may type into the login form. The credential
/// secret is an opaque PHC string and is never serialized.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable opaque identifier (the `sub` claim).
    pub id: String,
    /// Unique login name.
    pub login_name: String,
    /// Unique email address.
    pub email: String,
    /// Human-readable name.
    pub display_name: String,
    /// Optional profile attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(skip_serializing, default)]
    credential_secret: String,
}

impl Account {
    /// Creates a new account.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        login_name: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
        credential_secret: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            login_name: login_name.into(),
            email: email.into(),
            display_name: display_name.into(),
            profile: None,
            credential_secret: credential_secret.into(),
        }
    }

    /// Attaches profile attributes.
    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Returns the stored credential secret (a password hash).
    #[must_use]
    pub fn credential_secret(&self) -> &str {
        &self.credential_secret
    }

    /// Checks whether `identifier` names this account.
    ///
    /// Matching is case-sensitive against the login name or the email.
    #[must_use]
    pub fn is_identified_by(&self, identifier: &str) -> bool {
        self.login_name == identifier || self.email == identifier
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("login_name", &self.login_name)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("profile", &self.profile)
            .field("credential_secret", &"[redacted]")
            .finish()
    }
}
