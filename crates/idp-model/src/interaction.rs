//! Interaction session model.
//!
//! An interaction session is the protocol engine's record of one
//! in-progress authorization attempt. The interaction flow only reads it
//! and hands back an [`InteractionResult`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grant::GrantId;

/// The user action the engine currently requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// The user must authenticate.
    Login,
    /// The user must authorize the client.
    Consent,
    /// A prompt this provider does not handle.
    Other(String),
}

impl PromptKind {
    /// Parses a prompt name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "login" => Self::Login,
            "consent" => Self::Consent,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the prompt name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Login => "login",
            Self::Consent => "consent",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of an interaction session as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionSession {
    /// Opaque interaction identifier.
    pub uid: String,
    /// Pending prompt.
    pub prompt: PromptKind,
    /// OIDC scopes the user has not yet granted.
    pub missing_scopes: BTreeSet<String>,
    /// Claims the user has not yet granted.
    pub missing_claims: BTreeSet<String>,
    /// Resource scopes the user has not yet granted, keyed by resource indicator.
    pub missing_resource_scopes: BTreeMap<String, BTreeSet<String>>,
    /// Account authenticated earlier in this session.
    pub authenticated_account_id: Option<String>,
    /// Client requesting authorization.
    pub client_id: String,
}

impl InteractionSession {
    /// Creates a session snapshot with nothing missing and no account.
    #[must_use]
    pub fn new(uid: impl Into<String>, prompt: PromptKind, client_id: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            prompt,
            missing_scopes: BTreeSet::new(),
            missing_claims: BTreeSet::new(),
            missing_resource_scopes: BTreeMap::new(),
            authenticated_account_id: None,
            client_id: client_id.into(),
        }
    }

    /// Sets the authenticated account.
    #[must_use]
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.authenticated_account_id = Some(account_id.into());
        self
    }
}

/// Outcome handed back to the engine to finish an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionResult {
    /// The user authenticated.
    Login {
        /// Authenticated account.
        account_id: String,
    },
    /// The user consented.
    Consent {
        /// Grant persisted for this consent.
        grant_id: GrantId,
    },
    /// The interaction ended with an OAuth error.
    Error {
        /// OAuth error code.
        error: String,
        /// Human-readable description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_description: Option<String>,
    },
}

impl InteractionResult {
    /// Login result for an account.
    #[must_use]
    pub fn login(account_id: impl Into<String>) -> Self {
        Self::Login {
            account_id: account_id.into(),
        }
    }

    /// Consent result for a grant.
    #[must_use]
    pub const fn consent(grant_id: GrantId) -> Self {
        Self::Consent { grant_id }
    }

    /// The user denied the request.
    #[must_use]
    pub fn access_denied() -> Self {
        Self::Error {
            error: "access_denied".to_string(),
            error_description: Some("The user denied the request".to_string()),
        }
    }
}

/// Options for finishing an interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinishOptions {
    /// Layer this result onto the previous submission instead of replacing it.
    pub merge_with_last_submission: bool,
}

impl FinishOptions {
    /// Merge with the previous submission.
    #[must_use]
    pub const fn merge() -> Self {
        Self {
            merge_with_last_submission: true,
        }
    }

    /// Replace the previous submission.
    #[must_use]
    pub const fn replace() -> Self {
        Self {
            merge_with_last_submission: false,
        }
    }
}
