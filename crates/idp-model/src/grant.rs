//! Consent grant model.
//!
//! A grant records what a user authorized a client to receive. Grants are
//! built with [`GrantBuilder`] and are immutable once built; a later consent
//! produces a new grant.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claims::scope_tokens;

/// Opaque handle of a persisted grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(String);

impl GrantId {
    /// Wraps an existing grant handle.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random handle.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authorization a user has given a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentGrant {
    account_id: String,
    client_id: String,
    oidc_scopes: BTreeSet<String>,
    oidc_claims: BTreeSet<String>,
    resource_scopes: BTreeMap<String, BTreeSet<String>>,
}

impl ConsentGrant {
    /// Starts building a grant for an account and client.
    #[must_use]
    pub fn builder(account_id: impl Into<String>, client_id: impl Into<String>) -> GrantBuilder {
        GrantBuilder {
            grant: Self {
                account_id: account_id.into(),
                client_id: client_id.into(),
                oidc_scopes: BTreeSet::new(),
                oidc_claims: BTreeSet::new(),
                resource_scopes: BTreeMap::new(),
            },
        }
    }

    /// Account that gave consent.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Client that received consent.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Granted OIDC scopes.
    #[must_use]
    pub const fn oidc_scopes(&self) -> &BTreeSet<String> {
        &self.oidc_scopes
    }

    /// Granted OIDC scopes, space-joined.
    #[must_use]
    pub fn oidc_scope(&self) -> String {
        join(&self.oidc_scopes)
    }

    /// Granted claims.
    #[must_use]
    pub const fn oidc_claims(&self) -> &BTreeSet<String> {
        &self.oidc_claims
    }

    /// Granted resource scopes keyed by resource indicator.
    #[must_use]
    pub const fn resource_scopes(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.resource_scopes
    }

    /// Granted scopes for one resource indicator, space-joined.
    #[must_use]
    pub fn resource_scope(&self, indicator: &str) -> Option<String> {
        self.resource_scopes.get(indicator).map(join)
    }

    /// Checks whether nothing was granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.oidc_scopes.is_empty() && self.oidc_claims.is_empty() && self.resource_scopes.is_empty()
    }
}

/// Builder for [`ConsentGrant`].
#[derive(Debug, Clone)]
pub struct GrantBuilder {
    grant: ConsentGrant,
}

impl GrantBuilder {
    /// Adds the tokens of a space-delimited scope string.
    pub fn add_oidc_scope(&mut self, scope: &str) -> &mut Self {
        self.grant
            .oidc_scopes
            .extend(scope_tokens(scope).into_iter().map(String::from));
        self
    }

    /// Adds claim names verbatim.
    pub fn add_oidc_claims<I, S>(&mut self, claims: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant.oidc_claims.extend(claims.into_iter().map(Into::into));
        self
    }

    /// Adds the tokens of a space-delimited scope string for a resource indicator.
    pub fn add_resource_scope(&mut self, indicator: impl Into<String>, scope: &str) -> &mut Self {
        self.grant
            .resource_scopes
            .entry(indicator.into())
            .or_default()
            .extend(scope_tokens(scope).into_iter().map(String::from));
        self
    }

    /// Finishes the grant.
    #[must_use]
    pub fn build(self) -> ConsentGrant {
        self.grant
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}
