//! Consent grant assembly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use idp_model::{ConsentGrant, GrantId, InteractionSession};

use crate::engine::InteractionEngine;
use crate::error::EngineResult;

/// Builds consent grants from what the engine reports as missing and
/// persists them through the engine's grant store.
///
/// The assembler does no authentication; callers pass an account id that
/// the engine already vouched for.
pub struct GrantAssembler<E: ?Sized> {
    engine: Arc<E>,
}

impl<E: ?Sized> Clone for GrantAssembler<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<E: InteractionEngine + ?Sized> GrantAssembler<E> {
    /// Creates an assembler persisting through `engine`.
    #[must_use]
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Builds the grant without persisting it.
    ///
    /// Scopes are joined with spaces before being handed to the builder,
    /// claims are copied verbatim, and every resource indicator keeps its
    /// own scope set.
    #[must_use]
    pub fn build(
        account_id: &str,
        client_id: &str,
        missing_scopes: &BTreeSet<String>,
        missing_claims: &BTreeSet<String>,
        missing_resource_scopes: &BTreeMap<String, BTreeSet<String>>,
    ) -> ConsentGrant {
        let mut builder = ConsentGrant::builder(account_id, client_id);

        if !missing_scopes.is_empty() {
            builder.add_oidc_scope(&join(missing_scopes));
        }
        if !missing_claims.is_empty() {
            builder.add_oidc_claims(missing_claims.iter().cloned());
        }
        for (indicator, scopes) in missing_resource_scopes {
            builder.add_resource_scope(indicator.clone(), &join(scopes));
        }

        builder.build()
    }

    /// Builds and persists a grant, returning its handle.
    ///
    /// ## Errors
    ///
    /// Returns the engine's error if the grant cannot be stored.
    pub async fn assemble(
        &self,
        account_id: &str,
        client_id: &str,
        missing_scopes: &BTreeSet<String>,
        missing_claims: &BTreeSet<String>,
        missing_resource_scopes: &BTreeMap<String, BTreeSet<String>>,
    ) -> EngineResult<GrantId> {
        let grant = Self::build(
            account_id,
            client_id,
            missing_scopes,
            missing_claims,
            missing_resource_scopes,
        );
        self.engine.create_grant(grant).await
    }

    /// Assembles everything a consent-pending session reports as missing.
    ///
    /// ## Errors
    ///
    /// Returns the engine's error if the grant cannot be stored.
    pub async fn assemble_for(
        &self,
        session: &InteractionSession,
        account_id: &str,
    ) -> EngineResult<GrantId> {
        self.assemble(
            account_id,
            &session.client_id,
            &session.missing_scopes,
            &session.missing_claims,
            &session.missing_resource_scopes,
        )
        .await
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}
