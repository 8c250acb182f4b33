//! Protocol engine boundary.

use async_trait::async_trait;
use idp_model::{ConsentGrant, FinishOptions, GrantId, InteractionResult, InteractionSession};

use crate::error::EngineResult;

/// Path the browser is sent to for an interaction.
#[must_use]
pub fn interaction_url(uid: &str) -> String {
    format!("/interaction/{uid}")
}

/// The operations the interaction flow consumes from the protocol engine.
///
/// The engine owns session state keyed by uid. Implementations must be
/// safe to call from concurrent requests.
#[async_trait]
pub trait InteractionEngine: Send + Sync {
    /// Reads the current state of an interaction.
    ///
    /// ## Errors
    ///
    /// Returns `EngineError::SessionNotFound` or `EngineError::SessionExpired`
    /// when there is no live session for `uid`.
    async fn interaction_details(&self, uid: &str) -> EngineResult<InteractionSession>;

    /// Finishes the current prompt of an interaction.
    ///
    /// Returns the URL the browser must be redirected to next.
    async fn interaction_finished(
        &self,
        uid: &str,
        result: InteractionResult,
        options: FinishOptions,
    ) -> EngineResult<String>;

    /// Persists a consent grant and returns its handle.
    async fn create_grant(&self, grant: ConsentGrant) -> EngineResult<GrantId>;
}
