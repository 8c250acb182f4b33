//! Interaction resolution.
//!
//! The resolver reads the pending prompt of an interaction from the engine
//! and drives it to completion. The prompt is carried in the type of
//! [`Pending`], so a login can only be submitted against an interaction
//! that is awaiting login and consent only against one awaiting consent.
//!
//! ```text
//! AwaitingLogin   --credentials--> Resolved
//! AwaitingConsent --confirm------> Resolved
//! AwaitingConsent --reject-------> Failed(AccessDenied)
//! any             --error--------> Failed(reason)
//! ```
//!
//! Every outcome is a [`Resolution`]; nothing is propagated as an error.

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use idp_auth::AccountDirectory;
use idp_model::{FinishOptions, InteractionResult, InteractionSession, PromptKind};

use crate::assembler::GrantAssembler;
use crate::engine::InteractionEngine;
use crate::error::{EngineError, FailureReason};

/// Prompt states.
pub mod states {
    /// The user must sign in.
    #[derive(Debug, Clone, Copy)]
    pub struct AwaitingLogin;

    /// The signed-in user must approve the requested access.
    #[derive(Debug, Clone, Copy)]
    pub struct AwaitingConsent;
}

/// An interaction known to be at prompt `S`.
#[derive(Debug, Clone)]
pub struct Pending<S> {
    session: InteractionSession,
    _state: PhantomData<S>,
}

impl<S> Pending<S> {
    const fn new(session: InteractionSession) -> Self {
        Self {
            session,
            _state: PhantomData,
        }
    }

    /// The engine's view of the interaction.
    #[must_use]
    pub const fn session(&self) -> &InteractionSession {
        &self.session
    }

    /// Interaction uid.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.session.uid
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_session(self) -> InteractionSession {
        self.session
    }
}

impl Pending<states::AwaitingConsent> {
    /// Account that signed in earlier in this interaction, if any.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.session.authenticated_account_id.as_deref()
    }
}

/// Where an interaction stands.
#[derive(Debug, Clone)]
pub enum InteractionState {
    /// Waiting for credentials.
    AwaitingLogin(Pending<states::AwaitingLogin>),
    /// Waiting for consent.
    AwaitingConsent(Pending<states::AwaitingConsent>),
    /// Cannot proceed.
    Failed(FailureReason),
}

impl InteractionState {
    /// Classifies a session by its prompt.
    #[must_use]
    pub fn from_session(session: InteractionSession) -> Self {
        match session.prompt {
            PromptKind::Login => Self::AwaitingLogin(Pending::new(session)),
            PromptKind::Consent => Self::AwaitingConsent(Pending::new(session)),
            PromptKind::Other(_) => Self::Failed(FailureReason::UnknownPrompt),
        }
    }

    /// The failure reason, if the interaction cannot proceed.
    #[must_use]
    pub const fn failure(&self) -> Option<FailureReason> {
        match self {
            Self::Failed(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// A failed interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Why it failed.
    pub reason: FailureReason,
    /// Redirect back to the client supplied by the engine, if any.
    pub return_to: Option<String>,
}

impl Failure {
    /// A failure with no engine redirect.
    #[must_use]
    pub const fn new(reason: FailureReason) -> Self {
        Self {
            reason,
            return_to: None,
        }
    }
}

/// Outcome of an interaction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The engine accepted the step; continue at `return_to`.
    Resolved {
        /// Where the browser goes next.
        return_to: String,
    },
    /// The step failed. Terminal.
    Failed(Failure),
}

impl Resolution {
    fn failed(reason: FailureReason) -> Self {
        Self::Failed(Failure::new(reason))
    }

    /// Checks if the step succeeded.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// The failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Resolved { .. } => None,
        }
    }
}

/// Drives interactions through login and consent.
///
/// Stateless; every call reads the current session from the engine.
#[derive(Clone)]
pub struct InteractionResolver {
    engine: Arc<dyn InteractionEngine>,
    directory: Arc<dyn AccountDirectory>,
    assembler: GrantAssembler<dyn InteractionEngine>,
}

impl InteractionResolver {
    /// Creates a resolver over an engine and an account directory.
    #[must_use]
    pub fn new(engine: Arc<dyn InteractionEngine>, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            assembler: GrantAssembler::new(Arc::clone(&engine)),
            engine,
            directory,
        }
    }

    /// Reads the pending prompt of an interaction.
    pub async fn inspect(&self, uid: &str) -> InteractionState {
        match self.engine.interaction_details(uid).await {
            Ok(session) => {
                if let PromptKind::Other(name) = &session.prompt {
                    tracing::debug!(uid = %uid, prompt = %name, "Unknown interaction prompt");
                }
                InteractionState::from_session(session)
            }
            Err(e) if e.is_session_missing() => {
                tracing::debug!(uid = %uid, error = %e, "Interaction session unavailable");
                InteractionState::Failed(FailureReason::InvalidSession)
            }
            Err(e) => {
                tracing::error!(uid = %uid, error = %e, "Failed to read interaction");
                InteractionState::Failed(FailureReason::ServerError)
            }
        }
    }

    /// Submits the login form for `uid`.
    pub async fn submit_login(&self, uid: &str, login: &str, password: &str) -> Resolution {
        match self.inspect(uid).await {
            InteractionState::AwaitingLogin(pending) => self.login(pending, login, password).await,
            InteractionState::AwaitingConsent(_) => fail(uid, FailureReason::UnknownPrompt),
            InteractionState::Failed(reason) => Resolution::failed(reason),
        }
    }

    /// Authenticates against the directory and finishes the login prompt.
    ///
    /// The login result replaces any earlier submission.
    pub async fn login(
        &self,
        pending: Pending<states::AwaitingLogin>,
        login: &str,
        password: &str,
    ) -> Resolution {
        let uid = pending.uid();

        if login.is_empty() || password.is_empty() {
            return fail(uid, FailureReason::MissingCredentials);
        }

        let account = match self.directory.authenticate(login, password).await {
            Ok(account) => account,
            Err(e) if e.is_authentication() => {
                // The reason stays internal.
                tracing::debug!(uid = %uid, error = ?e, "Login rejected");
                return Resolution::failed(FailureReason::InvalidCredentials);
            }
            Err(e) => return server_error(uid, &e),
        };

        match self
            .engine
            .interaction_finished(
                uid,
                InteractionResult::login(account.id.clone()),
                FinishOptions::replace(),
            )
            .await
        {
            Ok(return_to) => {
                tracing::info!(uid = %uid, account_id = %account.id, "Login completed");
                Resolution::Resolved { return_to }
            }
            Err(e) => finish_failed(uid, &e),
        }
    }

    /// Confirms consent for `uid`.
    pub async fn confirm_consent(&self, uid: &str) -> Resolution {
        match self.inspect(uid).await {
            InteractionState::AwaitingConsent(pending) => self.consent(pending).await,
            InteractionState::AwaitingLogin(_) => fail(uid, FailureReason::UnknownPrompt),
            InteractionState::Failed(reason) => Resolution::failed(reason),
        }
    }

    /// Assembles a grant for everything missing and finishes the consent
    /// prompt on top of the earlier login.
    pub async fn consent(&self, pending: Pending<states::AwaitingConsent>) -> Resolution {
        let uid = pending.uid();

        let Some(account_id) = pending.account_id() else {
            return fail(uid, FailureReason::Unauthorized);
        };

        let grant_id = match self.assembler.assemble_for(pending.session(), account_id).await {
            Ok(grant_id) => grant_id,
            Err(e) => return server_error(uid, &e),
        };

        match self
            .engine
            .interaction_finished(
                uid,
                InteractionResult::consent(grant_id.clone()),
                FinishOptions::merge(),
            )
            .await
        {
            Ok(return_to) => {
                tracing::info!(uid = %uid, account_id = %account_id, grant_id = %grant_id, "Consent granted");
                Resolution::Resolved { return_to }
            }
            Err(e) => finish_failed(uid, &e),
        }
    }

    /// Rejects consent for `uid`.
    pub async fn reject_consent(&self, uid: &str) -> Resolution {
        match self.inspect(uid).await {
            InteractionState::AwaitingConsent(pending) => self.reject(pending).await,
            InteractionState::AwaitingLogin(_) => fail(uid, FailureReason::UnknownPrompt),
            InteractionState::Failed(reason) => Resolution::failed(reason),
        }
    }

    /// Ends the interaction with `access_denied`.
    ///
    /// The failure carries the engine's redirect back to the client.
    pub async fn reject(&self, pending: Pending<states::AwaitingConsent>) -> Resolution {
        let uid = pending.uid();

        match self
            .engine
            .interaction_finished(uid, InteractionResult::access_denied(), FinishOptions::replace())
            .await
        {
            Ok(return_to) => {
                tracing::debug!(uid = %uid, "Consent rejected");
                Resolution::Failed(Failure {
                    reason: FailureReason::AccessDenied,
                    return_to: Some(return_to),
                })
            }
            Err(e) => finish_failed(uid, &e),
        }
    }
}

fn fail(uid: &str, reason: FailureReason) -> Resolution {
    tracing::debug!(uid = %uid, reason = %reason, "Interaction failed");
    Resolution::failed(reason)
}

/// The session can expire or be consumed between reading and finishing it.
fn finish_failed(uid: &str, error: &EngineError) -> Resolution {
    if error.is_session_missing() {
        tracing::debug!(uid = %uid, error = %error, "Interaction session gone before finish");
        return Resolution::failed(FailureReason::InvalidSession);
    }
    server_error(uid, error)
}

fn server_error(uid: &str, error: &dyn Display) -> Resolution {
    tracing::error!(uid = %uid, error = %error, "Interaction failed with server error");
    Resolution::failed(FailureReason::ServerError)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use idp_auth::{AccountSeed, InMemoryAccountDirectory, PasswordHasherService, PasswordPolicy};
    use idp_model::{ConsentGrant, GrantId};

    use super::*;
    use crate::error::EngineResult;

    const CALLBACK: &str = "http://localhost:3000/oidc/test/callback";

    type Finished = (String, InteractionResult, FinishOptions);

    /// Engine double that serves fixed sessions and records what it is told.
    #[derive(Default)]
    struct ScriptedEngine {
        sessions: HashMap<String, InteractionSession>,
        finished: Mutex<Vec<Finished>>,
        grants: Mutex<Vec<ConsentGrant>>,
        broken: bool,
        // Sessions disappear before any finish reaches the engine.
        vanishing: bool,
    }

    impl ScriptedEngine {
        fn with_session(mut self, session: InteractionSession) -> Self {
            self.sessions.insert(session.uid.clone(), session);
            self
        }

        fn broken(mut self) -> Self {
            self.broken = true;
            self
        }

        fn vanishing(mut self) -> Self {
            self.vanishing = true;
            self
        }

        fn finished(&self) -> Vec<Finished> {
            self.finished.lock().unwrap().clone()
        }

        fn grants(&self) -> Vec<ConsentGrant> {
            self.grants.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InteractionEngine for ScriptedEngine {
        async fn interaction_details(&self, uid: &str) -> EngineResult<InteractionSession> {
            self.sessions
                .get(uid)
                .cloned()
                .ok_or_else(|| EngineError::SessionNotFound(uid.to_string()))
        }

        async fn interaction_finished(
            &self,
            uid: &str,
            result: InteractionResult,
            options: FinishOptions,
        ) -> EngineResult<String> {
            if self.broken {
                return Err(EngineError::Internal("store offline".to_string()));
            }
            if self.vanishing {
                return Err(EngineError::SessionExpired(uid.to_string()));
            }
            let return_to = match &result {
                InteractionResult::Error { error, .. } => format!("{CALLBACK}?error={error}"),
                _ => format!("/oidc/auth/{uid}"),
            };
            self.finished
                .lock()
                .unwrap()
                .push((uid.to_string(), result, options));
            Ok(return_to)
        }

        async fn create_grant(&self, grant: ConsentGrant) -> EngineResult<GrantId> {
            let mut grants = self.grants.lock().unwrap();
            grants.push(grant);
            Ok(GrantId::new(format!("grant-{}", grants.len())))
        }
    }

    fn directory() -> Arc<InMemoryAccountDirectory> {
        Arc::new(
            InMemoryAccountDirectory::from_seeds_with(
                AccountSeed::development(),
                PasswordHasherService::new(PasswordPolicy::for_testing()),
            )
            .unwrap(),
        )
    }

    fn resolver(engine: &Arc<ScriptedEngine>) -> InteractionResolver {
        InteractionResolver::new(engine.clone(), directory())
    }

    fn login_session(uid: &str) -> InteractionSession {
        InteractionSession::new(uid, PromptKind::Login, "test-client")
    }

    fn consent_session(uid: &str) -> InteractionSession {
        let mut session = InteractionSession::new(uid, PromptKind::Consent, "test-client");
        session.missing_scopes = ["openid", "profile", "email"]
            .into_iter()
            .map(String::from)
            .collect();
        session.missing_claims = BTreeSet::from(["locale".to_string()]);
        session
    }

    fn reason(resolution: &Resolution) -> Option<FailureReason> {
        resolution.failure().map(|failure| failure.reason)
    }

    #[tokio::test]
    async fn admin_login_finishes_with_account() {
        let engine = Arc::new(ScriptedEngine::default().with_session(login_session("abc")));

        let resolution = resolver(&engine).submit_login("abc", "admin", "admin123").await;

        assert_eq!(
            resolution,
            Resolution::Resolved {
                return_to: "/oidc/auth/abc".to_string()
            }
        );
        assert_eq!(
            engine.finished(),
            vec![(
                "abc".to_string(),
                InteractionResult::login("admin789"),
                FinishOptions::replace()
            )]
        );
    }

    #[tokio::test]
    async fn login_by_email_resolves_same_account() {
        let engine = Arc::new(ScriptedEngine::default().with_session(login_session("abc")));

        let resolution = resolver(&engine)
            .submit_login("abc", "jane.smith@example.com", "password456")
            .await;

        assert!(resolution.is_resolved());
        assert_eq!(engine.finished()[0].1, InteractionResult::login("user456"));
    }

    #[tokio::test]
    async fn empty_fields_are_missing_credentials() {
        let engine = Arc::new(ScriptedEngine::default().with_session(login_session("abc")));
        let resolver = resolver(&engine);

        for (login, password) in [("", "admin123"), ("admin", ""), ("", "")] {
            let resolution = resolver.submit_login("abc", login, password).await;
            assert_eq!(reason(&resolution), Some(FailureReason::MissingCredentials));
        }
        assert!(engine.finished().is_empty());
    }

    #[tokio::test]
    async fn bad_secret_and_unknown_user_look_the_same() {
        let engine = Arc::new(ScriptedEngine::default().with_session(login_session("abc")));
        let resolver = resolver(&engine);

        let wrong_secret = resolver.submit_login("abc", "admin", "wrong").await;
        let unknown_user = resolver.submit_login("abc", "nobody", "admin123").await;

        assert_eq!(wrong_secret, unknown_user);
        assert_eq!(reason(&wrong_secret), Some(FailureReason::InvalidCredentials));
        assert!(engine.finished().is_empty());
    }

    #[tokio::test]
    async fn unknown_uid_is_invalid_session() {
        let engine = Arc::new(ScriptedEngine::default());
        let resolver = resolver(&engine);

        assert_eq!(
            resolver.inspect("missing").await.failure(),
            Some(FailureReason::InvalidSession)
        );
        let resolution = resolver.submit_login("missing", "admin", "admin123").await;
        assert_eq!(reason(&resolution), Some(FailureReason::InvalidSession));
        let resolution = resolver.confirm_consent("missing").await;
        assert_eq!(reason(&resolution), Some(FailureReason::InvalidSession));
    }

    #[tokio::test]
    async fn unknown_prompt_is_reported() {
        let session = InteractionSession::new("abc", PromptKind::from_name("select_account"), "test-client");
        let engine = Arc::new(ScriptedEngine::default().with_session(session));

        let resolution = resolver(&engine).submit_login("abc", "admin", "admin123").await;
        assert_eq!(reason(&resolution), Some(FailureReason::UnknownPrompt));
    }

    #[tokio::test]
    async fn actions_against_the_wrong_prompt_are_rejected() {
        let engine = Arc::new(
            ScriptedEngine::default()
                .with_session(login_session("login-uid"))
                .with_session(consent_session("consent-uid").with_account("admin789")),
        );
        let resolver = resolver(&engine);

        let resolution = resolver.confirm_consent("login-uid").await;
        assert_eq!(reason(&resolution), Some(FailureReason::UnknownPrompt));
        let resolution = resolver.reject_consent("login-uid").await;
        assert_eq!(reason(&resolution), Some(FailureReason::UnknownPrompt));
        let resolution = resolver.submit_login("consent-uid", "admin", "admin123").await;
        assert_eq!(reason(&resolution), Some(FailureReason::UnknownPrompt));

        assert!(engine.finished().is_empty());
        assert!(engine.grants().is_empty());
    }

    #[tokio::test]
    async fn consent_without_account_never_assembles() {
        let engine = Arc::new(ScriptedEngine::default().with_session(consent_session("abc")));

        let resolution = resolver(&engine).confirm_consent("abc").await;

        assert_eq!(reason(&resolution), Some(FailureReason::Unauthorized));
        assert!(engine.grants().is_empty());
        assert!(engine.finished().is_empty());
    }

    #[tokio::test]
    async fn consent_assembles_and_merges() {
        let engine = Arc::new(
            ScriptedEngine::default().with_session(consent_session("abc").with_account("admin789")),
        );

        let resolution = resolver(&engine).confirm_consent("abc").await;
        assert!(resolution.is_resolved());

        let grants = engine.grants();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].account_id(), "admin789");
        assert_eq!(grants[0].client_id(), "test-client");
        assert_eq!(grants[0].oidc_scope(), "email openid profile");
        assert!(grants[0].oidc_claims().contains("locale"));

        assert_eq!(
            engine.finished(),
            vec![(
                "abc".to_string(),
                InteractionResult::consent(GrantId::new("grant-1")),
                FinishOptions::merge()
            )]
        );
    }

    #[tokio::test]
    async fn reject_is_access_denied_with_client_redirect() {
        let engine = Arc::new(
            ScriptedEngine::default().with_session(consent_session("abc").with_account("admin789")),
        );

        let resolution = resolver(&engine).reject_consent("abc").await;

        let failure = resolution.failure().unwrap();
        assert_eq!(failure.reason, FailureReason::AccessDenied);
        assert_eq!(
            failure.return_to.as_deref(),
            Some("http://localhost:3000/oidc/test/callback?error=access_denied")
        );
        assert_eq!(
            engine.finished(),
            vec![(
                "abc".to_string(),
                InteractionResult::access_denied(),
                FinishOptions::replace()
            )]
        );
        assert!(engine.grants().is_empty());
    }

    #[tokio::test]
    async fn engine_failure_is_server_error() {
        let engine = Arc::new(
            ScriptedEngine::default()
                .with_session(login_session("abc"))
                .broken(),
        );

        let resolution = resolver(&engine).submit_login("abc", "admin", "admin123").await;
        assert_eq!(reason(&resolution), Some(FailureReason::ServerError));
    }

    #[tokio::test]
    async fn session_gone_at_finish_is_invalid_session() {
        let engine = Arc::new(
            ScriptedEngine::default()
                .with_session(login_session("login-uid"))
                .with_session(consent_session("consent-uid").with_account("admin789"))
                .vanishing(),
        );
        let resolver = resolver(&engine);

        let resolution = resolver.submit_login("login-uid", "admin", "admin123").await;
        assert_eq!(reason(&resolution), Some(FailureReason::InvalidSession));
        let resolution = resolver.confirm_consent("consent-uid").await;
        assert_eq!(reason(&resolution), Some(FailureReason::InvalidSession));
        let resolution = resolver.reject_consent("consent-uid").await;
        assert_eq!(reason(&resolution), Some(FailureReason::InvalidSession));
        assert!(engine.finished().is_empty());
    }
}
