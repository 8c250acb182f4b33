//! In-memory interaction engine.
//!
//! Holds interaction sessions, consent grants and issued authorizations in
//! process memory. Suitable for development and tests; state is lost on
//! restart.
//!
//! A session opens at the `login` prompt. Each finished prompt is recorded
//! as a submission, then the engine decides what is still needed:
//!
//! - no authenticated account: back to `login`
//! - requested scopes, claims or resource scopes not covered by a grant for
//!   the same account and client: `consent` with the missing sets
//! - otherwise: the authorization completes and the browser is sent back
//!   to the client with a code
//!
//! A grant only counts as remembered consent once an authorization has
//! completed with it. Issued codes expire after
//! [`DEFAULT_AUTHORIZATION_CODE_TTL_SECS`] unless configured otherwise.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use idp_auth::AccountAdapter;
use idp_model::{
    Claims, ConsentGrant, FinishOptions, GrantId, InteractionResult, InteractionSession,
    PromptKind, SCOPE_OPENID, scope_tokens,
};
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use crate::engine::{InteractionEngine, interaction_url};
use crate::error::{EngineError, EngineResult};

/// Default interaction lifetime in seconds.
pub const DEFAULT_INTERACTION_TTL_SECS: i64 = 3600;

/// Default authorization code lifetime in seconds.
pub const DEFAULT_AUTHORIZATION_CODE_TTL_SECS: i64 = 600;

/// A client allowed to start authorizations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    /// Client id.
    pub client_id: String,
    /// Exact-match redirect URIs.
    pub redirect_uris: Vec<String>,
    /// Space-delimited scopes the client may request.
    pub scope: String,
}

impl RegisteredClient {
    /// Creates a client registration.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        redirect_uris: Vec<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uris,
            scope: scope.into(),
        }
    }

    /// The development client served by the test callback page.
    #[must_use]
    pub fn development() -> Self {
        Self::new(
            "test-client",
            vec!["http://localhost:3000/oidc/test/callback".to_string()],
            "openid profile email",
        )
    }

    /// Checks a redirect URI against the registration (exact match).
    #[must_use]
    pub fn allows_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    /// Checks whether the client may request a scope token.
    #[must_use]
    pub fn allows_scope(&self, token: &str) -> bool {
        scope_tokens(&self.scope).contains(token)
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interaction lifetime in seconds.
    pub interaction_ttl_secs: i64,
    /// Authorization code lifetime in seconds.
    pub authorization_code_ttl_secs: i64,
    /// OIDC scopes the provider knows.
    pub supported_scopes: BTreeSet<String>,
    /// Resource indicators and the scopes each resource server accepts.
    pub resource_servers: BTreeMap<String, BTreeSet<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interaction_ttl_secs: DEFAULT_INTERACTION_TTL_SECS,
            authorization_code_ttl_secs: DEFAULT_AUTHORIZATION_CODE_TTL_SECS,
            supported_scopes: ["openid", "offline_access", "profile", "email", "phone", "address"]
                .into_iter()
                .map(String::from)
                .collect(),
            resource_servers: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Sets the interaction lifetime.
    #[must_use]
    pub const fn with_interaction_ttl(mut self, secs: i64) -> Self {
        self.interaction_ttl_secs = secs;
        self
    }

    /// Sets the authorization code lifetime.
    #[must_use]
    pub const fn with_authorization_code_ttl(mut self, secs: i64) -> Self {
        self.authorization_code_ttl_secs = secs;
        self
    }

    /// Registers a resource server and its space-delimited scopes.
    #[must_use]
    pub fn with_resource_server(mut self, indicator: impl Into<String>, scope: &str) -> Self {
        self.resource_servers.insert(
            indicator.into(),
            scope_tokens(scope).into_iter().map(String::from).collect(),
        );
        self
    }
}

/// Parameters of an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Client id.
    pub client_id: String,
    /// Redirect URI, must be registered.
    pub redirect_uri: String,
    /// Only `code` is supported.
    pub response_type: String,
    /// Space-delimited requested scope.
    pub scope: String,
    /// Opaque client state echoed back on redirect.
    pub state: Option<String>,
    /// Resource indicators.
    pub resources: Vec<String>,
    /// Individually requested claim names.
    pub claims: BTreeSet<String>,
}

impl AuthorizationRequest {
    /// Creates a `code` request.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            response_type: "code".to_string(),
            scope: scope.into(),
            state: None,
            resources: Vec::new(),
            claims: BTreeSet::new(),
        }
    }

    /// Sets the state parameter.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Adds a resource indicator.
    #[must_use]
    pub fn with_resource(mut self, indicator: impl Into<String>) -> Self {
        self.resources.push(indicator.into());
        self
    }

    /// Adds requested claim names.
    #[must_use]
    pub fn with_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.claims.extend(claims.into_iter().map(Into::into));
        self
    }
}

/// Collects the claim names of a `claims` request parameter.
///
/// The parameter is a JSON object keyed by target (`userinfo`, `id_token`),
/// each mapping claim names to a request or `null`.
///
/// ## Errors
///
/// Returns `EngineError::InvalidRequest` when the value is not that shape.
pub fn parse_claims_parameter(value: &str) -> EngineResult<BTreeSet<String>> {
    let parsed: serde_json::Value = serde_json::from_str(value)
        .map_err(|e| EngineError::InvalidRequest(format!("claims parameter: {e}")))?;

    let serde_json::Value::Object(targets) = parsed else {
        return Err(EngineError::InvalidRequest(
            "claims parameter must be a JSON object".to_string(),
        ));
    };

    let mut names = BTreeSet::new();
    for (target, requested) in &targets {
        match requested {
            serde_json::Value::Object(members) => names.extend(members.keys().cloned()),
            serde_json::Value::Null => {}
            _ => {
                return Err(EngineError::InvalidRequest(format!(
                    "claims.{target} must be a JSON object"
                )));
            }
        }
    }
    Ok(names)
}

/// An authorization that completed with a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedAuthorization {
    /// Opaque authorization code.
    pub code: String,
    /// Authenticated account.
    pub account_id: String,
    /// Client the code was issued to.
    pub client_id: String,
    /// Grant the authorization completed with.
    pub grant_id: GrantId,
    /// Space-delimited OIDC scope requested by this authorization. Every
    /// requested scope is granted once it completes.
    pub scope: String,
    /// Redirect URI the code was delivered to.
    pub redirect_uri: String,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// The code is unusable after this instant.
    pub expires_at: DateTime<Utc>,
}

impl IssuedAuthorization {
    /// Checks if the code has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone)]
struct StoredGrant {
    id: GrantId,
    grant: ConsentGrant,
    // Set once an authorization completes with the grant.
    settled: bool,
}

#[derive(Debug, Clone, Default)]
struct Submission {
    account_id: Option<String>,
    grant_id: Option<GrantId>,
}

impl Submission {
    fn record(&mut self, result: InteractionResult) {
        match result {
            InteractionResult::Login { account_id } => self.account_id = Some(account_id),
            InteractionResult::Consent { grant_id } => self.grant_id = Some(grant_id),
            InteractionResult::Error { .. } => {}
        }
    }
}

#[derive(Debug, Clone)]
struct StoredInteraction {
    request: AuthorizationRequest,
    requested_scopes: BTreeSet<String>,
    requested_resource_scopes: BTreeMap<String, BTreeSet<String>>,
    prompt: PromptKind,
    missing_scopes: BTreeSet<String>,
    missing_claims: BTreeSet<String>,
    missing_resource_scopes: BTreeMap<String, BTreeSet<String>>,
    submission: Submission,
    expires_at: DateTime<Utc>,
}

enum NextStep {
    Prompt,
    Complete { account_id: String, grant_id: GrantId },
}

impl StoredInteraction {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    fn to_session(&self, uid: &str) -> InteractionSession {
        InteractionSession {
            uid: uid.to_string(),
            prompt: self.prompt.clone(),
            missing_scopes: self.missing_scopes.clone(),
            missing_claims: self.missing_claims.clone(),
            missing_resource_scopes: self.missing_resource_scopes.clone(),
            authenticated_account_id: self.submission.account_id.clone(),
            client_id: self.request.client_id.clone(),
        }
    }

    fn prompt_login(&mut self) {
        self.prompt = PromptKind::Login;
        self.missing_scopes.clear();
        self.missing_claims.clear();
        self.missing_resource_scopes.clear();
    }

    /// Decides the next prompt from the submission and the stored grants.
    fn resume(&mut self, grants: &[StoredGrant]) -> NextStep {
        let Some(account_id) = self.submission.account_id.clone() else {
            self.prompt_login();
            return NextStep::Prompt;
        };

        let submitted = self.submission.grant_id.as_ref();
        let covering: Vec<&StoredGrant> = grants
            .iter()
            .filter(|stored| {
                (stored.settled || Some(&stored.id) == submitted)
                    && stored.grant.account_id() == account_id
                    && stored.grant.client_id() == self.request.client_id
            })
            .collect();

        let mut granted_scopes = BTreeSet::new();
        let mut granted_claims = BTreeSet::new();
        let mut granted_resources: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for StoredGrant { grant, .. } in &covering {
            granted_scopes.extend(grant.oidc_scopes().iter().map(String::as_str));
            granted_claims.extend(grant.oidc_claims().iter().map(String::as_str));
            for (indicator, scopes) in grant.resource_scopes() {
                granted_resources
                    .entry(indicator.as_str())
                    .or_default()
                    .extend(scopes.iter().map(String::as_str));
            }
        }

        let missing_scopes: BTreeSet<String> = self
            .requested_scopes
            .iter()
            .filter(|scope| !granted_scopes.contains(scope.as_str()))
            .cloned()
            .collect();
        let missing_claims: BTreeSet<String> = self
            .request
            .claims
            .iter()
            .filter(|claim| !granted_claims.contains(claim.as_str()))
            .cloned()
            .collect();
        let missing_resource_scopes: BTreeMap<String, BTreeSet<String>> = self
            .requested_resource_scopes
            .iter()
            .filter_map(|(indicator, scopes)| {
                let granted = granted_resources.get(indicator.as_str());
                let missing: BTreeSet<String> = scopes
                    .iter()
                    .filter(|scope| granted.is_none_or(|set| !set.contains(scope.as_str())))
                    .cloned()
                    .collect();
                (!missing.is_empty()).then(|| (indicator.clone(), missing))
            })
            .collect();

        if !missing_scopes.is_empty()
            || !missing_claims.is_empty()
            || !missing_resource_scopes.is_empty()
        {
            self.prompt = PromptKind::Consent;
            self.missing_scopes = missing_scopes;
            self.missing_claims = missing_claims;
            self.missing_resource_scopes = missing_resource_scopes;
            return NextStep::Prompt;
        }

        // Prefer the grant submitted with this interaction.
        let chosen = covering
            .iter()
            .rev()
            .find(|stored| Some(&stored.id) == submitted)
            .or_else(|| covering.last());

        match chosen {
            Some(stored) => NextStep::Complete {
                account_id,
                grant_id: stored.id.clone(),
            },
            // Nothing requested and nothing granted: ask for consent anyway.
            None => {
                self.prompt = PromptKind::Consent;
                self.missing_scopes = self.requested_scopes.clone();
                NextStep::Prompt
            }
        }
    }
}

/// Interaction engine keeping all state in memory.
pub struct InMemoryInteractionEngine {
    config: EngineConfig,
    accounts: Arc<dyn AccountAdapter>,
    clients: HashMap<String, RegisteredClient>,
    interactions: RwLock<HashMap<String, StoredInteraction>>,
    grants: RwLock<Vec<StoredGrant>>,
    issued: RwLock<HashMap<String, IssuedAuthorization>>,
}

impl std::fmt::Debug for InMemoryInteractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryInteractionEngine")
            .field("config", &self.config)
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl InMemoryInteractionEngine {
    /// Creates an engine over an account adapter and a set of clients.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        accounts: Arc<dyn AccountAdapter>,
        clients: Vec<RegisteredClient>,
    ) -> Self {
        Self {
            config,
            accounts,
            clients: clients
                .into_iter()
                .map(|client| (client.client_id.clone(), client))
                .collect(),
            interactions: RwLock::new(HashMap::new()),
            grants: RwLock::new(Vec::new()),
            issued: RwLock::new(HashMap::new()),
        }
    }

    /// Validates an authorization request and opens an interaction at the
    /// `login` prompt. Returns the interaction uid.
    ///
    /// ## Errors
    ///
    /// - `EngineError::UnknownClient` for an unregistered client
    /// - `EngineError::InvalidRedirectUri` for an unregistered redirect URI
    /// - `EngineError::InvalidRequest` for an unsupported response type, a
    ///   missing `openid` scope or an unknown resource indicator
    pub async fn begin_authorization(&self, request: AuthorizationRequest) -> EngineResult<String> {
        let client = self
            .clients
            .get(&request.client_id)
            .ok_or_else(|| EngineError::UnknownClient(request.client_id.clone()))?;

        if !client.allows_redirect_uri(&request.redirect_uri)
            || Url::parse(&request.redirect_uri).is_err()
        {
            return Err(EngineError::InvalidRedirectUri {
                client_id: request.client_id.clone(),
                redirect_uri: request.redirect_uri.clone(),
            });
        }

        if request.response_type != "code" {
            return Err(EngineError::InvalidRequest(format!(
                "unsupported response_type: {}",
                request.response_type
            )));
        }

        let tokens = scope_tokens(&request.scope);
        if !tokens.contains(SCOPE_OPENID) {
            return Err(EngineError::InvalidRequest(
                "openid scope is required".to_string(),
            ));
        }

        let mut resource_servers = Vec::with_capacity(request.resources.len());
        for indicator in &request.resources {
            let accepted = self.config.resource_servers.get(indicator).ok_or_else(|| {
                EngineError::InvalidRequest(format!("unknown resource: {indicator}"))
            })?;
            resource_servers.push((indicator, accepted));
        }

        let mut requested_scopes = BTreeSet::new();
        let mut requested_resource_scopes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for token in tokens {
            if self.config.supported_scopes.contains(token) && client.allows_scope(token) {
                requested_scopes.insert(token.to_string());
                continue;
            }
            // Unrecognised tokens are dropped.
            for (indicator, accepted) in &resource_servers {
                if accepted.contains(token) {
                    requested_resource_scopes
                        .entry((*indicator).clone())
                        .or_default()
                        .insert(token.to_string());
                }
            }
        }

        self.purge_expired().await;

        let uid = Uuid::new_v4().simple().to_string();
        let stored = StoredInteraction {
            requested_scopes,
            requested_resource_scopes,
            prompt: PromptKind::Login,
            missing_scopes: BTreeSet::new(),
            missing_claims: BTreeSet::new(),
            missing_resource_scopes: BTreeMap::new(),
            submission: Submission::default(),
            expires_at: Utc::now() + Duration::seconds(self.config.interaction_ttl_secs),
            request,
        };

        tracing::debug!(uid = %uid, client_id = %stored.request.client_id, "Interaction opened");
        self.interactions.write().await.insert(uid.clone(), stored);

        Ok(uid)
    }

    /// Looks up a completed authorization by its code. Expired codes are
    /// not returned.
    pub async fn issued_authorization(&self, code: &str) -> Option<IssuedAuthorization> {
        self.issued
            .read()
            .await
            .get(code)
            .filter(|issued| !issued.is_expired())
            .cloned()
    }

    /// Gets a persisted grant.
    pub async fn grant(&self, grant_id: &GrantId) -> Option<ConsentGrant> {
        self.grants
            .read()
            .await
            .iter()
            .find(|stored| &stored.id == grant_id)
            .map(|stored| stored.grant.clone())
    }

    /// Resolves the claims released to a completed authorization through the
    /// account adapter, projected from the scope that authorization asked for.
    ///
    /// ## Errors
    ///
    /// Returns the adapter's error if the account is gone.
    pub async fn claims_for(&self, issued: &IssuedAuthorization) -> EngineResult<Claims> {
        Ok(self
            .accounts
            .resolve_claims(&issued.account_id, &issued.scope)
            .await?)
    }

    /// Drops expired interactions and authorization codes. Returns how many
    /// were removed.
    pub async fn purge_expired(&self) -> usize {
        let interactions_removed = {
            let mut interactions = self.interactions.write().await;
            let before = interactions.len();
            interactions.retain(|_, stored| !stored.is_expired());
            before - interactions.len()
        };
        let codes_removed = {
            let mut issued = self.issued.write().await;
            let before = issued.len();
            issued.retain(|_, code| !code.is_expired());
            before - issued.len()
        };

        if interactions_removed > 0 || codes_removed > 0 {
            tracing::debug!(
                interactions = interactions_removed,
                codes = codes_removed,
                "Expired entries purged"
            );
        }
        interactions_removed + codes_removed
    }

    /// Number of live interactions.
    pub async fn interaction_count(&self) -> usize {
        self.interactions.read().await.len()
    }

    async fn issue(
        &self,
        stored: &StoredInteraction,
        account_id: String,
        grant_id: GrantId,
    ) -> EngineResult<String> {
        if let Some(grant) = self
            .grants
            .write()
            .await
            .iter_mut()
            .find(|grant| grant.id == grant_id)
        {
            grant.settled = true;
        }

        let code = Uuid::new_v4().simple().to_string();
        let return_to = client_redirect(
            &stored.request.redirect_uri,
            &[
                ("code", Some(code.as_str())),
                ("state", stored.request.state.as_deref()),
            ],
        )?;

        tracing::info!(
            client_id = %stored.request.client_id,
            account_id = %account_id,
            grant_id = %grant_id,
            "Authorization completed"
        );

        let issued_at = Utc::now();
        let issued = IssuedAuthorization {
            code: code.clone(),
            account_id,
            client_id: stored.request.client_id.clone(),
            grant_id,
            scope: stored
                .requested_scopes
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" "),
            redirect_uri: stored.request.redirect_uri.clone(),
            issued_at,
            expires_at: issued_at + Duration::seconds(self.config.authorization_code_ttl_secs),
        };
        self.issued.write().await.insert(code, issued);

        Ok(return_to)
    }
}

fn client_redirect(redirect_uri: &str, params: &[(&str, Option<&str>)]) -> EngineResult<String> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|e| EngineError::Internal(format!("stored redirect_uri is invalid: {e}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            if let Some(value) = value {
                pairs.append_pair(name, value);
            }
        }
    }
    Ok(url.into())
}

fn live_interaction<'a>(
    interactions: &'a mut HashMap<String, StoredInteraction>,
    uid: &str,
) -> EngineResult<&'a mut StoredInteraction> {
    let expired = interactions
        .get(uid)
        .map(StoredInteraction::is_expired)
        .ok_or_else(|| EngineError::SessionNotFound(uid.to_string()))?;
    if expired {
        interactions.remove(uid);
        return Err(EngineError::SessionExpired(uid.to_string()));
    }
    interactions
        .get_mut(uid)
        .ok_or_else(|| EngineError::SessionNotFound(uid.to_string()))
}

#[async_trait]
impl InteractionEngine for InMemoryInteractionEngine {
    async fn interaction_details(&self, uid: &str) -> EngineResult<InteractionSession> {
        let interactions = self.interactions.read().await;
        let stored = interactions
            .get(uid)
            .ok_or_else(|| EngineError::SessionNotFound(uid.to_string()))?;

        if stored.is_expired() {
            return Err(EngineError::SessionExpired(uid.to_string()));
        }
        Ok(stored.to_session(uid))
    }

    async fn interaction_finished(
        &self,
        uid: &str,
        result: InteractionResult,
        options: FinishOptions,
    ) -> EngineResult<String> {
        // Referenced records must exist before the session changes.
        match &result {
            InteractionResult::Login { account_id } => {
                self.accounts.find_by_id(account_id).await?;
            }
            InteractionResult::Consent { grant_id } => {
                if self.grant(grant_id).await.is_none() {
                    return Err(EngineError::GrantNotFound(grant_id.to_string()));
                }
            }
            InteractionResult::Error { .. } => {}
        }

        let mut interactions = self.interactions.write().await;
        let stored = live_interaction(&mut interactions, uid)?;

        if let InteractionResult::Error {
            error,
            error_description,
        } = &result
        {
            let return_to = client_redirect(
                &stored.request.redirect_uri,
                &[
                    ("error", Some(error.as_str())),
                    ("error_description", error_description.as_deref()),
                    ("state", stored.request.state.as_deref()),
                ],
            )?;
            tracing::debug!(uid = %uid, error = %error, "Interaction finished with error");
            interactions.remove(uid);
            return Ok(return_to);
        }

        if !options.merge_with_last_submission {
            stored.submission = Submission::default();
        }
        stored.submission.record(result);

        let next = {
            let grants = self.grants.read().await;
            stored.resume(&grants)
        };

        match next {
            NextStep::Prompt => {
                tracing::debug!(uid = %uid, prompt = %stored.prompt, "Interaction resumed");
                Ok(interaction_url(uid))
            }
            NextStep::Complete {
                account_id,
                grant_id,
            } => {
                let stored = interactions
                    .remove(uid)
                    .ok_or_else(|| EngineError::SessionNotFound(uid.to_string()))?;
                drop(interactions);
                self.issue(&stored, account_id, grant_id).await
            }
        }
    }

    async fn create_grant(&self, grant: ConsentGrant) -> EngineResult<GrantId> {
        let grant_id = GrantId::generate();
        tracing::debug!(
            grant_id = %grant_id,
            account_id = %grant.account_id(),
            client_id = %grant.client_id(),
            scope = %grant.oidc_scope(),
            "Grant created"
        );
        self.grants.write().await.push(StoredGrant {
            id: grant_id.clone(),
            grant,
            settled: false,
        });
        Ok(grant_id)
    }
}
