//! Interaction endpoints.
//!
//! `/interaction/{uid}` is where the engine sends the browser. The handlers
//! here translate resolver outcomes into redirects: login form failures go
//! back to the login page, other failures go to the error page, and
//! `access_denied` follows the engine's redirect to the client.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use idp_interaction::{Failure, FailureReason, InteractionState, Resolution};
use serde::Deserialize;

use crate::state::AppState;
use crate::ui::{self, ConsentTemplate, ErrorTemplate, LoginTemplate, ResourceInfo};

/// Query carrying an error code back to a view.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorQuery {
    /// Error code.
    pub error: Option<String>,
}

/// Login form fields. Missing fields read as empty.
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    /// Login name or email.
    #[serde(default)]
    pub login: String,
    /// Password.
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    LoginForm,
    Consent,
}

fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn view_path(uid: &str, view: &str) -> String {
    format!("/interaction/{}/{view}", encode(uid))
}

fn failure_path(uid: &str, reason: FailureReason, surface: Surface) -> String {
    let back_to_login = surface == Surface::LoginForm
        && matches!(
            reason,
            FailureReason::MissingCredentials
                | FailureReason::InvalidCredentials
                | FailureReason::ServerError
        );
    let view = if back_to_login { "login" } else { "error" };
    format!("{}?error={}", view_path(uid, view), reason.code())
}

fn failure_redirect(uid: &str, failure: Failure, surface: Surface) -> Response {
    if failure.reason == FailureReason::AccessDenied {
        if let Some(return_to) = failure.return_to {
            return Redirect::to(&return_to).into_response();
        }
    }
    Redirect::to(&failure_path(uid, failure.reason, surface)).into_response()
}

fn resolution_redirect(uid: &str, resolution: Resolution, surface: Surface) -> Response {
    match resolution {
        Resolution::Resolved { return_to } => Redirect::to(&return_to).into_response(),
        Resolution::Failed(failure) => failure_redirect(uid, failure, surface),
    }
}

/// Sends the browser to the view for the pending prompt.
pub async fn show(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    let target = match state.resolver.inspect(&uid).await {
        InteractionState::AwaitingLogin(_) => view_path(&uid, "login"),
        InteractionState::AwaitingConsent(_) => view_path(&uid, "consent"),
        InteractionState::Failed(reason) => failure_path(&uid, reason, Surface::Consent),
    };
    Redirect::to(&target).into_response()
}

/// Shows the login page.
pub async fn login_page(Path(uid): Path<String>, Query(query): Query<ErrorQuery>) -> Response {
    let template = LoginTemplate {
        action_url: format!("/interaction/{}", encode(&uid)),
        error: query.error.as_deref().map(ui::failure_message),
    };
    ui::render(&template, StatusCode::OK)
}

/// Handles login form submission.
pub async fn login_submit(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Form(form): Form<LoginForm>,
) -> Response {
    let resolution = state
        .resolver
        .submit_login(&uid, &form.login, &form.password)
        .await;
    resolution_redirect(&uid, resolution, Surface::LoginForm)
}

/// Shows the consent page for what the engine reports as missing.
pub async fn consent_page(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    let pending = match state.resolver.inspect(&uid).await {
        InteractionState::AwaitingConsent(pending) => pending,
        InteractionState::AwaitingLogin(_) => {
            return Redirect::to(&view_path(&uid, "login")).into_response();
        }
        InteractionState::Failed(reason) => {
            return Redirect::to(&failure_path(&uid, reason, Surface::Consent)).into_response();
        }
    };

    let session = pending.session();
    let template = ConsentTemplate {
        client_id: session.client_id.clone(),
        scopes: ui::scopes_to_info(session.missing_scopes.iter().map(String::as_str)),
        claims: session.missing_claims.iter().cloned().collect(),
        resources: session
            .missing_resource_scopes
            .iter()
            .map(|(indicator, scopes)| ResourceInfo {
                indicator: indicator.clone(),
                scope: scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" "),
            })
            .collect(),
        confirm_url: view_path(&uid, "confirm"),
        reject_url: view_path(&uid, "reject"),
    };
    ui::render(&template, StatusCode::OK)
}

/// Shows the error page.
pub async fn error_page(Path(_uid): Path<String>, Query(query): Query<ErrorQuery>) -> Response {
    let code = query
        .error
        .unwrap_or_else(|| FailureReason::ServerError.code().to_string());
    let template = ErrorTemplate {
        error_description: Some(ui::failure_message(&code)),
        error: code,
    };
    ui::render(&template, StatusCode::BAD_REQUEST)
}

/// Confirms consent.
pub async fn confirm(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    let resolution = state.resolver.confirm_consent(&uid).await;
    resolution_redirect(&uid, resolution, Surface::Consent)
}

/// Rejects consent.
pub async fn reject(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    let resolution = state.resolver.reject_consent(&uid).await;
    resolution_redirect(&uid, resolution, Surface::Consent)
}
