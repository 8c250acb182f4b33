//! Login, consent and error views.
//!
//! Templates are pure views; handlers decide what to show.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use idp_interaction::FailureReason;

/// Scope information for consent screen.
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    /// Scope name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

/// Resource server access shown on the consent screen.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    /// Resource indicator.
    pub indicator: String,
    /// Space-delimited scopes.
    pub scope: String,
}

/// Login page template.
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    /// Form action URL.
    pub action_url: String,
    /// Error message to display.
    pub error: Option<String>,
}

/// Consent page template.
#[derive(Template)]
#[template(path = "consent.html")]
pub struct ConsentTemplate {
    /// Client asking for access.
    pub client_id: String,
    /// Requested OIDC scopes.
    pub scopes: Vec<ScopeInfo>,
    /// Individually requested claims.
    pub claims: Vec<String>,
    /// Requested resource server access.
    pub resources: Vec<ResourceInfo>,
    /// Confirm form action.
    pub confirm_url: String,
    /// Reject form action.
    pub reject_url: String,
}

/// Error page template.
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    /// Error code.
    pub error: String,
    /// Error description.
    pub error_description: Option<String>,
}

/// Development callback page template.
#[derive(Template)]
#[template(path = "callback.html")]
pub struct CallbackTemplate {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed state.
    pub state: Option<String>,
    /// OAuth error code.
    pub error: Option<String>,
    /// OAuth error description.
    pub error_description: Option<String>,
    /// Account the code was issued for.
    pub account_id: Option<String>,
    /// Claims released under the grant, pretty-printed JSON.
    pub claims: Option<String>,
}

/// Renders a template with a status code.
pub fn render<T: Template>(template: &T, status: StatusCode) -> Response {
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Template render error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

/// Renders an error page.
pub fn render_error(error: &str, error_description: Option<&str>) -> Response {
    let template = ErrorTemplate {
        error: error.to_string(),
        error_description: error_description.map(String::from),
    };
    render(&template, StatusCode::BAD_REQUEST)
}

/// User-facing message for an error code from a query string.
#[must_use]
pub fn failure_message(code: &str) -> String {
    FailureReason::from_code(code).map_or_else(
        || format!("An error occurred: {code}"),
        |reason| reason.message().to_string(),
    )
}

/// Converts scopes to display information.
#[must_use]
pub fn scopes_to_info<'a>(scopes: impl IntoIterator<Item = &'a str>) -> Vec<ScopeInfo> {
    scopes
        .into_iter()
        .filter_map(|s| {
            let description = match s {
                "openid" => "Verify your identity",
                "profile" => "Access your basic profile information (name, picture)",
                "email" => "Access your email address and verification status",
                "phone" => "Access your phone number",
                "address" => "Access your address",
                "offline_access" => "Access your data when you're not using the app",
                _ => return None,
            };
            Some(ScopeInfo {
                name: s.to_string(),
                description: description.to_string(),
            })
        })
        .collect()
}
