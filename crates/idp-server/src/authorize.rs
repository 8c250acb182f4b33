//! Authorization entry point and the development callback page.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use idp_interaction::{
    AuthorizationRequest, IssuedAuthorization, interaction_url, parse_claims_parameter,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ui::{self, CallbackTemplate};

/// Query parameters for authorization request.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    /// Client ID.
    pub client_id: Option<String>,
    /// Redirect URI.
    pub redirect_uri: Option<String>,
    /// Response type.
    pub response_type: Option<String>,
    /// Requested scopes.
    pub scope: Option<String>,
    /// OAuth state.
    pub state: Option<String>,
    /// Resource indicator.
    pub resource: Option<String>,
    /// `claims` request parameter (JSON).
    pub claims: Option<String>,
}

/// Query parameters delivered to the client's redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed state.
    pub state: Option<String>,
    /// OAuth error code.
    pub error: Option<String>,
    /// OAuth error description.
    pub error_description: Option<String>,
}

/// Starts an authorization and sends the browser to the interaction.
pub async fn authorize(State(state): State<AppState>, Query(query): Query<AuthorizeQuery>) -> Response {
    let Some(client_id) = query.client_id else {
        return ui::render_error("invalid_request", Some("Missing client_id parameter"));
    };
    let Some(redirect_uri) = query.redirect_uri else {
        return ui::render_error("invalid_request", Some("Missing redirect_uri parameter"));
    };

    let mut request = AuthorizationRequest::new(
        client_id,
        redirect_uri,
        query.scope.unwrap_or_default(),
    );
    request.response_type = query.response_type.unwrap_or_default();
    request.state = query.state;
    if let Some(resource) = query.resource {
        request = request.with_resource(resource);
    }
    if let Some(claims) = query.claims {
        match parse_claims_parameter(&claims) {
            Ok(names) => request = request.with_claims(names),
            Err(e) => return ui::render_error(e.error_code(), Some(&e.to_string())),
        }
    }

    match state.engine.begin_authorization(request).await {
        Ok(uid) => Redirect::to(&interaction_url(&uid)).into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Authorization request rejected");
            ui::render_error(e.error_code(), Some(&e.to_string()))
        }
    }
}

/// Shows what the development client received.
///
/// For a live code issued by this server, also shows the account and the
/// claims released to that authorization.
pub async fn test_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let issued = match &query.code {
        Some(code) => state.engine.issued_authorization(code).await,
        None => None,
    };

    let claims = match &issued {
        Some(issued) => released_claims(&state, issued).await,
        None => None,
    };

    let status = if query.error.is_some() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    let template = CallbackTemplate {
        code: query.code,
        state: query.state,
        error: query.error,
        error_description: query.error_description,
        account_id: issued.map(|issued| issued.account_id),
        claims,
    };
    ui::render(&template, status)
}

async fn released_claims(state: &AppState, issued: &IssuedAuthorization) -> Option<String> {
    let claims = match state.engine.claims_for(issued).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::error!(grant_id = %issued.grant_id, error = %e, "Failed to resolve claims");
            return None;
        }
    };

    match serde_json::to_string_pretty(&claims) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize claims");
            None
        }
    }
}
