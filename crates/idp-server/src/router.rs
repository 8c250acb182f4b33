//! Router configuration.
//!
//! This module creates the main Axum router that combines all endpoints.

use axum::{
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authorize;
use crate::interaction;
use crate::state::AppState;

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    // Authorization entry point and the development client
    let oidc = Router::new()
        .route("/oidc/auth", get(authorize::authorize))
        .route("/oidc/test/callback", get(authorize::test_callback))
        .with_state(state.clone());

    // Login and consent interactions
    let interactions = Router::new()
        .route(
            "/interaction/{uid}",
            get(interaction::show).post(interaction::login_submit),
        )
        .route("/interaction/{uid}/login", get(interaction::login_page))
        .route("/interaction/{uid}/consent", get(interaction::consent_page))
        .route("/interaction/{uid}/error", get(interaction::error_page))
        .route("/interaction/{uid}/confirm", post(interaction::confirm))
        .route("/interaction/{uid}/reject", post(interaction::reject))
        .with_state(state.clone());

    // Create health check routes
    let health = Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check));

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(oidc)
        .merge(interactions)
        .merge(health)
        .route("/", get(root))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Root endpoint handler.
async fn root() -> Json<ServerInfo> {
    Json(ServerInfo {
        name: "Identity Provider".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        authorization_endpoint: "/oidc/auth".to_string(),
    })
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

/// Server information response.
#[derive(Serialize)]
pub struct ServerInfo {
    name: String,
    version: String,
    authorization_endpoint: String,
}

/// Basic health check.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    })
}

/// Kubernetes liveness probe.
async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe.
///
/// State is in memory and provisioned before the listener binds.
async fn readiness_check() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, header};
    use idp_auth::{AccountSeed, InMemoryAccountDirectory, PasswordHasherService, PasswordPolicy};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;

    fn app() -> Router {
        let directory = InMemoryAccountDirectory::from_seeds_with(
            AccountSeed::development(),
            PasswordHasherService::new(PasswordPolicy::for_testing()),
        )
        .unwrap();
        create_router(AppState::new(ServerConfig::for_testing(), Arc::new(directory)))
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.0.status, "healthy");
    }

    #[tokio::test]
    async fn health_routes_respond() {
        let app = app();
        for uri in ["/health", "/health/live", "/health/ready", "/"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn unknown_interaction_redirects_to_error_view() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/interaction/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/interaction/unknown/error?error=invalid_session"
        );
    }

    #[tokio::test]
    async fn authorize_opens_an_interaction() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri(
                        "/oidc/auth?client_id=test-client\
                         &redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Foidc%2Ftest%2Fcallback\
                         &response_type=code&scope=openid%20email&state=xyz",
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/interaction/"));
    }

    #[tokio::test]
    async fn authorize_rejects_unknown_client() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/oidc/auth?client_id=nope&redirect_uri=http%3A%2F%2Fa&response_type=code&scope=openid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
