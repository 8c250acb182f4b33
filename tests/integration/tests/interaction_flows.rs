//! Login and consent flow integration tests.

use reqwest::StatusCode;

use crate::common::{CALLBACK, TestEnv, location, query_param};

fn path_and_query(url: &str) -> anyhow::Result<String> {
    let url = reqwest::Url::parse(url)?;
    Ok(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}

/// Walks an authorization from the entry point to the client callback.
#[tokio::test]
async fn test_login_and_consent_issue_code() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let interaction = env.authorize("openid profile email").await?;
    assert!(interaction.starts_with("/interaction/"));

    // The pending prompt is login
    let response = env.get(&interaction).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let login_view = location(&response)?;
    assert_eq!(login_view, format!("{interaction}/login"));

    let response = env.get(&login_view).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await?.contains("Sign In"));

    // Login resumes the same interaction at the consent prompt
    let response = env.login(&interaction, "admin", "admin123").await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response)?, interaction);

    let response = env.get(&interaction).await?;
    let consent_view = location(&response)?;
    assert_eq!(consent_view, format!("{interaction}/consent"));

    let response = env.get(&consent_view).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await?;
    assert!(html.contains("test-client"));
    assert!(html.contains("Verify your identity"));

    // Consent completes the authorization
    let response = env.post(&format!("{interaction}/confirm")).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let callback = location(&response)?;
    assert!(callback.starts_with(CALLBACK), "unexpected redirect {callback}");
    assert_eq!(query_param(&callback, "state")?.as_deref(), Some("xyz"));
    assert!(query_param(&callback, "code")?.is_some());

    // The development callback page shows who the code was issued for
    let response = env.get(&path_and_query(&callback)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await?;
    assert!(html.contains("admin789"));
    assert!(html.contains("admin@example.com"));

    // The interaction is consumed
    let response = env.get(&interaction).await?;
    assert!(location(&response)?.ends_with("/error?error=invalid_session"));

    Ok(())
}

/// A second authorization for the same account and client skips consent.
#[tokio::test]
async fn test_prior_consent_is_remembered() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let first = env.authorize("openid email").await?;
    env.login(&first, "john.doe", "password123").await?;
    let response = env.post(&format!("{first}/confirm")).await?;
    assert!(location(&response)?.starts_with(CALLBACK));

    let second = env.authorize("openid email").await?;
    let response = env.login(&second, "john.doe@example.com", "password123").await?;
    let callback = location(&response)?;
    assert!(callback.starts_with(CALLBACK), "unexpected redirect {callback}");
    assert!(query_param(&callback, "code")?.is_some());

    Ok(())
}

/// Remembered consent does not widen what a narrower request receives.
#[tokio::test]
async fn test_remembered_consent_releases_requested_claims_only() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let first = env.authorize("openid profile email").await?;
    env.login(&first, "admin", "admin123").await?;
    env.post(&format!("{first}/confirm")).await?;

    let second = env.authorize("openid").await?;
    let response = env.login(&second, "admin", "admin123").await?;
    let callback = location(&response)?;
    assert!(callback.starts_with(CALLBACK), "unexpected redirect {callback}");

    let html = env.get(&path_and_query(&callback)?).await?.text().await?;
    assert!(html.contains("admin789"));
    assert!(!html.contains("admin@example.com"));
    assert!(!html.contains("Administrator"));

    Ok(())
}

#[tokio::test]
async fn test_invalid_credentials_return_to_login()-> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let interaction = env.authorize("openid").await?;

    for (login, password) in [("admin", "wrong"), ("nobody", "admin123")] {
        let response = env.login(&interaction, login, password).await?;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response)?,
            format!("{interaction}/login?error=invalid_credentials")
        );
    }

    let response = env
        .get(&format!("{interaction}/login?error=invalid_credentials"))
        .await?;
    assert!(
        response
            .text()
            .await?
            .contains("Invalid username or password. Please try again.")
    );

    // The interaction is still usable
    let response = env.login(&interaction, "admin", "admin123").await?;
    assert_eq!(location(&response)?, interaction);

    Ok(())
}

#[tokio::test]
async fn test_missing_credentials_return_to_login() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let interaction = env.authorize("openid").await?;

    let response = env.login(&interaction, "admin", "").await?;
    assert_eq!(
        location(&response)?,
        format!("{interaction}/login?error=missing_credentials")
    );

    let response = env.post(&interaction).await?;
    assert_eq!(
        location(&response)?,
        format!("{interaction}/login?error=missing_credentials")
    );

    Ok(())
}

#[tokio::test]
async fn test_unknown_interaction_is_invalid_session() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.get("/interaction/does-not-exist").await?;
    assert_eq!(
        location(&response)?,
        "/interaction/does-not-exist/error?error=invalid_session"
    );

    let response = env.login("/interaction/does-not-exist", "admin", "admin123").await?;
    assert_eq!(
        location(&response)?,
        "/interaction/does-not-exist/error?error=invalid_session"
    );

    let response = env
        .get("/interaction/does-not-exist/error?error=invalid_session")
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await?.contains("Invalid or expired interaction session"));

    Ok(())
}

#[tokio::test]
async fn test_consent_before_login_is_unknown_prompt() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let interaction = env.authorize("openid").await?;

    let response = env.post(&format!("{interaction}/confirm")).await?;
    assert_eq!(
        location(&response)?,
        format!("{interaction}/error?error=unknown_prompt")
    );

    // Consent view sends the browser back to login
    let response = env.get(&format!("{interaction}/consent")).await?;
    assert_eq!(location(&response)?, format!("{interaction}/login"));

    Ok(())
}

#[tokio::test]
async fn test_reject_redirects_to_client_with_access_denied() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let interaction = env.authorize("openid profile").await?;
    env.login(&interaction, "jane.smith", "password456").await?;

    let response = env.post(&format!("{interaction}/reject")).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let callback = location(&response)?;
    assert!(callback.starts_with(CALLBACK));
    assert_eq!(query_param(&callback, "error")?.as_deref(), Some("access_denied"));
    assert_eq!(query_param(&callback, "state")?.as_deref(), Some("xyz"));

    let response = env.get(&path_and_query(&callback)?).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await?.contains("access_denied"));

    Ok(())
}

#[tokio::test]
async fn test_invalid_authorization_requests_render_errors() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.get("/oidc/auth?response_type=code&scope=openid").await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = env
        .client
        .get(env.url("/oidc/auth"))
        .query(&[
            ("client_id", "test-client"),
            ("redirect_uri", "http://evil.example.com/cb"),
            ("response_type", "code"),
            ("scope", "openid"),
        ])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await?.contains("invalid_request"));

    let response = env
        .client
        .get(env.url("/oidc/auth"))
        .query(&[
            ("client_id", "test-client"),
            ("redirect_uri", CALLBACK),
            ("response_type", "code"),
            ("scope", "openid"),
            ("claims", "not json"),
        ])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}
