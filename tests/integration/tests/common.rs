//! Common test utilities and fixtures.

use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, Response, Url};
use tokio::sync::oneshot;
use tokio::time::sleep;

use idp_server::{Server, ServerConfig};

/// Redirect URI registered for the test client.
pub const CALLBACK: &str = "http://localhost:3000/oidc/test/callback";

/// Test environment running a server on an ephemeral port.
pub struct TestEnv {
    /// Base URL of the running server.
    pub base_url: String,
    /// HTTP client for testing. Redirects are not followed.
    pub client: Client,
    /// Server shutdown signal.
    _shutdown_tx: oneshot::Sender<()>,
}

impl TestEnv {
    /// Starts a server with the testing configuration.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(ServerConfig::for_testing()).await
    }

    /// Starts a server with a custom configuration.
    pub async fn with_config(config: ServerConfig) -> anyhow::Result<Self> {
        // Initialize tracing for tests
        let _ = tracing_subscriber::fmt()
            .with_env_filter("idp_server=debug,idp_interaction=debug,idp_auth=debug")
            .try_init();

        let server = Server::new(config)?;
        let listener = server.bind().await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        // Create shutdown channel
        let (_shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = server.serve(listener, shutdown).await {
                tracing::error!("Server error: {}", e);
            }
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(Policy::none())
            .build()?;

        wait_for_server(&client, &base_url).await?;

        Ok(Self {
            base_url,
            client,
            _shutdown_tx,
        })
    }

    /// Absolute URL for a server path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a GET without following redirects.
    pub async fn get(&self, path: &str) -> anyhow::Result<Response> {
        Ok(self.client.get(self.url(path)).send().await?)
    }

    /// Sends an empty form POST without following redirects.
    pub async fn post(&self, path: &str) -> anyhow::Result<Response> {
        Ok(self
            .client
            .post(self.url(path))
            .form(&[] as &[(&str, &str)])
            .send()
            .await?)
    }

    /// Starts an authorization for the test client and returns the
    /// interaction path the server redirected to.
    pub async fn authorize(&self, scope: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .get(self.url("/oidc/auth"))
            .query(&[
                ("client_id", "test-client"),
                ("redirect_uri", CALLBACK),
                ("response_type", "code"),
                ("scope", scope),
                ("state", "xyz"),
            ])
            .send()
            .await?;

        anyhow::ensure!(
            response.status().is_redirection(),
            "authorization was not redirected: {}",
            response.status()
        );
        location(&response)
    }

    /// Submits the login form of an interaction.
    pub async fn login(
        &self,
        interaction: &str,
        login: &str,
        password: &str,
    ) -> anyhow::Result<Response> {
        Ok(self
            .client
            .post(self.url(interaction))
            .form(&[("login", login), ("password", password)])
            .send()
            .await?)
    }
}

/// Reads the `Location` header of a redirect.
pub fn location(response: &Response) -> anyhow::Result<String> {
    let value = response
        .headers()
        .get(reqwest::header::LOCATION)
        .ok_or_else(|| anyhow::anyhow!("no Location header (status {})", response.status()))?;
    Ok(value.to_str()?.to_string())
}

/// Reads a query parameter from an absolute URL.
pub fn query_param(url: &str, name: &str) -> anyhow::Result<Option<String>> {
    let url = Url::parse(url)?;
    Ok(url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned()))
}

/// Waits for the server to be ready.
async fn wait_for_server(client: &Client, base_url: &str) -> anyhow::Result<()> {
    let health_url = format!("{}/health", base_url);
    let max_attempts = 50;

    for attempt in 1..=max_attempts {
        match client.get(&health_url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Server ready after {} attempts", attempt);
                return Ok(());
            }
            Ok(response) => {
                tracing::debug!(
                    "Server not ready (status {}), attempt {}/{}",
                    response.status(),
                    attempt,
                    max_attempts
                );
            }
            Err(e) => {
                tracing::debug!(
                    "Server not ready ({}), attempt {}/{}",
                    e,
                    attempt,
                    max_attempts
                );
            }
        }
        sleep(Duration::from_millis(100)).await;
    }

    anyhow::bail!("Server did not become ready in time")
}
