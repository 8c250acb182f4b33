//! Server configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::path::PathBuf;

use anyhow::Context;
use idp_auth::AccountSeed;
use idp_interaction::{EngineConfig, RegisteredClient};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host to bind to.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Base URL for the server (used in generated URLs).
    pub base_url: String,

    /// Interaction lifetime in seconds.
    pub interaction_ttl: i64,

    /// Authorization code lifetime in seconds.
    pub authorization_code_ttl: i64,

    /// CORS allowed origins (comma-separated).
    pub cors_origins: Vec<String>,

    /// JSON file of account seeds. Development accounts are used when unset.
    pub accounts_file: Option<PathBuf>,

    /// Registered client id.
    pub client_id: String,

    /// Registered client redirect URIs.
    pub client_redirect_uris: Vec<String>,

    /// Scopes the registered client may request.
    pub client_scope: String,

    /// Log level.
    pub log_level: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let host = std::env::var("IDP_HOST").unwrap_or(defaults.host);
        let port = std::env::var("IDP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let base_url =
            std::env::var("IDP_BASE_URL").unwrap_or_else(|_| format!("http://{host}:{port}"));

        let interaction_ttl = std::env::var("IDP_INTERACTION_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.interaction_ttl);

        let authorization_code_ttl = std::env::var("IDP_AUTHORIZATION_CODE_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.authorization_code_ttl);

        let cors_origins = std::env::var("IDP_CORS_ORIGINS")
            .map(|s| split_list(&s, ','))
            .unwrap_or(defaults.cors_origins);

        let accounts_file = std::env::var("IDP_ACCOUNTS_FILE").ok().map(PathBuf::from);

        let client_id = std::env::var("IDP_CLIENT_ID").unwrap_or(defaults.client_id);

        let client_redirect_uris = std::env::var("IDP_CLIENT_REDIRECT_URIS")
            .map(|s| split_list(&s, ','))
            .unwrap_or(defaults.client_redirect_uris);

        let client_scope = std::env::var("IDP_CLIENT_SCOPE").unwrap_or(defaults.client_scope);

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        if interaction_ttl <= 0 {
            anyhow::bail!("IDP_INTERACTION_TTL must be positive, got {interaction_ttl}");
        }
        if authorization_code_ttl <= 0 {
            anyhow::bail!(
                "IDP_AUTHORIZATION_CODE_TTL must be positive, got {authorization_code_ttl}"
            );
        }

        Ok(Self {
            host,
            port,
            base_url,
            interaction_ttl,
            authorization_code_ttl,
            cors_origins,
            accounts_file,
            client_id,
            client_redirect_uris,
            client_scope,
            log_level,
        })
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
            log_level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// The client registration served by this provider.
    #[must_use]
    pub fn registered_client(&self) -> RegisteredClient {
        RegisteredClient::new(
            self.client_id.clone(),
            self.client_redirect_uris.clone(),
            self.client_scope.clone(),
        )
    }

    /// Settings for the interaction engine.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_interaction_ttl(self.interaction_ttl)
            .with_authorization_code_ttl(self.authorization_code_ttl)
    }

    /// Loads the account seeds, from the accounts file when one is set.
    pub fn account_seeds(&self) -> anyhow::Result<Vec<AccountSeed>> {
        let Some(path) = &self.accounts_file else {
            return Ok(AccountSeed::development());
        };

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read accounts file {}", path.display()))?;
        let seeds = AccountSeed::from_json(&json)
            .with_context(|| format!("invalid accounts file {}", path.display()))?;

        Ok(seeds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let client = RegisteredClient::development();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            interaction_ttl: 3600, // 1 hour
            authorization_code_ttl: 600,
            cors_origins: vec!["*".to_string()],
            accounts_file: None,
            client_id: client.client_id,
            client_redirect_uris: client.redirect_uris,
            client_scope: client.scope,
            log_level: "info".to_string(),
        }
    }
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_register_the_test_client() {
        let config = ServerConfig::default();
        let client = config.registered_client();

        assert_eq!(client.client_id, "test-client");
        assert!(client.allows_redirect_uri("http://localhost:3000/oidc/test/callback"));
        assert!(client.allows_scope("email"));
        assert_eq!(config.interaction_ttl, 3600);

        let engine = config.engine_config();
        assert_eq!(engine.interaction_ttl_secs, 3600);
        assert_eq!(engine.authorization_code_ttl_secs, 600);
    }

    #[test]
    fn testing_config_binds_ephemeral_port() {
        let config = ServerConfig::for_testing();
        assert_eq!(config.port, 0);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn lists_are_trimmed() {
        assert_eq!(
            split_list(" http://a/cb, http://b/cb ,", ','),
            vec!["http://a/cb".to_string(), "http://b/cb".to_string()]
        );
    }

    #[test]
    fn development_seeds_without_accounts_file() {
        let seeds = ServerConfig::default().account_seeds().unwrap();
        assert_eq!(seeds.len(), 3);
    }

    #[test]
    fn missing_accounts_file_is_an_error() {
        let config = ServerConfig {
            accounts_file: Some(PathBuf::from("/nonexistent/accounts.json")),
            ..ServerConfig::default()
        };
        assert!(config.account_seeds().is_err());
    }
}
