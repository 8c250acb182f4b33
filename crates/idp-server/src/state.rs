//! Application state management.
//!
//! This module defines the shared state that is passed to all request handlers.

use std::sync::Arc;

use idp_auth::{AccountAdapter, AccountDirectory, InMemoryAccountDirectory};
use idp_interaction::{InMemoryInteractionEngine, InteractionEngine, InteractionResolver};

use crate::config::ServerConfig;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: ServerConfig,

    /// Protocol engine holding interaction sessions and grants.
    pub engine: Arc<InMemoryInteractionEngine>,

    /// Login and consent driver.
    pub resolver: InteractionResolver,
}

impl AppState {
    /// Wires the engine and resolver around a provisioned directory.
    ///
    /// The directory is handed to the engine as its account adapter and to
    /// the resolver for authentication.
    pub fn new(config: ServerConfig, directory: Arc<InMemoryAccountDirectory>) -> Self {
        let adapter: Arc<dyn AccountAdapter> = directory.clone();
        let engine = Arc::new(InMemoryInteractionEngine::new(
            config.engine_config(),
            adapter,
            vec![config.registered_client()],
        ));

        let authenticator: Arc<dyn AccountDirectory> = directory;
        let protocol: Arc<dyn InteractionEngine> = engine.clone();
        let resolver = InteractionResolver::new(protocol, authenticator);

        Self {
            config,
            engine,
            resolver,
        }
    }

    /// Provisions the account directory from configuration and builds the state.
    pub fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        let seeds = config.account_seeds()?;
        let directory = InMemoryAccountDirectory::from_seeds(seeds)?;
        Ok(Self::new(config, Arc::new(directory)))
    }
}
