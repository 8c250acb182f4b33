//! # idp-server
//!
//! Axum server for the identity provider.
//!
//! This crate provides the HTTP surface combining:
//! - The authorization entry point (`/oidc/auth`) backed by the in-memory engine
//! - Login and consent interactions (`/interaction/{uid}`)
//! - A development callback page for the registered test client
//! - Health check endpoints
//!
//! ## Usage
//!
//! ```ignore
//! use idp_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config)?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod authorize;
pub mod config;
pub mod interaction;
pub mod router;
pub mod state;
pub mod ui;

pub use config::ServerConfig;
pub use router::create_router;
pub use state::AppState;

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// The identity provider server.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Creates a new server instance.
    ///
    /// This provisions the account directory and the interaction engine.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let state = AppState::from_config(config.clone())?;

        tracing::info!(
            client_id = %config.client_id,
            interaction_ttl = config.interaction_ttl,
            "Interaction engine ready"
        );

        Ok(Self { config, state })
    }

    /// Runs the server.
    ///
    /// This starts the HTTP server and blocks until it receives a shutdown signal.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        Ok(TcpListener::bind(addr).await?)
    }

    /// Serves on an already bound listener until `shutdown` completes.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        let app = create_router(self.state);

        tracing::info!("Server listening on http://{}", addr);

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
