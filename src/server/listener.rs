//! Relay server
//!
//! Binds the HTTP/WebSocket front door, the optional raw pipe listener and
//! the segment sweeper, and tears every room down on shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::error::Result;
use crate::registry::{RegistryConfig, RoomRegistry};
use crate::segments::Sweeper;
use crate::server::config::ServerConfig;
use crate::server::raw;
use crate::server::routes::{self, AppState};

/// Relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    state: AppState,
}

impl RelayServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        let registry = Arc::new(RoomRegistry::with_config(registry_config));
        let state = AppState::new(Arc::clone(&registry), config.clone());

        Self {
            config,
            registry,
            state,
        }
    }

    /// Get a reference to the room registry
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// The HTTP router, for embedding or in-process tests
    pub fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay server listening");

        let sweeper_handle = Sweeper::new(
            self.registry.config().worker.base_path.clone(),
            self.config.retention,
            self.config.sweep_interval,
        )
        .spawn();

        let raw_handle = match self.config.raw_ingest_addr {
            Some(raw_addr) => {
                let raw_listener = TcpListener::bind(raw_addr).await?;
                tracing::info!(addr = %raw_addr, "Raw ingest listening");
                Some(tokio::spawn(raw::accept_loop(raw_listener, self.state.clone())))
            }
            None => None,
        };

        // Close rooms as soon as shutdown starts so live subscriber bodies end
        // and in-flight requests can finish
        let registry = Arc::clone(&self.registry);
        let shutdown = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            registry.close_all().await;
        };

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        // Stop background tasks on shutdown
        sweeper_handle.abort();
        if let Some(handle) = raw_handle {
            handle.abort();
        }
        self.registry.close_all().await;

        result?;
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
