//! Roomcast reference server.
//!
//! Newline-delimited text protocol over TCP, built on [`roomcast_core`]. Each
//! accepted socket is registered with the shared [`Registry`] and removed
//! again when it closes; everything in between is a client command executed
//! against the registry.
//!
//! # Components
//!
//! - [`Server`]: listener and accept loop
//! - [`Command`]: parsed client command
//! - [`ServerConfig`]: bind address, line limit, registry limits

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod error;
mod session;

use std::{future::Future, net::SocketAddr, sync::Arc};

pub use command::{Command, ParseError};
pub use error::ServerError;
use roomcast_core::{Registry, RegistryConfig};
use tokio::net::TcpListener;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:7878")
    pub bind_address: String,
    /// Longest accepted command line in bytes; longer lines close the
    /// connection
    pub max_line_length: usize,
    /// Registry limits
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7878".to_string(),
            max_line_length: 4096,
            registry: RegistryConfig::default(),
        }
    }
}

/// Roomcast TCP server.
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
    max_line_length: usize,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ServerError::Config(format!("invalid bind address '{}': {e}", config.bind_address))
        })?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("TCP transport bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            registry: Arc::new(Registry::with_config(config.registry)),
            max_line_length: config.max_line_length,
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared registry backing this server.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Run the accept loop forever.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run the accept loop until `shutdown` resolves.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                },
            };

            tracing::debug!(%peer, "accepted connection");
            let registry = Arc::clone(&self.registry);
            let max_line_length = self.max_line_length;
            tokio::spawn(async move {
                if let Err(e) = session::run(stream, registry, max_line_length).await {
                    tracing::warn!(%peer, "session error: {}", e);
                }
            });
        }

        tracing::info!(connections = self.registry.connection_count(), "Server shutting down");
        Ok(())
    }
}
