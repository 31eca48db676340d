//! Accept loop.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Give each one an id and its own protocol task
//! - On shutdown, stop accepting and wait for open connections to drain

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::server::handler::RequestHandler;
use crate::server::protocol::{serve_connection, ServerContext};

/// HTTP/1.1 server over a TCP listener.
pub struct HttpServer {
    listener: Listener,
    context: Arc<ServerContext>,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Bind `config.bind_address` and serve requests with `handler`.
    pub async fn bind(
        config: &ServerConfig,
        handler: Arc<dyn RequestHandler>,
        shutdown: Shutdown,
    ) -> Result<Self, ListenerError> {
        let listener = Listener::bind(config).await?;
        let context = Arc::new(ServerContext::new(config, handler));
        Ok(Self::new(listener, context, shutdown))
    }

    pub fn new(listener: Listener, context: Arc<ServerContext>, shutdown: Shutdown) -> Self {
        Self {
            listener,
            context,
            tracker: ConnectionTracker::new(),
            shutdown,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Run until shutdown is triggered and every connection has closed.
    pub async fn run(self) -> Result<(), ListenerError> {
        let addr = self.listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut signal = self.shutdown.subscribe();
        loop {
            let accepted = tokio::select! {
                _ = signal.recv() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr, permit)) => {
                    let guard = self.tracker.track();
                    let id = guard.id();
                    let context = self.context.clone();
                    let connection_shutdown = self.shutdown.subscribe();
                    tracing::debug!(connection_id = %id, peer_addr = %peer_addr, "Serving connection");

                    tokio::spawn(async move {
                        let _permit = permit;
                        let _guard = guard;
                        serve_connection(stream, context, connection_shutdown, id).await;
                    });
                }
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                }
                Err(e) => return Err(e),
            }
        }

        drop(self.listener);
        tracing::info!(
            active_connections = self.tracker.active_count(),
            "HTTP server draining connections"
        );
        self.tracker.wait_idle().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
