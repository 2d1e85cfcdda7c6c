//! TCP server for the KnightChat relay.
//!
//! The server:
//! - Listens on a TCP port for client connections
//! - Spawns a ConnectionHandler for each client
//! - Keeps accepting while sessions run concurrently
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │  (per client)   │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │
//!         │ Dispatcher::broadcast
//!         ▼
//! ┌─────────────────┐
//! │ Active sessions │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod broadcast;
mod codec;
mod connection;
mod output;

pub use broadcast::{BroadcastReport, Dispatcher};
pub use connection::{ConnectionError, ConnectionHandler};
pub use output::SessionOutput;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kchat_core::{ChatName, SessionId};

use crate::config::ServerConfig;
use crate::registry::RegistryHandle;

/// Slack on top of the write-bound part of the shutdown grace period
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(5);

/// Writes a session can be inside when shutdown starts: one in-flight
/// broadcast, the departure broadcast and the final close.
const WRITES_PER_TEARDOWN: u32 = 3;

/// TCP server for the chat relay.
///
/// Owns the accept loop and the set of running session tasks.
pub struct ChatServer {
    /// Listen address and per-connection limits
    config: ServerConfig,

    /// Handle to the name registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating session ids
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Creates a new chat server.
    ///
    /// # Arguments
    ///
    /// * `config` - Listen address and connection limits
    /// * `registry` - Handle to the name registry
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(
        config: ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// How long shutdown waits for sessions before aborting them.
    ///
    /// Broadcasts write to all recipients concurrently, so each write step
    /// of a teardown is bounded by one write timeout.
    pub fn shutdown_grace(&self) -> Duration {
        self.config.write_timeout() * WRITES_PER_TEARDOWN + SHUTDOWN_MARGIN
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.listen_addr();
        info!(
            port = self.config.port,
            "Starting KnightChat server on port {}...",
            self.config.port
        );

        TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })
    }

    /// Runs the server.
    ///
    /// Binds, then accepts connections until the cancellation token is
    /// triggered. This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on an already bound listener.
    ///
    /// On cancellation the listener is dropped, every session is torn down
    /// and awaited, then the function returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))?;
        info!(addr = %local_addr, "KnightChat server successfully started");

        let mut sessions: JoinSet<Option<ChatName>> = JoinSet::new();

        loop {
            tokio::select! {
                // Check for cancellation
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                // Accept new connection
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            self.handle_connection(&mut sessions, stream, peer);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }

                // Reap finished sessions
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session_exit(joined);
                }
            }
        }

        drop(listener);
        self.shutdown(sessions).await;
        Ok(())
    }

    /// Spawns a handler task for a new client connection.
    fn handle_connection(
        &self,
        sessions: &mut JoinSet<Option<ChatName>>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        let session_id =
            SessionId::new(self.connection_counter.fetch_add(1, Ordering::Relaxed));
        debug!(session_id = %session_id, peer = %peer, "Accepted connection");

        if let Err(e) = stream.set_nodelay(true) {
            debug!(session_id = %session_id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            session_id,
            reader,
            writer,
            self.registry.clone(),
            &self.config,
            self.cancel_token.child_token(),
        );

        sessions.spawn(handler.run());
    }

    /// Waits for every session to tear down after cancellation.
    async fn shutdown(&self, mut sessions: JoinSet<Option<ChatName>>) {
        let remaining = sessions.len();
        if remaining > 0 {
            debug!(sessions = remaining, "Waiting for sessions to close");
        }

        let drained = tokio::time::timeout(self.shutdown_grace(), async {
            while let Some(joined) = sessions.join_next().await {
                log_session_exit(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                sessions = sessions.len(),
                "Sessions did not close in time, aborting"
            );
            sessions.abort_all();
        }

        self.registry.clear_outputs().await;
        info!("KnightChat server stopped");
    }
}

fn log_session_exit(joined: Result<Option<ChatName>, tokio::task::JoinError>) {
    match joined {
        Ok(Some(name)) => debug!(name = %name, "Session finished"),
        Ok(None) => debug!("Unnamed session finished"),
        Err(e) => warn!(error = %e, "Session task failed"),
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Cannot listen on {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),
}
