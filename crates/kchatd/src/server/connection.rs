//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Negotiates a unique display name through the registry
//! - Classifies incoming lines as commands or chat
//! - Broadcasts chat to every active session
//! - Tears the session down exactly once, whatever ended it
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kchat_core::{ChatName, DomainError, Session, SessionId, SessionState};
use kchat_protocol::{ClientCommand, ClientLine, ServerMessage};

use super::broadcast::Dispatcher;
use super::codec::ChatLineCodec;
use super::output::SessionOutput;
use crate::config::ServerConfig;
use crate::registry::{RegistryError, RegistryHandle};

/// Connection handler for a single client.
///
/// Drives the session state machine:
///
/// ```text
/// Connected ─▶ NegotiatingName ─▶ Active ─▶ Closed
/// ```
///
/// Every path out of [`run`](Self::run) goes through teardown, which
/// removes the output, announces the departure, releases the name and
/// closes the connection.
pub struct ConnectionHandler<R> {
    /// Identity, name and lifecycle state
    session: Session,

    /// Newline-framed input
    lines: FramedRead<R, ChatLineCodec>,

    /// Output endpoint (shared with broadcasters once registered)
    output: SessionOutput,

    /// Handle to the name registry
    registry: RegistryHandle,

    /// Fan-out to active sessions
    dispatcher: Dispatcher,

    /// Cancelled on server shutdown
    cancel_token: CancellationToken,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Unique id for this connection
    /// * `reader` - Read half of the client stream
    /// * `writer` - Write half of the client stream
    /// * `registry` - Handle to the name registry
    /// * `config` - Line length and write timeout limits
    /// * `cancel_token` - Token cancelled on server shutdown
    pub fn new<W>(
        session_id: SessionId,
        reader: R,
        writer: W,
        registry: RegistryHandle,
        config: &ServerConfig,
        cancel_token: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            session: Session::new(session_id),
            lines: FramedRead::new(reader, ChatLineCodec::new(config.max_line_length)),
            output: SessionOutput::new(writer, config.write_timeout()),
            dispatcher: Dispatcher::new(registry.clone()),
            registry,
            cancel_token,
        }
    }

    /// Runs the connection handler.
    ///
    /// Negotiates a name, then processes lines until the connection ends.
    /// Returns the name the session held, if it got that far.
    pub async fn run(mut self) -> Option<ChatName> {
        let session_id = self.session.id();
        debug!(session_id = %session_id, "New client connected");

        match self.serve().await {
            Ok(()) | Err(ConnectionError::Eof) => {
                debug!(session_id = %session_id, "Client sent EOF");
            }
            Err(ConnectionError::Shutdown) => {
                debug!(session_id = %session_id, "Closing session for server shutdown");
            }
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Connection closed");
            }
        }

        self.teardown().await;
        self.session.name().cloned()
    }

    /// Negotiation followed by the message loop.
    async fn serve(&mut self) -> Result<(), ConnectionError> {
        self.session.begin_negotiation()?;
        let name = self.negotiate_name().await?;
        self.enter_active(name.clone()).await?;
        self.process_lines(&name).await
    }

    /// Prompts until the client submits a name nobody holds.
    ///
    /// Retries are unbounded; a client that keeps proposing taken names is
    /// simply prompted again.
    async fn negotiate_name(&mut self) -> Result<ChatName, ConnectionError> {
        loop {
            self.output.send(&ServerMessage::SubmitName).await?;

            let candidate = ChatName::from(self.read_line().await?);
            if self.registry.try_claim(candidate.clone()).await? {
                return Ok(candidate);
            }

            debug!(
                session_id = %self.session.id(),
                name = %candidate,
                "Name taken, prompting again"
            );
        }
    }

    /// Commits the claimed name, acknowledges it, announces the join and
    /// starts receiving broadcasts.
    ///
    /// The join announcement goes out before the output is registered, so
    /// the joining client does not see its own announcement.
    async fn enter_active(&mut self, name: ChatName) -> Result<(), ConnectionError> {
        if let Err(e) = self.session.activate(name.clone()) {
            // Claimed but not committed: nobody else would release it
            if let Err(release_err) = self.registry.release(name.clone()).await {
                warn!(name = %name, error = %release_err, "Failed to release name");
            }
            return Err(e.into());
        }

        self.output.send(&ServerMessage::NameAccepted).await?;

        info!(
            session_id = %self.session.id(),
            name = %name,
            "User {name} has joined. Welcome!"
        );
        self.dispatcher.broadcast(&ServerMessage::joined(&name)).await;

        self.registry
            .add_output(self.session.id(), self.output.clone())
            .await;

        Ok(())
    }

    /// Main message processing loop.
    ///
    /// Reads and processes lines until the connection closes or an
    /// unrecoverable error occurs.
    async fn process_lines(&mut self, name: &ChatName) -> Result<(), ConnectionError> {
        loop {
            let line = self.read_line().await?;

            match ClientLine::classify(&line) {
                ClientLine::Command(ClientCommand::Users) => {
                    let names = self.registry.snapshot_names().await;
                    self.output.send(&ServerMessage::user_list(&names)).await?;
                }
                ClientLine::UnknownCommand(command) => {
                    debug!(
                        session_id = %self.session.id(),
                        command = %command,
                        "Ignoring unknown command"
                    );
                }
                ClientLine::Chat(text) => {
                    let msg = ServerMessage::chat(name, text);
                    let report = self.dispatcher.broadcast(&msg).await;
                    info!(
                        session_id = %self.session.id(),
                        delivered = report.delivered,
                        failed = report.failed,
                        "{msg}"
                    );
                }
            }
        }
    }

    /// Reads a single line from the client.
    ///
    /// Returns `Eof` when the stream ends and `Shutdown` when the server is
    /// stopping.
    async fn read_line(&mut self) -> Result<String, ConnectionError> {
        let next = tokio::select! {
            _ = self.cancel_token.cancelled() => return Err(ConnectionError::Shutdown),
            next = self.lines.next() => next,
        };

        match next {
            Some(Ok(line)) => Ok(line),
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                Err(ConnectionError::LineTooLong {
                    max: self.lines.decoder().max_length(),
                })
            }
            Some(Err(AnyDelimiterCodecError::Io(e))) => Err(ConnectionError::Io(e.to_string())),
            None => Err(ConnectionError::Eof),
        }
    }

    /// Runs the deterministic cleanup sequence.
    ///
    /// Safe to call more than once; only the first call does anything.
    /// Never fails: errors are logged.
    async fn teardown(&mut self) {
        if !self.session.close() {
            return;
        }

        let session_id = self.session.id();
        self.registry.remove_output(session_id).await;

        match self.session.name().cloned() {
            Some(name) => {
                info!(
                    session_id = %session_id,
                    name = %name,
                    "User {name} is logging out"
                );
                self.dispatcher
                    .broadcast(&ServerMessage::disconnected(&name))
                    .await;

                match self.registry.release(name.clone()).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(name = %name, "Name was already released");
                    }
                    Err(e) => {
                        warn!(name = %name, error = %e, "Failed to release name");
                    }
                }
            }
            None => {
                warn!(session_id = %session_id, "User without name is logging out");
            }
        }

        if let Err(e) = self.output.close().await {
            debug!(session_id = %session_id, error = %e, "Failed to close connection");
        }
    }

    #[cfg(test)]
    fn state(&self) -> SessionState {
        self.session.state()
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Server shutting down")]
    Shutdown,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Session error: {0}")]
    Domain(#[from] DomainError),
}
