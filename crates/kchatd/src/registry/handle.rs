//! Client interface for interacting with the registry.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for claiming and
//! releasing names through the actor, and for maintaining the set of active
//! session outputs.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;

use kchat_core::{ChatName, SessionId};

use super::commands::{RegistryCommand, RegistryError};
use crate::server::SessionOutput;

/// Type alias for the active outputs map
type OutputsMap = Arc<RwLock<HashMap<SessionId, SessionOutput>>>;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
///
/// The name set and the output map are synchronized independently: names
/// through the actor, outputs through an `RwLock`. They are never locked
/// together, and nothing relies on a change to one being atomic with a
/// change to the other.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// if handle.try_claim(ChatName::from("alice")).await? {
///     handle.add_output(session_id, output).await;
/// }
///
/// let names = handle.snapshot_names().await;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Outputs of every session that finished negotiation
    outputs: OutputsMap,
}

impl RegistryHandle {
    /// Create a new registry handle with an empty output map.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self {
            sender,
            outputs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Atomically claim `name` if it is free.
    ///
    /// Returns `Ok(true)` if this call claimed the name, `Ok(false)` if
    /// another session holds it.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_claim(&self, name: ChatName) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::TryClaim {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Release a claimed name.
    ///
    /// Returns `Ok(false)` if the name was not claimed (double release).
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn release(&self, name: ChatName) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Release {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Check whether a name is currently claimed.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn is_claimed(&self, name: ChatName) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::IsClaimed {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Get a sorted copy of every claimed name.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn snapshot_names(&self) -> Vec<ChatName> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::SnapshotNames { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Register a session's output so it receives broadcasts.
    ///
    /// Returns `false` if the session already had an output registered,
    /// in which case the old one is replaced.
    pub async fn add_output(&self, session_id: SessionId, output: SessionOutput) -> bool {
        let mut outputs = self.outputs.write().await;
        let fresh = outputs.insert(session_id, output).is_none();
        debug!(session_id = %session_id, active = outputs.len(), "Added output");
        fresh
    }

    /// Remove a session's output.
    ///
    /// Safe to call for a session that never registered one; returns `false`
    /// in that case.
    pub async fn remove_output(&self, session_id: SessionId) -> bool {
        let mut outputs = self.outputs.write().await;
        let removed = outputs.remove(&session_id).is_some();
        if removed {
            debug!(session_id = %session_id, active = outputs.len(), "Removed output");
        }
        removed
    }

    /// Copy the active outputs.
    ///
    /// The read lock is released before this returns, so callers can write
    /// to the outputs without blocking membership changes.
    pub async fn output_snapshot(&self) -> Vec<(SessionId, SessionOutput)> {
        self.outputs
            .read()
            .await
            .iter()
            .map(|(id, output)| (*id, output.clone()))
            .collect()
    }

    /// Returns the number of sessions receiving broadcasts.
    pub async fn active_count(&self) -> usize {
        self.outputs.read().await.len()
    }

    /// Drops every registered output (used on server shutdown).
    pub async fn clear_outputs(&self) {
        self.outputs.write().await.clear();
    }

    /// Check if the actor is still running.
    ///
    /// Returns `true` if the command channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
