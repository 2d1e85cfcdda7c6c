//! Registry actor commands and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//!
//! All types are designed for async message passing and follow the panic-free policy.

use kchat_core::ChatName;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
///
/// # Usage
///
/// ```ignore
/// let (tx, rx) = oneshot::channel();
/// registry_tx.send(RegistryCommand::TryClaim {
///     name,
///     respond_to: tx,
/// }).await?;
/// let claimed = rx.await?;
/// ```
#[derive(Debug)]
pub enum RegistryCommand {
    /// Claim a name if nobody holds it.
    ///
    /// Membership check and insert happen inside a single command, so two
    /// sessions racing for the same name cannot both win.
    TryClaim {
        /// Candidate name
        name: ChatName,
        /// `true` if the claim succeeded
        respond_to: oneshot::Sender<bool>,
    },

    /// Release a claimed name.
    ///
    /// Releasing a name that is not claimed is a no-op.
    Release {
        /// Name to release
        name: ChatName,
        /// `true` if the name was claimed before this command
        respond_to: oneshot::Sender<bool>,
    },

    /// Check whether a name is currently claimed.
    IsClaimed {
        /// Name to look up
        name: ChatName,
        /// Channel to send the result
        respond_to: oneshot::Sender<bool>,
    },

    /// Copy the current set of claimed names.
    ///
    /// Names come back in sorted order.
    SnapshotNames {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<ChatName>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Uses `thiserror` for ergonomic error handling and Display implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The command or response channel was closed.
    ///
    /// This typically indicates the actor was shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}
