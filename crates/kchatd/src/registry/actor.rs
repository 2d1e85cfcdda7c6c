//! Registry actor - owns the claimed-name set and processes commands.
//!
//! The RegistryActor is the single owner of name state in the system.
//! It receives commands via an mpsc channel and answers each one on the
//! oneshot channel the command carries.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Response send failures are ignored (the requester went away)

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::{debug, info};

use kchat_core::ChatName;

use super::commands::RegistryCommand;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns the set of claimed names.
///
/// Implements the actor pattern: receives commands via mpsc channel and
/// processes them sequentially. Every claim is a check-and-insert inside a
/// single command, which is what makes names unique under concurrent
/// negotiation.
///
/// # Thread Safety
///
/// The actor runs in a single task. All mutations of `claimed` happen
/// within this task, so claim and release are mutually exclusive without
/// an explicit lock.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Names currently held by live sessions.
    /// Ordered so snapshots come out sorted.
    claimed: BTreeSet<ChatName>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            claimed: BTreeSet::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Registry actor stopped (names: {})", self.claimed.len());
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::TryClaim { name, respond_to } => {
                let result = self.handle_try_claim(name);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Release { name, respond_to } => {
                let result = self.handle_release(&name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::IsClaimed { name, respond_to } => {
                let _ = respond_to.send(self.claimed.contains(&name));
            }
            RegistryCommand::SnapshotNames { respond_to } => {
                let _ = respond_to.send(self.claimed.iter().cloned().collect());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_try_claim(&mut self, name: ChatName) -> bool {
        if self.claimed.contains(&name) {
            debug!(name = %name, "Name already claimed, rejecting");
            return false;
        }

        info!(
            name = %name,
            total_names = self.claimed.len() + 1,
            "Name claimed"
        );
        self.claimed.insert(name)
    }

    fn handle_release(&mut self, name: &ChatName) -> bool {
        if self.claimed.remove(name) {
            debug!(name = %name, total_names = self.claimed.len(), "Name released");
            true
        } else {
            debug!(name = %name, "Release of unclaimed name ignored");
            false
        }
    }

    /// Returns the number of claimed names (for testing).
    #[cfg(test)]
    pub fn name_count(&self) -> usize {
        self.claimed.len()
    }
}
