//! Name registry using Actor pattern.
//!
//! The registry is the shared store of claimed names and active session
//! outputs. Names are owned by an actor task that receives commands via a
//! tokio mpsc channel; outputs live in a `RwLock`ed map next to the handle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryActor  │
//! └────────┬────────┘     └─────────────────┘
//!          │                      │
//!          │   RegistryCommand    │ BTreeSet<ChatName>
//!          │   (mpsc channel)     │ (claimed names)
//!          ▼                      ▼
//!   add/remove output       try_claim / release /
//!   (RwLock<HashMap>)       snapshot_names
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command channel
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Returns a RegistryHandle for client use
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use kchat_core::ChatName;
/// use kchatd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///
///     let claimed = handle.try_claim(ChatName::from("alice")).await;
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
