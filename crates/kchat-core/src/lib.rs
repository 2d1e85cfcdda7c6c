//! KnightChat Core - Shared types for the chat relay
//!
//! This crate provides the domain types shared between
//! the wire protocol (kchat-protocol) and the daemon (kchatd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use session::{ChatName, Session, SessionId, SessionState};
