//! Domain-specific error types following panic-free policy.

use crate::{SessionId, SessionState};
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Session lifecycle moved along an edge the state machine does not have
    #[error("Session {session_id}: invalid transition from {from} to {to}")]
    InvalidTransition {
        session_id: SessionId,
        from: SessionState,
        to: SessionState,
    },

    /// A name was committed to a session that already has one
    #[error("Session {session_id} already named {name}")]
    AlreadyNamed { session_id: SessionId, name: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
