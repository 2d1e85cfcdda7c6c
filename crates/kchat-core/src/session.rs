//! Session domain entities and value objects.

use std::borrow::Borrow;
use std::fmt;

use tracing::debug;

use crate::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a client connection.
///
/// Assigned by the acceptor from a monotonically increasing counter,
/// so two live connections never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new SessionId from a connection number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Display name chosen by a client during negotiation.
///
/// Names are compared byte-for-byte; `"Alice"` and `"alice"` are
/// different names. Any line the client submits is a valid candidate,
/// uniqueness is the registry's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatName(String);

impl ChatName {
    /// Creates a new ChatName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ChatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChatName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChatName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ChatName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ChatName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Lifecycle state of a client session.
///
/// ```text
/// Connected ──▶ NegotiatingName ──▶ Active ──▶ Closed
///     │                │                          ▲
///     └────────────────┴──────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Connection accepted, nothing sent yet.
    #[default]
    Connected,

    /// Prompting for a display name until a free one is claimed.
    NegotiatingName,

    /// Name committed; the session sends and receives chat.
    Active,

    /// Terminal. Teardown has run.
    Closed,
}

impl SessionState {
    /// Returns the display label for this state.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::NegotiatingName => "negotiating",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    /// Returns true if the state machine has an edge from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Connected, Self::NegotiatingName)
                | (Self::NegotiatingName, Self::Active)
                | (Self::Connected, Self::Closed)
                | (Self::NegotiatingName, Self::Closed)
                | (Self::Active, Self::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-connection session state.
///
/// Holds identity, the negotiated name and the lifecycle state. The I/O
/// endpoints live with the connection handler that owns this value.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    name: Option<ChatName>,
    state: SessionState,
}

impl Session {
    /// Creates a freshly connected session.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            name: None,
            state: SessionState::Connected,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the committed name, if negotiation succeeded.
    pub fn name(&self) -> Option<&ChatName> {
        self.name.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves from `Connected` to `NegotiatingName`.
    pub fn begin_negotiation(&mut self) -> DomainResult<()> {
        self.transition(SessionState::NegotiatingName)
    }

    /// Commits a claimed name and moves to `Active`.
    ///
    /// The name is set exactly once; a second call fails without
    /// touching the existing name.
    pub fn activate(&mut self, name: ChatName) -> DomainResult<()> {
        if let Some(existing) = &self.name {
            return Err(DomainError::AlreadyNamed {
                session_id: self.id,
                name: existing.to_string(),
            });
        }
        self.transition(SessionState::Active)?;
        self.name = Some(name);
        Ok(())
    }

    /// Moves to `Closed` from any live state.
    ///
    /// Returns `true` if this call performed the transition and `false` if
    /// the session was already closed, so callers can run teardown once.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        debug!(session_id = %self.id, from = %self.state, "Session closing");
        self.state = SessionState::Closed;
        true
    }

    fn transition(&mut self, next: SessionState) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                session_id: self.id,
                from: self.state,
                to: next,
            });
        }
        debug!(session_id = %self.id, from = %self.state, to = %next, "Session transition");
        self.state = next;
        Ok(())
    }
}
