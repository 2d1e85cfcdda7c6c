//! Server-to-client protocol messages.

use std::fmt;
use std::str::FromStr;

use kchat_core::ChatName;
use thiserror::Error;

/// Keyword prompting the client for a display name.
pub const SUBMIT_NAME: &str = "SUBMITNAME";

/// Keyword confirming the last submitted name.
pub const NAME_ACCEPTED: &str = "NAMEACCEPTED";

/// Prefix of informational lines.
pub const INFO: &str = "INFO";

/// Prefix of chat lines.
pub const MESSAGE: &str = "MESSAGE";

/// Separator used in the `/users` listing.
const USER_LIST_SEPARATOR: &str = ", ";

/// Messages sent from the server to clients.
///
/// `Display` renders the exact wire line without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Request a candidate name
    SubmitName,

    /// The most recently submitted name is now active
    NameAccepted,

    /// Informational/system message (joins, departures, user list)
    Info(String),

    /// Chat line from a named session
    Message {
        /// Sender's display name
        name: String,
        /// Message text, verbatim
        text: String,
    },
}

impl ServerMessage {
    /// Creates an informational message.
    pub fn info(text: impl Into<String>) -> Self {
        Self::Info(text.into())
    }

    /// Creates a chat message from `name`.
    pub fn chat(name: &ChatName, text: impl Into<String>) -> Self {
        Self::Message {
            name: name.to_string(),
            text: text.into(),
        }
    }

    /// Join announcement sent to already active sessions.
    pub fn joined(name: &ChatName) -> Self {
        Self::Info(format!("{name} has joined. Welcome!"))
    }

    /// Departure notice sent to remaining sessions.
    pub fn disconnected(name: &ChatName) -> Self {
        Self::Info(format!("{name} disconnected"))
    }

    /// Reply to `/users`, listing names with no trailing separator.
    pub fn user_list<'a>(names: impl IntoIterator<Item = &'a ChatName>) -> Self {
        let listing = names
            .into_iter()
            .map(ChatName::as_str)
            .collect::<Vec<_>>()
            .join(USER_LIST_SEPARATOR);
        Self::Info(format!("Users in this server: {listing}"))
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubmitName => f.write_str(SUBMIT_NAME),
            Self::NameAccepted => f.write_str(NAME_ACCEPTED),
            Self::Info(text) => write!(f, "{INFO} {text}"),
            Self::Message { name, text } => write!(f, "{MESSAGE} {name}: {text}"),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    /// Parses a wire line as a client would see it.
    ///
    /// A `MESSAGE` line splits at the first `": "`, so names containing
    /// that sequence do not round-trip.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (keyword, rest) = match line.split_once(' ') {
            Some((keyword, rest)) => (keyword, Some(rest)),
            None => (line, None),
        };

        match (keyword, rest) {
            (SUBMIT_NAME, None) => Ok(Self::SubmitName),
            (NAME_ACCEPTED, None) => Ok(Self::NameAccepted),
            (INFO, Some(text)) => Ok(Self::Info(text.to_string())),
            (MESSAGE, Some(body)) => {
                let (name, text) = body
                    .split_once(": ")
                    .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
                Ok(Self::Message {
                    name: name.to_string(),
                    text: text.to_string(),
                })
            }
            (SUBMIT_NAME | NAME_ACCEPTED | INFO | MESSAGE, _) => {
                Err(ProtocolError::Malformed(line.to_string()))
            }
            (other, _) => Err(ProtocolError::UnknownKeyword(other.to_string())),
        }
    }
}

/// Errors raised while decoding protocol lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown keyword: {0}")]
    UnknownKeyword(String),

    #[error("malformed line: {0}")]
    Malformed(String),
}
