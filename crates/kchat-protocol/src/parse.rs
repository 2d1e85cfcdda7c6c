//! Classification of client lines.
//!
//! After negotiation, every client line is either a command (prefixed by
//! [`COMMAND_MARKER`]) or chat text to broadcast verbatim.

/// Marker that turns a line into a command.
pub const COMMAND_MARKER: char = '/';

/// Commands the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// List every claimed name, replied to the requester only
    Users,
}

impl ClientCommand {
    /// Looks up a command by the text following the marker.
    ///
    /// Matching is exact: no trimming, no case folding.
    pub fn lookup(word: &str) -> Option<Self> {
        match word {
            "users" => Some(Self::Users),
            _ => None,
        }
    }
}

/// A client line after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine<'a> {
    /// A recognized command
    Command(ClientCommand),

    /// Marker-prefixed text that names no known command; ignored by the server
    UnknownCommand(&'a str),

    /// Chat text
    Chat(&'a str),
}

impl<'a> ClientLine<'a> {
    /// Classifies a line received from an active session.
    pub fn classify(line: &'a str) -> Self {
        match line.strip_prefix(COMMAND_MARKER) {
            Some(rest) => match ClientCommand::lookup(rest) {
                Some(cmd) => Self::Command(cmd),
                None => Self::UnknownCommand(rest),
            },
            None => Self::Chat(line),
        }
    }
}
