//! KnightChat Protocol - Line-oriented wire protocol
//!
//! This crate provides the server-to-client line vocabulary and the
//! classification of client lines into commands and chat text.
//!
//! Every message is a single UTF-8 line; framing (the trailing newline)
//! belongs to the transport layer.

pub mod message;
pub mod parse;

pub use message::{ProtocolError, ServerMessage};
pub use parse::{ClientCommand, ClientLine, COMMAND_MARKER};
