//! The legacy "connect to server" channel.
//!
//! Older plugins ask the proxy to move a player by sending a message on the
//! `BungeeCord` channel whose first string is a sub-command name
//! (`"Connect"`, `"ConnectOther"`, `"PlayerCount"`, ...). Only the name is
//! read here: the rest of the payload varies per sub-command and is none of
//! the gate's business.

use crate::codec::get_str;
use crate::ProtocolError;

/// Channel names the legacy protocol is known under.
pub const LEGACY_CHANNELS: [&str; 2] = ["BungeeCord", "bungeecord:main"];

/// The sub-command at the front of a legacy message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacySubCommand {
    /// Move the sending player to another server.
    Connect,
    /// Move some named player to another server.
    ConnectOther,
    /// Anything else (queries, forwards, ...). Not gated.
    Other(String),
}

impl LegacySubCommand {
    /// Returns `true` for sub-commands that request a server transfer.
    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::Connect | Self::ConnectOther)
    }
}

/// A parsed legacy message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRequest {
    pub sub_command: LegacySubCommand,
}

impl LegacyRequest {
    /// Reads only the sub-command name from `payload`.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the payload doesn't even contain a
    /// complete leading string.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut input = payload;
        let name = get_str(&mut input)?;
        let sub_command = match name.as_str() {
            "Connect" => LegacySubCommand::Connect,
            "ConnectOther" => LegacySubCommand::ConnectOther,
            _ => LegacySubCommand::Other(name),
        };
        Ok(Self { sub_command })
    }
}
