//! Core identity types shared by every Gatehouse crate.
//!
//! These are the keys that all authentication state is indexed by, so they
//! need to be cheap to copy, hashable, and printable in logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// PlayerId
// ---------------------------------------------------------------------------

/// A stable, opaque handle for a player.
///
/// This is a "newtype wrapper" around a UUID: the same player gets the same
/// id every time they reconnect, on every node. You can't accidentally pass
/// some other UUID where a `PlayerId` is expected.
///
/// On the wire it travels in its hyphenated textual form
/// (`"1b4e28ba-2fa1-11d2-883f-0016d3cca427"`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Generates a fresh random id. Handy for tests and demos; real ids
    /// come from the game platform.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for PlayerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for PlayerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidUuid(s.to_string()))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// ---------------------------------------------------------------------------
// PlayerIdentity
// ---------------------------------------------------------------------------

/// Who a connecting player is: their stable id plus the name they show up
/// as. Created on connect; never persisted by Gatehouse itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerIdentity {
    /// Stable key for all authentication state.
    pub id: PlayerId,
    /// The player's current username. Informational only: two identities
    /// are the same player iff their ids match.
    pub display_name: String,
}

impl PlayerIdentity {
    /// Creates an identity from its parts.
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Names one server process: the proxy or a backend such as `"lobby"`.
///
/// Node ids are chosen by the operator in configuration and are only
/// meaningful inside one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Creates a node id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ChannelName
// ---------------------------------------------------------------------------

/// The named messaging channels Gatehouse uses between nodes.
///
/// Three independent channels exist:
///
/// - [`Session`](Self::Session): session facts, backend ↔ backend
/// - [`Proxy`](Self::Proxy): authenticated/deauthenticated transitions,
///   backend → proxy
/// - [`Legacy`](Self::Legacy): generic "connect to server" requests sent
///   by older clients and plugins; inspected by the proxy only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelName {
    Session,
    Proxy,
    Legacy,
}

impl ChannelName {
    /// The canonical name of this channel on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "gatehouse:session",
            Self::Proxy => "gatehouse:main",
            Self::Legacy => "bungeecord:main",
        }
    }

    /// Maps a wire channel name back to a [`ChannelName`].
    ///
    /// Both spellings of the legacy channel (`BungeeCord` and
    /// `bungeecord:main`) are recognized. Anything else is `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "gatehouse:session" => Some(Self::Session),
            "gatehouse:main" => Some(Self::Proxy),
            n if crate::LEGACY_CHANNELS.contains(&n) => Some(Self::Legacy),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
