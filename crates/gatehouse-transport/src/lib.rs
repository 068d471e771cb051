//! Transport abstraction layer for Gatehouse.
//!
//! Nodes share no memory, so every fact that crosses a process boundary
//! goes through this crate. Two seams are defined:
//!
//! - [`Outbound`]: "publish these bytes on this channel to every other
//!   node". This is all the session channel needs, and it is the seam tests
//!   mock. Delivery is best-effort: no acknowledgement, no retry.
//! - [`Transport`] / [`Connection`]: point-to-point links used to build a
//!   real network mesh ([`PeerMesh`]).
//!
//! Implementations:
//!
//! - [`MemoryHub`]: in-process hub for tests and single-binary demos,
//!   with switchable reachability to simulate dropped messages.
//! - [`PeerMesh`] over [`WebSocketTransport`] (feature `websocket`,
//!   default): one WebSocket per peer on the trusted internal network.
//!
//! Everything a node receives arrives as an [`Inbound`] on an unbounded
//! `mpsc` receiver, which the node's main loop selects on.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod mesh;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryHub, MemoryLink};
#[cfg(feature = "websocket")]
pub use mesh::PeerMesh;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use gatehouse_protocol::{ChannelName, NodeId};

/// Identifies one peer link inside a [`PeerMesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A payload received from another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// The node that published it.
    pub from: NodeId,
    /// Which channel it was published on.
    pub channel: ChannelName,
    /// The still-encoded channel message.
    pub payload: Bytes,
}

/// Publishes payloads to every other node.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one instance is shared (behind an `Arc`)
///   by the node's main loop and by the short-lived tasks that publish in
///   the background.
/// - The returned future is `Send` so publishing can be `tokio::spawn`ed:
///   a broadcast must never hold up the action that triggered it.
pub trait Outbound: Send + Sync + 'static {
    /// The id of the node publishing through this handle.
    fn node_id(&self) -> &NodeId;

    /// Sends `payload` on `channel` to all other reachable nodes.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the payload could not be handed to
    /// any peer. Callers log and move on; they never retry.
    fn publish(
        &self,
        channel: ChannelName,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Listens for peers dialing this node.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Resolves when the next peer has finished its handshake.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops listening. Links already accepted stay open.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// One link to a peer node, carrying encoded envelopes.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes one envelope frame.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next envelope frame. `Ok(None)` once the peer has closed
    /// the link.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }
}
