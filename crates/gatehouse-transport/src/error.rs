use gatehouse_protocol::{NodeId, ProtocolError};

/// Why a link or a publish failed.
///
/// None of these are fatal to a node: publishing is best-effort, and a
/// failed send only means the receiving node will re-verify the player
/// the next time they connect there.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer hung up.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or completing a peer handshake failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Dialing a peer failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// There is nobody to publish to.
    #[error("no peers connected")]
    NoPeers,

    /// The publishing node is cut off from the rest of the mesh.
    #[error("node {0} is unreachable")]
    Unreachable(NodeId),

    /// A frame could not be encoded.
    #[error("framing failed: {0}")]
    Framing(#[from] ProtocolError),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
