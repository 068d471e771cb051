//! A full mesh of node-to-node WebSocket links.
//!
//! Every node keeps one [`WebSocketConnection`] per peer, whether it
//! accepted the link or dialed it. Publishing writes one [`Envelope`] to
//! each peer; a reader task per link decodes incoming envelopes and pushes
//! them to the node as [`Inbound`] values.
//!
//! There is no handshake: every envelope names its sender, so a link does
//! not need to know which node is on the other end.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use gatehouse_protocol::{ChannelName, Envelope, NodeId, WireFormat};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    Connection, ConnectionId, Inbound, Outbound, Transport, TransportError,
    WebSocketConnection, WebSocketTransport,
};

struct MeshInner {
    node_id: NodeId,
    peers: Mutex<HashMap<ConnectionId, Arc<WebSocketConnection>>>,
    inbound: mpsc::UnboundedSender<Inbound>,
}

/// One node's view of the mesh. Cheap to clone.
#[derive(Clone)]
pub struct PeerMesh {
    inner: Arc<MeshInner>,
}

impl PeerMesh {
    /// Creates an empty mesh for `node_id`.
    ///
    /// Returns the mesh plus the receiver on which every envelope from
    /// every peer arrives.
    pub fn new(node_id: impl Into<NodeId>) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mesh = Self {
            inner: Arc::new(MeshInner {
                node_id: node_id.into(),
                peers: Mutex::new(HashMap::new()),
                inbound: tx,
            }),
        };
        (mesh, rx)
    }

    /// Number of live peer links.
    pub fn peer_count(&self) -> usize {
        self.inner.peers.lock().len()
    }

    /// Adopts an established link and starts reading from it.
    pub fn add_peer(&self, conn: WebSocketConnection) -> ConnectionId {
        let id = conn.id();
        let conn = Arc::new(conn);
        self.inner.peers.lock().insert(id, Arc::clone(&conn));
        tracing::info!(node = %self.inner.node_id, %id, "peer link up");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            read_loop(&inner, &conn).await;
            inner.peers.lock().remove(&id);
            tracing::info!(node = %inner.node_id, %id, "peer link down");
        });
        id
    }

    /// Dials a peer at `addr` and adds the link.
    pub async fn dial(&self, addr: &str) -> Result<ConnectionId, TransportError> {
        let conn = WebSocketConnection::connect(addr).await?;
        Ok(self.add_peer(conn))
    }

    /// Accepts peer links from `transport` until it fails.
    ///
    /// Runs in a background task; abort the handle to stop accepting.
    pub fn serve(&self, mut transport: WebSocketTransport) -> JoinHandle<()> {
        let mesh = self.clone();
        tokio::spawn(async move {
            loop {
                match transport.accept().await {
                    Ok(conn) => {
                        mesh.add_peer(conn);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed, listener stopping");
                        break;
                    }
                }
            }
        })
    }
}

async fn read_loop(inner: &MeshInner, conn: &WebSocketConnection) {
    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(id = %conn.id(), error = %e, "peer read failed");
                return;
            }
        };

        let envelope = match Envelope::from_bytes(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(id = %conn.id(), error = %e, "dropping malformed envelope");
                continue;
            }
        };
        let Some(channel) = ChannelName::parse(&envelope.channel) else {
            tracing::debug!(channel = %envelope.channel, "dropping envelope on unknown channel");
            continue;
        };

        let inbound = Inbound {
            from: envelope.from,
            channel,
            payload: envelope.payload,
        };
        if inner.inbound.send(inbound).is_err() {
            // The node is gone; nobody will read anything else either.
            return;
        }
    }
}

impl Outbound for PeerMesh {
    fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    async fn publish(
        &self,
        channel: ChannelName,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let frame = Envelope {
            from: self.inner.node_id.clone(),
            channel: channel.as_str().to_string(),
            payload,
        }
        .to_bytes()?;

        // Snapshot so no lock is held across an await.
        let peers: Vec<_> = self
            .inner
            .peers
            .lock()
            .values()
            .map(Arc::clone)
            .collect();

        let mut delivered = 0;
        for peer in peers {
            match peer.send(&frame).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(id = %peer.id(), error = %e, "dropping dead peer");
                    self.inner.peers.lock().remove(&peer.id());
                }
            }
        }

        if delivered == 0 {
            return Err(TransportError::NoPeers);
        }
        Ok(())
    }
}
