//! In-process transport.
//!
//! A [`MemoryHub`] stands in for the internal network when every node lives
//! in the same process, as in tests and the bundled demo. Each node
//! [`join`](MemoryHub::join)s the hub and gets a [`MemoryLink`] to publish
//! through plus a receiver for everything the others publish.
//!
//! Reachability can be switched off per node to simulate a partition or a
//! dropped message, which is how the "a lost broadcast only costs a second
//! login" behavior is tested without a real network.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use gatehouse_protocol::{ChannelName, NodeId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{Inbound, Outbound, TransportError};

struct Member {
    sender: mpsc::UnboundedSender<Inbound>,
    reachable: bool,
}

/// Shared in-process message hub. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryHub {
    members: Arc<Mutex<HashMap<NodeId, Member>>>,
}

impl MemoryHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node_id` with the hub.
    ///
    /// Returns the link to publish through and the receiver on which this
    /// node's inbound traffic arrives. Joining again under the same id
    /// replaces the previous registration (a restarted node).
    pub fn join(
        &self,
        node_id: impl Into<NodeId>,
    ) -> (MemoryLink, mpsc::UnboundedReceiver<Inbound>) {
        let node_id = node_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.members.lock().insert(
            node_id.clone(),
            Member {
                sender: tx,
                reachable: true,
            },
        );
        tracing::debug!(node = %node_id, "node joined memory hub");
        let link = MemoryLink {
            node_id,
            hub: self.clone(),
        };
        (link, rx)
    }

    /// Cuts a node off (`false`) or reconnects it (`true`).
    ///
    /// While cut off, nothing it publishes is delivered and nothing is
    /// delivered to it. Messages are dropped, not queued.
    pub fn set_reachable(&self, node_id: &NodeId, reachable: bool) {
        if let Some(member) = self.members.lock().get_mut(node_id) {
            member.reachable = reachable;
        }
    }

    /// Removes a node from the hub entirely.
    pub fn leave(&self, node_id: &NodeId) {
        self.members.lock().remove(node_id);
    }

    /// Number of nodes currently registered.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Returns `true` if no node is registered.
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    fn deliver(
        &self,
        from: &NodeId,
        channel: ChannelName,
        payload: Bytes,
    ) -> Result<usize, TransportError> {
        let members = self.members.lock();
        match members.get(from) {
            Some(me) if me.reachable => {}
            _ => return Err(TransportError::Unreachable(from.clone())),
        }

        let mut delivered = 0;
        for (id, member) in members.iter() {
            if id == from || !member.reachable {
                continue;
            }
            let inbound = Inbound {
                from: from.clone(),
                channel,
                payload: payload.clone(),
            };
            // A closed receiver means that node shut down; skip it.
            if member.sender.send(inbound).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}

/// One node's handle on a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryLink {
    node_id: NodeId,
    hub: MemoryHub,
}

impl Outbound for MemoryLink {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn publish(
        &self,
        channel: ChannelName,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let delivered = self.hub.deliver(&self.node_id, channel, payload)?;
        tracing::trace!(node = %self.node_id, %channel, delivered, "published");
        if delivered == 0 {
            return Err(TransportError::NoPeers);
        }
        Ok(())
    }
}
