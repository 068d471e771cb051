//! Proxy node: blocks server transfers for unauthenticated players.
//!
//! The proxy never checks credentials. It keeps its own
//! [`AuthStateStore`], fed only by `SetAuthenticated` messages from the
//! backends, and consults it whenever a player tries to move between
//! servers. Three doors lead off the lobby and all three are watched:
//!
//! - the proxy's own `server <name>` command;
//! - a transfer requested by the proxy itself (a plugin, a menu click);
//! - the legacy `Connect` / `ConnectOther` channel messages.

use std::sync::Arc;

use gatehouse_gate::{Action, DenyReason, GateEnforcer, GateMode, Verdict};
use gatehouse_protocol::{
    ChannelMessage, ChannelName, LegacyRequest, NodeId, PlayerId, PlayerIdentity,
    SetAuthenticated, WireFormat,
};
use gatehouse_session::AuthStateStore;
use gatehouse_transport::Inbound;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::GatehouseConfig;

/// Connecting to this server means the player is about to be
/// re-authenticated, so their flag is cleared.
pub const AUTH_SERVER: &str = "auth";

const LEGACY_DENIED: &str = "You must be logged in to change servers!";

/// Handle to a running proxy. Cheap to clone.
#[derive(Clone)]
pub struct ProxyHandle {
    node_id: NodeId,
    shutdown: mpsc::Sender<()>,
    store: Arc<AuthStateStore>,
    gate: Arc<GateEnforcer>,
}

/// The proxy's inbound loop. Build one with [`ProxyNode::start`].
pub struct ProxyNode {
    node_id: NodeId,
    store: Arc<AuthStateStore>,
}

impl ProxyNode {
    /// Starts the proxy's inbound loop and returns its handle.
    pub fn start(config: GatehouseConfig, inbound: mpsc::UnboundedReceiver<Inbound>) -> ProxyHandle {
        let config = config.validated();
        let node_id = config.node_id();
        let store = Arc::new(AuthStateStore::default());
        let gate = Arc::new(GateEnforcer::new(
            Arc::clone(&store),
            &config.gate_config(),
            GateMode::Normal,
        ));

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let node = Self {
            node_id: node_id.clone(),
            store: Arc::clone(&store),
        };
        tokio::spawn(node.run(inbound, shutdown_rx));

        ProxyHandle {
            node_id,
            shutdown: shutdown_tx,
            store,
            gate,
        }
    }

    async fn run(
        self,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        info!(node = %self.node_id, "proxy started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_inbound(&msg),
                    None => break,
                },
            }
        }
        info!(node = %self.node_id, "proxy stopped");
    }

    fn handle_inbound(&self, msg: &Inbound) {
        if msg.channel != ChannelName::Proxy {
            return;
        }
        match ChannelMessage::from_bytes(&msg.payload) {
            Ok(ChannelMessage::SetAuthenticated(SetAuthenticated {
                identity_id,
                authenticated,
            })) => {
                let changed = if authenticated {
                    self.store.mark_authenticated(&identity_id)
                } else {
                    self.store.mark_unauthenticated(&identity_id)
                };
                info!(
                    node = %self.node_id,
                    player_id = %identity_id,
                    from = %msg.from,
                    authenticated,
                    changed,
                    "authentication flag updated"
                );
            }
            Ok(other) => {
                debug!(kind = other.type_tag(), from = %msg.from, "unexpected message on proxy channel");
            }
            Err(e) => {
                debug!(from = %msg.from, error = %e, "dropping malformed proxy message");
            }
        }
    }
}

impl ProxyHandle {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// A player connected to the network. They start unauthenticated.
    pub fn connect(&self, identity: PlayerIdentity) {
        debug!(node = %self.node_id, player_id = %identity.id, "player connected to proxy");
        self.store.connect(identity);
    }

    /// A player left the network.
    pub fn disconnect(&self, player_id: &PlayerId) {
        self.store.disconnect(player_id);
        self.gate.forget(player_id);
    }

    /// A player finished moving to `server`.
    pub fn on_server_connected(&self, player_id: &PlayerId, server: &str) {
        if server.eq_ignore_ascii_case(AUTH_SERVER) && self.store.mark_unauthenticated(player_id) {
            info!(node = %self.node_id, %player_id, "player sent to auth server, flag cleared");
        }
    }

    pub fn is_authenticated(&self, player_id: &PlayerId) -> bool {
        self.store.is_authenticated(player_id)
    }

    /// A transfer to `target`, however it was requested.
    pub fn check_transfer(&self, player_id: &PlayerId, target: &str) -> Verdict {
        self.gate.check(
            player_id,
            &Action::Transfer {
                target: Some(target.to_string()),
            },
        )
    }

    /// The proxy's `server [name]` command. `None` if `line` is some other
    /// command.
    pub fn check_server_command(&self, player_id: &PlayerId, line: &str) -> Option<Verdict> {
        Action::from_server_command(line).map(|action| self.gate.check(player_id, &action))
    }

    /// A plugin message on `channel`. Only legacy transfer requests are
    /// gated; the target isn't read, so they need authentication even when
    /// aimed at the lobby.
    pub fn check_legacy_message(&self, player_id: &PlayerId, channel: &str, payload: &[u8]) -> Verdict {
        if ChannelName::parse(channel) != Some(ChannelName::Legacy) {
            return Verdict::Allow;
        }
        let request = match LegacyRequest::parse(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(%player_id, error = %e, "unreadable legacy message passed through");
                return Verdict::Allow;
            }
        };
        if !request.sub_command.is_transfer() || self.store.is_authenticated(player_id) {
            return Verdict::Allow;
        }
        debug!(%player_id, sub_command = ?request.sub_command, "legacy transfer blocked");
        Verdict::Deny {
            reason: DenyReason::NotAuthenticated,
            message: Some(LEGACY_DENIED.to_string()),
        }
    }

    /// Stops the inbound loop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(()).await;
    }
}

impl std::fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("node_id", &self.node_id)
            .field("players", &self.store.len())
            .finish_non_exhaustive()
    }
}
