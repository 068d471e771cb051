//! The session channel: how backends tell each other who is verified.
//!
//! Outgoing, a [`SessionChannel`] encodes facts and hands them to the
//! [`Outbound`] transport on a spawned task. The caller never waits and
//! never sees a failure: a lost broadcast only means the player logs in
//! again on the next server.
//!
//! Incoming, [`on_receive`](SessionChannel::on_receive) decodes a payload,
//! applies it to the [`SessionCache`] last-write-wins, and if the session
//! is verified and the player is connected here, authenticates them on
//! this node too.

use std::sync::Arc;

use gatehouse_protocol::{
    ChannelMessage, ChannelName, PlayerId, PlayerIdentity, SessionUpdate, SetAuthenticated,
    WireFormat,
};
use gatehouse_session::{ApplyOutcome, AuthStateStore, Session, SessionCache};
use gatehouse_transport::{Inbound, Outbound};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What an inbound payload amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A session update reached the cache.
    Session {
        player: PlayerId,
        outcome: ApplyOutcome,
        /// The player is connected here and was authenticated by it.
        promoted: bool,
    },
    /// Not for this node, or undecodable. Already logged.
    Ignored,
}

/// Publishes and absorbs session facts for one node.
pub struct SessionChannel<O: Outbound> {
    outbound: Arc<O>,
    cache: Arc<SessionCache>,
    store: Arc<AuthStateStore>,
}

impl<O: Outbound> Clone for SessionChannel<O> {
    fn clone(&self) -> Self {
        Self {
            outbound: Arc::clone(&self.outbound),
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
        }
    }
}

impl<O: Outbound> SessionChannel<O> {
    pub fn new(outbound: Arc<O>, cache: Arc<SessionCache>, store: Arc<AuthStateStore>) -> Self {
        Self {
            outbound,
            cache,
            store,
        }
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Tells every other node that `identity` is (or isn't) verified as of
    /// `timestamp` (epoch millis).
    ///
    /// Returns the handle of the publishing task. Dropping it is fine.
    pub fn broadcast(
        &self,
        identity: &PlayerIdentity,
        verified: bool,
        timestamp: i64,
    ) -> JoinHandle<()> {
        let update = SessionUpdate {
            identity_id: identity.id,
            username: identity.display_name.clone(),
            verified,
            timestamp,
        };
        self.publish(ChannelName::Session, update.into())
    }

    /// Tells the proxy that `id`'s authenticated flag changed.
    pub fn notify_proxy(&self, id: PlayerId, authenticated: bool) -> JoinHandle<()> {
        let msg = SetAuthenticated {
            identity_id: id,
            authenticated,
        };
        self.publish(ChannelName::Proxy, msg.into())
    }

    fn publish(&self, channel: ChannelName, msg: ChannelMessage) -> JoinHandle<()> {
        let outbound = Arc::clone(&self.outbound);
        tokio::spawn(async move {
            let payload = match msg.to_bytes() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(%channel, error = %e, "could not encode channel message");
                    return;
                }
            };
            if let Err(e) = outbound.publish(channel, payload).await {
                warn!(
                    node = %outbound.node_id(),
                    %channel,
                    error = %e,
                    "publish failed, message dropped"
                );
            }
        })
    }

    /// Absorbs one inbound payload. `now_ms` is the local epoch-millis
    /// clock, used for TTL checks.
    ///
    /// Only session-channel traffic is acted on. Anything else, and any
    /// payload that doesn't decode, is logged at debug and ignored.
    pub fn on_receive(&self, inbound: &Inbound, now_ms: i64) -> Received {
        if inbound.channel != ChannelName::Session {
            debug!(channel = %inbound.channel, from = %inbound.from, "ignoring non-session traffic");
            return Received::Ignored;
        }
        let update = match ChannelMessage::from_bytes(&inbound.payload) {
            Ok(ChannelMessage::SessionUpdate(update)) => update,
            Ok(other) => {
                debug!(kind = other.type_tag(), from = %inbound.from, "unexpected message on session channel");
                return Received::Ignored;
            }
            Err(e) => {
                debug!(from = %inbound.from, error = %e, "dropping malformed session message");
                return Received::Ignored;
            }
        };

        let session = Session::from_update(update, inbound.from.clone());
        let player = session.identity.id;
        let verified = session.verified;
        let outcome = self.cache.apply(session, now_ms);

        let promoted = outcome.is_applied()
            && verified
            && self.store.contains(&player)
            && self.store.mark_authenticated(&player);
        debug!(player_id = %player, from = %inbound.from, ?outcome, promoted, "session update received");

        Received::Session {
            player,
            outcome,
            promoted,
        }
    }
}
