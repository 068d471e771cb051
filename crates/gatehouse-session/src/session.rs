//! Session types: what one node tells the others about a player.
//!
//! A "session" here is a *fact*, not a connection: "identity X was verified
//! (or not) on node N at time T". Nodes exchange these so a player who
//! logged in on the lobby can walk into survival without typing their
//! password again.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gatehouse_protocol::{NodeId, PlayerIdentity, SessionUpdate};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// How long remote sessions are trusted.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A cached session older than this (by its origin timestamp) is
    /// treated as absent. Default: one hour.
    pub ttl: Duration,
    /// How often the node sweeps stale entries out of the cache.
    /// Default: 60 seconds.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A propagated authentication fact about one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Who the fact is about.
    pub identity: PlayerIdentity,
    /// `true` = authenticated; `false` = a tombstone that overrides any
    /// older verified session.
    pub verified: bool,
    /// Epoch millis at which the originating node observed the fact.
    pub origin_timestamp: i64,
    /// The node that observed it.
    pub source_node: NodeId,
}

impl Session {
    /// Builds a session from a decoded wire message and the node that
    /// published it.
    pub fn from_update(update: SessionUpdate, source_node: NodeId) -> Self {
        Self {
            identity: PlayerIdentity::new(update.identity_id, update.username),
            verified: update.verified,
            origin_timestamp: update.timestamp,
            source_node,
        }
    }

    /// The wire form of this session.
    pub fn to_update(&self) -> SessionUpdate {
        SessionUpdate {
            identity_id: self.identity.id,
            username: self.identity.display_name.clone(),
            verified: self.verified,
            timestamp: self.origin_timestamp,
        }
    }

    /// Whether the session is older than `ttl` at `now_ms`.
    ///
    /// A session stamped after `now_ms` can't be trusted to age out, so it
    /// counts as stale too.
    pub fn is_stale(&self, now_ms: i64, ttl: Duration) -> bool {
        if self.origin_timestamp > now_ms {
            return true;
        }
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.origin_timestamp) > ttl_ms
    }
}

/// Current wall-clock time in epoch milliseconds.
///
/// Session timestamps cross process boundaries, so they use the wall clock
/// rather than a monotonic `Instant`.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
