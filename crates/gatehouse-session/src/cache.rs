//! The session cache: what other nodes have told us.
//!
//! Every node keeps the most recent [`Session`] it has heard for each
//! identity. Conflicts are resolved **last-write-wins by origin
//! timestamp**, and unverified sessions are kept as tombstones, so the
//! final state never depends on the order messages arrived in:
//!
//! ```text
//! arrives T1(verified) then T2(unverified)  →  T2 (not verified)
//! arrives T2(unverified) then T1(verified)  →  T2 (T1 is older, dropped)
//! ```
//!
//! Entries older than the TTL are treated as absent on lookup and removed.
//!
//! # Concurrency
//!
//! Backed by a `DashMap`: gate checks read the cache from whatever task
//! they run on while the node's main loop writes to it.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use gatehouse_protocol::PlayerId;

use crate::{Session, SessionConfig};

/// What [`SessionCache::apply`] did with an incoming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No entry existed (or it had gone stale); the session was stored.
    Inserted,
    /// The session was newer than the stored one and replaced it.
    Replaced,
    /// The stored entry was as new or newer. Nothing changed.
    Outdated,
    /// The session itself was already past its TTL. Nothing changed.
    Expired,
}

impl ApplyOutcome {
    /// `true` if the cache changed.
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced)
    }
}

/// Sessions received from other nodes, keyed by identity.
pub struct SessionCache {
    entries: DashMap<PlayerId, Session>,
    ttl: Duration,
}

impl SessionCache {
    /// Creates an empty cache.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl,
        }
    }

    /// Merges `session` into the cache, last-write-wins.
    ///
    /// An incoming session with the *same* timestamp as the stored one is
    /// discarded: the first writer is kept.
    ///
    /// A session stamped ahead of `now_ms` (a peer with a fast clock) is
    /// stored as if it had been observed at `now_ms`. It still ages out
    /// after the TTL and a later update can still override it.
    pub fn apply(&self, mut session: Session, now_ms: i64) -> ApplyOutcome {
        if session.origin_timestamp > now_ms {
            tracing::debug!(
                player_id = %session.identity.id,
                origin = session.origin_timestamp,
                now = now_ms,
                "session stamped in the future, clamping to local clock"
            );
            session.origin_timestamp = now_ms;
        }
        if session.is_stale(now_ms, self.ttl) {
            tracing::debug!(
                player_id = %session.identity.id,
                origin = session.origin_timestamp,
                "discarding session older than ttl"
            );
            return ApplyOutcome::Expired;
        }

        match self.entries.entry(session.identity.id) {
            Entry::Vacant(slot) => {
                slot.insert(session);
                ApplyOutcome::Inserted
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if current.is_stale(now_ms, self.ttl) {
                    slot.insert(session);
                    ApplyOutcome::Inserted
                } else if session.origin_timestamp > current.origin_timestamp {
                    slot.insert(session);
                    ApplyOutcome::Replaced
                } else {
                    tracing::debug!(
                        player_id = %session.identity.id,
                        incoming = session.origin_timestamp,
                        stored = current.origin_timestamp,
                        "discarding outdated session"
                    );
                    ApplyOutcome::Outdated
                }
            }
        }
    }

    /// The live session for `id`, if any. A stale entry is evicted and
    /// reported as absent.
    pub fn get(&self, id: &PlayerId, now_ms: i64) -> Option<Session> {
        {
            let entry = self.entries.get(id)?;
            if !entry.is_stale(now_ms, self.ttl) {
                return Some(entry.value().clone());
            }
        }
        // The read guard is gone; re-check under the write lock since a
        // fresh session may have landed in between.
        self.entries
            .remove_if(id, |_, s| s.is_stale(now_ms, self.ttl));
        None
    }

    /// Whether a live, verified session exists for `id`.
    pub fn is_verified(&self, id: &PlayerId, now_ms: i64) -> bool {
        self.get(id, now_ms).is_some_and(|s| s.verified)
    }

    /// Removes every stale entry. Returns how many were removed.
    pub fn evict_stale(&self, now_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, s| !s.is_stale(now_ms, self.ttl));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "evicted stale sessions");
        }
        removed
    }

    /// Drops the entry for `id`, locally only.
    pub fn invalidate(&self, id: &PlayerId) -> Option<Session> {
        self.entries.remove(id).map(|(_, s)| s)
    }

    /// Drops everything (configuration reload).
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// One-line description of the entry for `id`, for debug commands.
    pub fn describe(&self, id: &PlayerId, now_ms: i64) -> String {
        match self.entries.get(id) {
            None => format!("{id}: no session"),
            Some(s) => {
                let age_secs = now_ms.saturating_sub(s.origin_timestamp) / 1000;
                let stale = if s.is_stale(now_ms, self.ttl) {
                    ", stale"
                } else {
                    ""
                };
                format!(
                    "{}: verified={} from {} {}s ago{stale}",
                    s.identity, s.verified, s.source_node, age_secs
                )
            }
        }
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
