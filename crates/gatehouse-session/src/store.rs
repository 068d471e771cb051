//! The authentication state store: one node's view of its own players.
//!
//! Every connected player has exactly one [`AuthEntry`] here, created on
//! connect and removed on disconnect. The entry holds the player's
//! [`AuthState`] *and* their verification timer, so
//! [`mark_authenticated`](AuthStateStore::mark_authenticated) can flip the
//! state and cancel the timer in one critical section. No caller can ever
//! observe "authenticated, timer still running".
//!
//! # Sharing
//!
//! The store is created once per node and shared as `Arc<AuthStateStore>`
//! with everything that needs it (gate, login glue, main loop). There is no
//! global instance.
//!
//! # Lifecycle of an entry
//!
//! ```text
//! connect() ──→ [Unauthenticated] ──start_timer()──→ [Unauthenticated + Running]
//!                     │                                         │
//!                     │ mark_authenticated()                    │ advance_timers()
//!                     ▼                                         ▼
//!               [Authenticated]                          Expired → removed
//!                     │
//!                     ▼
//!              disconnect() → removed
//! ```

use std::collections::HashMap;

use gatehouse_protocol::{PlayerId, PlayerIdentity};
use gatehouse_tick::{
    CancelOutcome, CancelReason, TimerEvent, TimerSchedule, TimerState, VerificationTimer,
};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

/// Whether a player may play on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

/// Everything this node knows about one connected player.
#[derive(Debug, Clone)]
pub struct AuthEntry {
    pub identity: PlayerIdentity,
    pub state: AuthState,
    /// Whether the credential store knows the player. `None` until the
    /// node has asked; chooses between "please /login" and "please
    /// /register" hints.
    pub registered: Option<bool>,
    pub timer: Option<VerificationTimer>,
}

impl AuthEntry {
    fn new(identity: PlayerIdentity) -> Self {
        Self {
            identity,
            state: AuthState::Unauthenticated,
            registered: None,
            timer: None,
        }
    }

    fn cancel_timer(&mut self) -> Option<CancelOutcome> {
        self.timer.as_mut().map(VerificationTimer::cancel)
    }

    fn timer_running(&self) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|t| t.state() == TimerState::Running)
    }
}

/// Per-node authentication state, keyed by [`PlayerId`].
pub struct AuthStateStore {
    entries: Mutex<HashMap<PlayerId, AuthEntry>>,
    schedule: RwLock<TimerSchedule>,
}

impl Default for AuthStateStore {
    fn default() -> Self {
        Self::new(TimerSchedule::default())
    }
}

impl AuthStateStore {
    /// Creates an empty store whose timers follow `schedule`.
    pub fn new(schedule: TimerSchedule) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            schedule: RwLock::new(schedule.validated()),
        }
    }

    /// Replaces the schedule for timers started from now on.
    pub fn set_schedule(&self, schedule: TimerSchedule) {
        *self.schedule.write() = schedule.validated();
    }

    // -- connection lifecycle ---------------------------------------------

    /// Records a newly connected player as unauthenticated.
    ///
    /// A leftover entry for the same id (a reconnect that raced the old
    /// disconnect) is replaced and its timer cancelled.
    pub fn connect(&self, identity: PlayerIdentity) {
        let id = identity.id;
        let previous = self.entries.lock().insert(id, AuthEntry::new(identity));
        if let Some(mut old) = previous {
            old.cancel_timer();
            tracing::debug!(player_id = %id, "replaced stale auth entry");
        }
    }

    /// Forgets a player. Returns the removed entry, its timer cancelled.
    pub fn disconnect(&self, id: &PlayerId) -> Option<AuthEntry> {
        let mut entry = self.entries.lock().remove(id)?;
        entry.cancel_timer();
        Some(entry)
    }

    // -- authentication state ---------------------------------------------

    /// Marks `id` authenticated and cancels its timer, atomically.
    ///
    /// Returns `true` only on the transition; `false` if the player was
    /// already authenticated or isn't connected here.
    pub fn mark_authenticated(&self, id: &PlayerId) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        if entry.state == AuthState::Authenticated {
            return false;
        }
        entry.state = AuthState::Authenticated;
        entry.registered = Some(true);
        entry.cancel_timer();
        true
    }

    /// Marks `id` unauthenticated. Returns `true` on the transition.
    ///
    /// Does not start a timer; callers that want one call
    /// [`start_timer`](Self::start_timer).
    pub fn mark_unauthenticated(&self, id: &PlayerId) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(id) {
            Some(entry) if entry.state == AuthState::Authenticated => {
                entry.state = AuthState::Unauthenticated;
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is authenticated here. Unknown ids never are.
    pub fn is_authenticated(&self, id: &PlayerId) -> bool {
        self.entries
            .lock()
            .get(id)
            .is_some_and(|e| e.state == AuthState::Authenticated)
    }

    /// Records what the credential store said about registration.
    pub fn set_registered(&self, id: &PlayerId, registered: bool) {
        if let Some(entry) = self.entries.lock().get_mut(id) {
            entry.registered = Some(registered);
        }
    }

    /// Whether `id` is known to be registered, if we've asked.
    pub fn registered(&self, id: &PlayerId) -> Option<bool> {
        self.entries.lock().get(id).and_then(|e| e.registered)
    }

    // -- timers -----------------------------------------------------------

    /// Starts (or restarts) the verification timer for `id` at `now`.
    ///
    /// Returns `false` and does nothing if the player is unknown or
    /// already authenticated.
    pub fn start_timer(&self, id: &PlayerId, now: Instant) -> bool {
        let schedule = self.schedule.read().clone();
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        if entry.state == AuthState::Authenticated {
            return false;
        }
        let mut timer = VerificationTimer::new(*id, schedule);
        timer.start(now);
        if let Some(mut old) = entry.timer.replace(timer) {
            old.cancel();
        }
        tracing::debug!(player_id = %id, "verification timer started");
        true
    }

    /// Cancels the timer for `id`. Idempotent: cancelling a finished timer
    /// reports [`CancelOutcome::AlreadyFinished`]. `None` if there is no
    /// timer.
    pub fn cancel_timer(&self, id: &PlayerId) -> Option<CancelOutcome> {
        self.entries.lock().get_mut(id)?.cancel_timer()
    }

    /// The state of the timer for `id`, if one exists.
    pub fn timer_state(&self, id: &PlayerId) -> Option<TimerState> {
        self.entries
            .lock()
            .get(id)
            .and_then(|e| e.timer.as_ref().map(VerificationTimer::state))
    }

    /// Advances every running timer to `now`.
    ///
    /// For each running timer, in order:
    /// 1. the player's connection is gone (`is_connected` says no) →
    ///    cancelled, entry removed;
    /// 2. the player is authenticated → cancelled;
    /// 3. otherwise the timer advances; an expired timer's entry is
    ///    removed.
    pub fn advance_timers(
        &self,
        now: Instant,
        is_connected: impl Fn(&PlayerId) -> bool,
    ) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        let mut gone = Vec::new();
        let mut entries = self.entries.lock();

        for (id, entry) in entries.iter_mut() {
            if !entry.timer_running() {
                continue;
            }
            let Some(timer) = entry.timer.as_mut() else {
                continue;
            };

            if !is_connected(id) {
                timer.cancel();
                events.push(TimerEvent::Cancelled {
                    player: *id,
                    reason: CancelReason::Disconnected,
                });
                gone.push(*id);
            } else if entry.state == AuthState::Authenticated {
                timer.cancel();
                events.push(TimerEvent::Cancelled {
                    player: *id,
                    reason: CancelReason::Authenticated,
                });
            } else if let Some(event) = timer.advance(now) {
                if matches!(event, TimerEvent::Expired { .. }) {
                    gone.push(*id);
                }
                events.push(event);
            }
        }

        for id in gone {
            entries.remove(&id);
        }
        events
    }

    // -- inspection -------------------------------------------------------

    /// A copy of the entry for `id`.
    pub fn snapshot(&self, id: &PlayerId) -> Option<AuthEntry> {
        self.entries.lock().get(id).cloned()
    }

    /// The identity connected under `id`.
    pub fn identity(&self, id: &PlayerId) -> Option<PlayerIdentity> {
        self.entries.lock().get(id).map(|e| e.identity.clone())
    }

    /// Whether `id` has an entry.
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Ids of every authenticated player.
    pub fn authenticated_ids(&self) -> Vec<PlayerId> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| e.state == AuthState::Authenticated)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of connected players.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
