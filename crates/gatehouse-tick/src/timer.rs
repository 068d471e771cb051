//! The verification deadline as a state machine.
//!
//! ```text
//!            start()             now >= deadline
//!   Idle ───────────────▶ Running ───────────────▶ Expired
//!                            │
//!                            │ cancel(reason)
//!                            ▼
//!                        Cancelled
//! ```
//!
//! A timer never touches the clock itself. [`VerificationTimer::advance`]
//! takes the current instant and returns at most one [`TimerEvent`]
//! describing what the player should be told, so a test can walk a timer
//! through five minutes in a handful of calls.

use std::time::Duration;

use gatehouse_protocol::PlayerId;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// How long a player has and when they are reminded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSchedule {
    /// Time from start to expiry. Default: 300 s.
    pub deadline: Duration,
    /// Remaining-time marks (in seconds) at which a warning is announced.
    /// Default: 240, 180, 120, 60, 30.
    pub warning_thresholds_secs: Vec<u64>,
    /// Once remaining time drops to this many seconds, every second is
    /// announced. Default: 10.
    pub countdown_from_secs: u64,
}

impl Default for TimerSchedule {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(300),
            warning_thresholds_secs: vec![240, 180, 120, 60, 30],
            countdown_from_secs: 10,
        }
    }
}

impl TimerSchedule {
    /// Longest deadline accepted. Longer ones are capped.
    pub const MAX_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

    /// Normalizes the schedule.
    ///
    /// - a zero deadline is raised to one second, one past
    ///   [`MAX_DEADLINE`](Self::MAX_DEADLINE) is lowered to it;
    /// - thresholds at or beyond the deadline, or zero, are dropped;
    /// - thresholds are sorted descending without duplicates;
    /// - the countdown start is capped at the deadline.
    pub fn validated(mut self) -> Self {
        if self.deadline.is_zero() {
            tracing::warn!("verification deadline of zero, using one second");
            self.deadline = Duration::from_secs(1);
        }
        if self.deadline > Self::MAX_DEADLINE {
            tracing::warn!(
                deadline_secs = self.deadline.as_secs(),
                "verification deadline too long, capping"
            );
            self.deadline = Self::MAX_DEADLINE;
        }
        let limit = self.deadline.as_secs();
        self.warning_thresholds_secs
            .retain(|&secs| secs > 0 && secs < limit);
        self.warning_thresholds_secs.sort_unstable_by(|a, b| b.cmp(a));
        self.warning_thresholds_secs.dedup();
        self.countdown_from_secs = self.countdown_from_secs.min(limit);
        self
    }
}

// ---------------------------------------------------------------------------
// State and events
// ---------------------------------------------------------------------------

/// Where a timer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Created but not started.
    Idle,
    /// Counting down to its deadline.
    Running,
    /// Stopped before the deadline. Terminal.
    Cancelled,
    /// The deadline passed. Terminal.
    Expired,
}

impl TimerState {
    /// `true` for `Cancelled` and `Expired`.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired)
    }
}

/// Why a timer was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The player authenticated.
    Authenticated,
    /// The player's connection went away.
    Disconnected,
    /// A new timer replaced this one.
    Restarted,
}

/// Result of [`VerificationTimer::cancel`].
///
/// Cancellation can race with expiry (the tick expires the timer while a
/// login is completing). Losing that race is a normal outcome, reported
/// as [`AlreadyFinished`](Self::AlreadyFinished), never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The timer was running and is now cancelled.
    Cancelled,
    /// The timer had not started; it is now cancelled.
    NotStarted,
    /// The timer had already expired or been cancelled. Nothing changed.
    AlreadyFinished(TimerState),
}

/// Something the owning player should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A warning threshold was crossed.
    Warning {
        player: PlayerId,
        remaining_secs: u64,
    },
    /// One second of the final countdown.
    Countdown {
        player: PlayerId,
        remaining_secs: u64,
    },
    /// The deadline passed; the player must be disconnected.
    Expired { player: PlayerId },
    /// The timer stopped before its deadline.
    Cancelled {
        player: PlayerId,
        reason: CancelReason,
    },
}

impl TimerEvent {
    /// The player this event concerns.
    pub fn player(&self) -> PlayerId {
        match self {
            Self::Warning { player, .. }
            | Self::Countdown { player, .. }
            | Self::Expired { player }
            | Self::Cancelled { player, .. } => *player,
        }
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// One player's verification deadline on one node.
#[derive(Debug, Clone)]
pub struct VerificationTimer {
    player: PlayerId,
    schedule: TimerSchedule,
    deadline: Option<Instant>,
    /// Thresholds (seconds) already announced, including ones skipped over.
    warnings_sent: Vec<u64>,
    /// Lowest countdown second announced so far.
    last_countdown: Option<u64>,
    state: TimerState,
}

impl VerificationTimer {
    /// Creates an `Idle` timer for `player`.
    pub fn new(player: PlayerId, schedule: TimerSchedule) -> Self {
        Self {
            player,
            schedule: schedule.validated(),
            deadline: None,
            warnings_sent: Vec::new(),
            last_countdown: None,
            state: TimerState::Idle,
        }
    }

    /// Starts the countdown at `now`. Calling this on a running timer
    /// restarts it from scratch.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.schedule.deadline);
        self.warnings_sent.clear();
        self.last_countdown = None;
        self.state = TimerState::Running;
    }

    /// Stops the timer. Idempotent.
    pub fn cancel(&mut self) -> CancelOutcome {
        match self.state {
            TimerState::Running => {
                self.state = TimerState::Cancelled;
                CancelOutcome::Cancelled
            }
            TimerState::Idle => {
                self.state = TimerState::Cancelled;
                CancelOutcome::NotStarted
            }
            finished => CancelOutcome::AlreadyFinished(finished),
        }
    }

    /// Moves the timer forward to `now`.
    ///
    /// Returns the single event the player should see, if any. When a late
    /// call skips past several thresholds they are all marked as sent but
    /// only the lowest one is announced.
    pub fn advance(&mut self, now: Instant) -> Option<TimerEvent> {
        if self.state != TimerState::Running {
            return None;
        }
        let deadline = self.deadline?;

        if now >= deadline {
            self.state = TimerState::Expired;
            return Some(TimerEvent::Expired {
                player: self.player,
            });
        }

        let remaining_secs = ceil_secs(deadline - now);

        if remaining_secs <= self.schedule.countdown_from_secs {
            // Any warning thresholds inside the countdown window are
            // covered by the countdown itself.
            self.mark_thresholds_reached(remaining_secs);
            if self.last_countdown.is_none_or(|last| remaining_secs < last) {
                self.last_countdown = Some(remaining_secs);
                return Some(TimerEvent::Countdown {
                    player: self.player,
                    remaining_secs,
                });
            }
            return None;
        }

        if self.mark_thresholds_reached(remaining_secs) {
            return Some(TimerEvent::Warning {
                player: self.player,
                remaining_secs,
            });
        }
        None
    }

    /// Records every unsent threshold at or above `remaining_secs`.
    /// Returns `true` if any was newly reached.
    fn mark_thresholds_reached(&mut self, remaining_secs: u64) -> bool {
        let mut reached = false;
        for &threshold in &self.schedule.warning_thresholds_secs {
            if remaining_secs <= threshold && !self.warnings_sent.contains(&threshold) {
                self.warnings_sent.push(threshold);
                reached = true;
            }
        }
        reached
    }

    /// Time left before expiry, or `None` if the timer isn't running.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match (self.state, self.deadline) {
            (TimerState::Running, Some(deadline)) => {
                Some(deadline.saturating_duration_since(now))
            }
            _ => None,
        }
    }

    /// The player this timer belongs to.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Current state.
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// The deadline, once started.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Thresholds announced (or skipped over) so far.
    pub fn warnings_sent(&self) -> &[u64] {
        &self.warnings_sent
    }
}

/// Whole seconds, rounded up, so a tick a few milliseconds after a
/// threshold still reports the threshold value.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
