//! The gate itself.
//!
//! [`GateEnforcer::check`] is the one question every game hook asks. The
//! answer depends on three things, in order:
//!
//! 1. the [`GateMode`]: fail-closed denies everything but allow-listed
//!    commands
//! 2. the player's state in the shared
//!    [`AuthStateStore`](gatehouse_session::AuthStateStore): authenticated
//!    players are never gated
//! 3. the [`GateRule`] registered for the action's kind; with no rule the
//!    action is denied
//!
//! The enforcer also words the denial. Players who have never registered
//! are told to `/register`; everyone else to `/login`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_protocol::PlayerId;
use gatehouse_session::AuthStateStore;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::action::{Action, ActionKind};
use crate::config::{GateConfig, GateMode};
use crate::rules::{
    ChatRule, CommandAllowList, CommandRule, DamageRule, GateRule, InteractRule, MoveRule,
    Notice, RuleOutcome, TransferRule,
};

const LOGIN_HINT: &str = "Please login first! Use /login <password>";
const REGISTER_HINT: &str = "Please register first! Use /register";
const FAIL_CLOSED_MESSAGE: &str =
    "Authentication is temporarily unavailable. Please try again later.";

/// Why an action was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    FailClosed,
}

/// The gate's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny {
        reason: DenyReason,
        /// What to tell the player. `None` means deny silently.
        message: Option<String>,
    },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The message to show, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { message, .. } => message.as_deref(),
        }
    }
}

/// Per-player rate limit on movement reminders.
///
/// Every blocked step is a denied action, and a player holding a movement
/// key produces many per second.
#[derive(Debug)]
struct NoticeThrottle {
    interval: Duration,
    last: Mutex<HashMap<PlayerId, Instant>>,
}

impl NoticeThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` and records `now` if a notice may be sent.
    fn try_acquire(&self, id: &PlayerId, now: Instant) -> bool {
        let mut last = self.last.lock();
        match last.get(id) {
            Some(prev) if now.saturating_duration_since(*prev) < self.interval => false,
            _ => {
                last.insert(*id, now);
                true
            }
        }
    }

    fn forget(&self, id: &PlayerId) {
        self.last.lock().remove(id);
    }
}

/// Decides whether a player's action goes through.
///
/// Built with the default rule set by [`new`](Self::new); individual rules
/// can be replaced with [`register`](Self::register).
pub struct GateEnforcer {
    store: Arc<AuthStateStore>,
    rules: HashMap<ActionKind, Box<dyn GateRule>>,
    mode: GateMode,
    allowed: CommandAllowList,
    website_url: String,
    move_throttle: NoticeThrottle,
}

impl GateEnforcer {
    /// An enforcer with the standard freeze rules.
    pub fn new(store: Arc<AuthStateStore>, config: &GateConfig, mode: GateMode) -> Self {
        let mut gate = Self::without_rules(store, config, mode);
        gate.register(MoveRule);
        gate.register(ChatRule);
        gate.register(InteractRule);
        gate.register(DamageRule);
        gate.register(CommandRule::new(gate.allowed.clone()));
        gate.register(TransferRule::new(config.lobby_server.clone()));
        gate
    }

    /// An enforcer with no rules: every action by an unauthenticated player
    /// is denied until rules are registered.
    pub fn without_rules(store: Arc<AuthStateStore>, config: &GateConfig, mode: GateMode) -> Self {
        Self {
            store,
            rules: HashMap::new(),
            mode,
            allowed: CommandAllowList::new(&config.allowed_commands),
            website_url: config.website_url.clone(),
            move_throttle: NoticeThrottle::new(config.move_notice_interval),
        }
    }

    /// Installs `rule`, replacing any rule for the same kind.
    pub fn register(&mut self, rule: impl GateRule) {
        self.rules.insert(rule.kind(), Box::new(rule));
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GateMode) {
        self.mode = mode;
    }

    pub fn store(&self) -> &Arc<AuthStateStore> {
        &self.store
    }

    /// Checks `action` for player `id` at the current time.
    pub fn check(&self, id: &PlayerId, action: &Action) -> Verdict {
        self.check_at(id, action, Instant::now())
    }

    /// Checks `action` for player `id`, with `now` used for reminder
    /// throttling.
    pub fn check_at(&self, id: &PlayerId, action: &Action, now: Instant) -> Verdict {
        if self.mode == GateMode::FailClosed {
            return match action {
                Action::Command { line } if self.allowed.permits(line) => Verdict::Allow,
                _ => Verdict::Deny {
                    reason: DenyReason::FailClosed,
                    message: Some(FAIL_CLOSED_MESSAGE.to_string()),
                },
            };
        }

        if self.store.is_authenticated(id) {
            return Verdict::Allow;
        }

        let kind = action.kind();
        let outcome = match self.rules.get(&kind) {
            Some(rule) => rule.evaluate(action),
            None => RuleOutcome::Deny(Notice::Silent),
        };

        match outcome {
            RuleOutcome::Allow => Verdict::Allow,
            RuleOutcome::Deny(notice) => {
                tracing::trace!(player_id = %id, action = %kind, "action denied");
                let notice = match (kind, notice) {
                    (ActionKind::Move, Notice::Hint) if !self.move_throttle.try_acquire(id, now) => {
                        Notice::Silent
                    }
                    _ => notice,
                };
                Verdict::Deny {
                    reason: DenyReason::NotAuthenticated,
                    message: self.word(id, notice),
                }
            }
        }
    }

    /// Drops per-player bookkeeping. Call when the player disconnects.
    pub fn forget(&self, id: &PlayerId) {
        self.move_throttle.forget(id);
    }

    fn word(&self, id: &PlayerId, notice: Notice) -> Option<String> {
        match notice {
            Notice::Silent => None,
            Notice::Hint => Some(self.hint_for(id).to_string()),
            Notice::TransferHint => Some(format!(
                "You must verify your account before accessing other servers. Register at {}",
                self.website_url
            )),
        }
    }

    /// The login-or-register hint for this player.
    ///
    /// Until the registration lookup answers, players are assumed to have
    /// an account.
    pub fn hint_for(&self, id: &PlayerId) -> &'static str {
        match self.store.registered(id) {
            Some(false) => REGISTER_HINT,
            _ => LOGIN_HINT,
        }
    }
}

impl std::fmt::Debug for GateEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.rules.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        f.debug_struct("GateEnforcer")
            .field("mode", &self.mode)
            .field("rules", &kinds)
            .field("allowed_commands", &self.allowed.len())
            .finish()
    }
}
