//! Per-action rules for unauthenticated players.
//!
//! Each [`GateRule`] answers one question: "an unauthenticated player tried
//! this, may they?" The enforcer owns the rules in a map keyed by
//! [`ActionKind`], so swapping the treatment of one action never touches
//! the others.

use std::collections::HashSet;
use std::sync::Arc;

use crate::action::{Action, ActionKind};

/// How a denial should be announced to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Tell them how to log in or register.
    Hint,
    /// Tell them they need to verify before leaving the lobby.
    TransferHint,
    /// Say nothing. Used where a message per event would spam the player.
    Silent,
}

/// What a rule decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Allow,
    Deny(Notice),
}

/// How one kind of action is treated while a player is unauthenticated.
pub trait GateRule: Send + Sync + 'static {
    /// Which actions this rule handles.
    fn kind(&self) -> ActionKind;

    /// Decide for one action. Only called with actions of [`kind`](Self::kind).
    fn evaluate(&self, action: &Action) -> RuleOutcome;
}

// ---------------------------------------------------------------------------
// Command allow-list
// ---------------------------------------------------------------------------

/// The commands usable without authenticating.
///
/// Names are compared case-insensitively, on the first word of the line,
/// with any leading `/` stripped. `"/LOGIN 123456"` matches `login`;
/// `"loginhelper"` does not.
#[derive(Debug, Clone, Default)]
pub struct CommandAllowList {
    names: Arc<HashSet<String>>,
}

impl CommandAllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().trim_start_matches('/').to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Self {
            names: Arc::new(names),
        }
    }

    /// Whether the typed `line` invokes an allowed command.
    pub fn permits(&self, line: &str) -> bool {
        command_name(line)
            .map(|name| self.names.contains(&name.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The first word of a command line, without its `/`.
fn command_name(line: &str) -> Option<&str> {
    line.trim()
        .trim_start_matches('/')
        .split_whitespace()
        .next()
}

// ---------------------------------------------------------------------------
// Built-in rules
// ---------------------------------------------------------------------------

/// Blocks walking. Turning the head in place is fine.
#[derive(Debug, Default)]
pub struct MoveRule;

impl GateRule for MoveRule {
    fn kind(&self) -> ActionKind {
        ActionKind::Move
    }

    fn evaluate(&self, action: &Action) -> RuleOutcome {
        match action {
            Action::Move { from, to } if from.position == to.position => RuleOutcome::Allow,
            _ => RuleOutcome::Deny(Notice::Hint),
        }
    }
}

/// Blocks chat, with a hint each time.
#[derive(Debug, Default)]
pub struct ChatRule;

impl GateRule for ChatRule {
    fn kind(&self) -> ActionKind {
        ActionKind::Chat
    }

    fn evaluate(&self, _action: &Action) -> RuleOutcome {
        RuleOutcome::Deny(Notice::Hint)
    }
}

/// Blocks world interaction without a message.
#[derive(Debug, Default)]
pub struct InteractRule;

impl GateRule for InteractRule {
    fn kind(&self) -> ActionKind {
        ActionKind::Interact
    }

    fn evaluate(&self, _action: &Action) -> RuleOutcome {
        RuleOutcome::Deny(Notice::Silent)
    }
}

/// Frozen players don't take damage either.
#[derive(Debug, Default)]
pub struct DamageRule;

impl GateRule for DamageRule {
    fn kind(&self) -> ActionKind {
        ActionKind::Damage
    }

    fn evaluate(&self, _action: &Action) -> RuleOutcome {
        RuleOutcome::Deny(Notice::Silent)
    }
}

/// Lets allow-listed commands through and blocks the rest.
#[derive(Debug, Clone)]
pub struct CommandRule {
    allowed: CommandAllowList,
}

impl CommandRule {
    pub fn new(allowed: CommandAllowList) -> Self {
        Self { allowed }
    }
}

impl GateRule for CommandRule {
    fn kind(&self) -> ActionKind {
        ActionKind::Command
    }

    fn evaluate(&self, action: &Action) -> RuleOutcome {
        match action {
            Action::Command { line } if self.allowed.permits(line) => RuleOutcome::Allow,
            _ => RuleOutcome::Deny(Notice::Hint),
        }
    }
}

/// Only the lobby is reachable. A transfer without a target is denied,
/// since it can't be shown to lead to the lobby.
#[derive(Debug, Clone)]
pub struct TransferRule {
    lobby: String,
}

impl TransferRule {
    pub fn new(lobby: impl Into<String>) -> Self {
        Self {
            lobby: lobby.into(),
        }
    }
}

impl GateRule for TransferRule {
    fn kind(&self) -> ActionKind {
        ActionKind::Transfer
    }

    fn evaluate(&self, action: &Action) -> RuleOutcome {
        match action {
            Action::Transfer {
                target: Some(target),
            } if target.eq_ignore_ascii_case(&self.lobby) => RuleOutcome::Allow,
            _ => RuleOutcome::Deny(Notice::TransferHint),
        }
    }
}
