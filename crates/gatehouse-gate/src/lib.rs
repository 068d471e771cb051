//! Action gating for Gatehouse.
//!
//! Until a player authenticates they are "frozen": they can look around,
//! type `/login` or `/register`, and walk back to the lobby, but nothing
//! else. This crate decides, for one player and one attempted [`Action`],
//! whether the action goes through.
//!
//! # Key types
//!
//! - [`Action`]: everything a player can attempt, as one typed enum
//! - [`GateRule`]: how one [`ActionKind`] is treated while unauthenticated
//! - [`GateEnforcer`]: the single entry point; consults the
//!   [`AuthStateStore`](gatehouse_session::AuthStateStore), dispatches to
//!   the registered rule, and words the denial
//! - [`GateConfig`] / [`GateMode`]: allow-list, lobby name, fail-closed
//!
//! Gate checks are plain synchronous reads. They can run on any task.

mod action;
mod config;
mod enforcer;
mod rules;

pub use action::{Action, ActionKind, Location, Position};
pub use config::{GateConfig, GateMode};
pub use enforcer::{DenyReason, GateEnforcer, Verdict};
pub use rules::{
    ChatRule, CommandAllowList, CommandRule, DamageRule, GateRule, InteractRule, MoveRule,
    Notice, RuleOutcome, TransferRule,
};
