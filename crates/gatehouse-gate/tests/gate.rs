//! The gate as a node uses it: one store shared between the gate and the
//! login flow, state flipping underneath the enforcer.

use std::sync::Arc;

use gatehouse_gate::{
    Action, ActionKind, DenyReason, GateConfig, GateEnforcer, GateMode, GateRule, Location,
    Notice, Position, RuleOutcome, Verdict,
};
use gatehouse_protocol::{PlayerId, PlayerIdentity};
use gatehouse_session::AuthStateStore;

fn joined(store: &AuthStateStore, name: &str) -> PlayerId {
    let id = PlayerId::random();
    store.connect(PlayerIdentity::new(id, name));
    id
}

fn command(line: &str) -> Action {
    Action::Command { line: line.into() }
}

// ============================================================================
// Frozen until login
// ============================================================================

#[test]
fn test_login_unfreezes_player() {
    let store = Arc::new(AuthStateStore::default());
    let gate = GateEnforcer::new(Arc::clone(&store), &GateConfig::default(), GateMode::Normal);
    let id = joined(&store, "Alex");

    let chat = Action::Chat {
        message: "hello".into(),
    };
    assert!(!gate.check(&id, &chat).is_allowed());
    assert!(gate.check(&id, &command("/login hunter2")).is_allowed());

    store.mark_authenticated(&id);
    assert!(gate.check(&id, &chat).is_allowed());
    assert!(gate.check(&id, &command("/home")).is_allowed());

    store.mark_unauthenticated(&id);
    assert!(!gate.check(&id, &chat).is_allowed());
}

#[test]
fn test_unauthenticated_transfer_only_to_lobby() {
    let store = Arc::new(AuthStateStore::default());
    let config = GateConfig {
        lobby_server: "hub".into(),
        ..GateConfig::default()
    };
    let gate = GateEnforcer::new(Arc::clone(&store), &config, GateMode::Normal);
    let id = joined(&store, "Alex");

    let via = |line: &str| Action::from_server_command(line).unwrap();
    assert!(gate.check(&id, &via("server HUB")).is_allowed());
    assert!(!gate.check(&id, &via("server survival")).is_allowed());
    assert!(!gate.check(&id, &via("server")).is_allowed());
}

#[test]
fn test_silent_denials_have_no_message() {
    let store = Arc::new(AuthStateStore::default());
    let gate = GateEnforcer::new(Arc::clone(&store), &GateConfig::default(), GateMode::Normal);
    let id = joined(&store, "Alex");

    for action in [Action::Interact, Action::Damage] {
        assert_eq!(
            gate.check(&id, &action),
            Verdict::Deny {
                reason: DenyReason::NotAuthenticated,
                message: None,
            }
        );
    }
}

#[test]
fn test_looking_around_is_allowed() {
    let store = Arc::new(AuthStateStore::default());
    let gate = GateEnforcer::new(Arc::clone(&store), &GateConfig::default(), GateMode::Normal);
    let id = joined(&store, "Alex");

    let here = Location::at(Position::new(10.0, 70.0, -4.0));
    let turn = Action::Move {
        from: here,
        to: here.facing(180.0, -30.0),
    };
    assert!(gate.check(&id, &turn).is_allowed());
}

// ============================================================================
// Custom rules
// ============================================================================

/// Lets chat through so new players can ask for help.
struct OpenChat;

impl GateRule for OpenChat {
    fn kind(&self) -> ActionKind {
        ActionKind::Chat
    }

    fn evaluate(&self, _action: &Action) -> RuleOutcome {
        RuleOutcome::Allow
    }
}

/// Announces interaction denials instead of dropping them silently.
struct NoisyInteract;

impl GateRule for NoisyInteract {
    fn kind(&self) -> ActionKind {
        ActionKind::Interact
    }

    fn evaluate(&self, _action: &Action) -> RuleOutcome {
        RuleOutcome::Deny(Notice::Hint)
    }
}

#[test]
fn test_registered_rule_replaces_default() {
    let store = Arc::new(AuthStateStore::default());
    let mut gate = GateEnforcer::new(Arc::clone(&store), &GateConfig::default(), GateMode::Normal);
    let id = joined(&store, "Alex");

    gate.register(OpenChat);
    gate.register(NoisyInteract);

    assert!(
        gate.check(&id, &Action::Chat {
            message: "how do I register?".into()
        })
        .is_allowed()
    );
    assert!(gate.check(&id, &Action::Interact).message().is_some());
}

#[test]
fn test_fail_closed_keeps_allow_list_open() {
    let store = Arc::new(AuthStateStore::default());
    let gate = GateEnforcer::new(Arc::clone(&store), &GateConfig::default(), GateMode::FailClosed);
    let id = joined(&store, "Alex");

    assert!(gate.check(&id, &command("register")).is_allowed());
    assert!(!gate.check(&id, &command("spawn")).is_allowed());
    assert!(
        !gate
            .check(&id, &Action::Transfer {
                target: Some("lobby".into())
            })
            .is_allowed()
    );
}
