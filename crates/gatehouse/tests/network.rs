//! End-to-end tests: a proxy and two backends on an in-process hub.
//!
//! Every test runs on a paused clock. Sleeping in a test advances virtual
//! time, which drives the nodes' 1 Hz ticks without waiting for real.

use std::sync::Arc;
use std::time::Duration;

use gatehouse::prelude::*;
use gatehouse::session::{CredentialConfig, epoch_millis};
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// Helpers
// ============================================================================

struct Network {
    hub: MemoryHub,
    credentials: Arc<MemoryCredentialStore>,
    proxy: ProxyHandle,
    lobby: NodeHandle,
    survival: NodeHandle,
}

fn config(node_id: &str) -> GatehouseConfig {
    let mut config = GatehouseConfig {
        node_id: node_id.into(),
        ..GatehouseConfig::default()
    };
    config.registration.website_url = "https://play.example.com".into();
    config
}

async fn network() -> Network {
    network_with(Arc::new(MemoryCredentialStore::default())).await
}

async fn network_with(credentials: Arc<MemoryCredentialStore>) -> Network {
    let hub = MemoryHub::new();

    let (_, proxy_inbound) = hub.join("proxy");
    let proxy = ProxyNode::start(config("proxy"), proxy_inbound);

    let (link, inbound) = hub.join("lobby");
    let lobby = BackendNode::start(config("lobby"), Arc::clone(&credentials), link, inbound).await;

    let (link, inbound) = hub.join("survival");
    let survival =
        BackendNode::start(config("survival"), Arc::clone(&credentials), link, inbound).await;

    Network {
        hub,
        credentials,
        proxy,
        lobby,
        survival,
    }
}

fn player(name: &str) -> PlayerIdentity {
    PlayerIdentity::new(PlayerId::random(), name)
}

/// Polls `check` until it holds, letting spawned broadcasts run.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn drain(notices: &mut UnboundedReceiver<PlayerNotice>) -> Vec<PlayerNotice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}

fn walk() -> Action {
    Action::Move {
        from: Location::at(Position::new(0.0, 64.0, 0.0)),
        to: Location::at(Position::new(3.0, 64.0, 0.0)),
    }
}

// ============================================================================
// Frozen until login
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_never_verified_player_is_frozen() {
    let net = network().await;
    let alex = player("Alex");
    let (outcome, _notices) = net.lobby.join(alex.clone()).await.unwrap();

    assert_eq!(outcome, JoinOutcome::Pending);
    assert!(!net.lobby.is_authenticated(&alex.id));
    assert!(!net.lobby.check(&alex.id, &walk()).is_allowed());
    assert!(!net.lobby.check(&alex.id, &Action::Chat { message: "hi".into() }).is_allowed());
    assert!(!net.lobby.check(&alex.id, &Action::Command { line: "/spawn".into() }).is_allowed());
    assert!(net.lobby.check(&alex.id, &Action::Command { line: "/login x".into() }).is_allowed());
    assert_eq!(net.lobby.timer_state(&alex.id), Some(TimerState::Running));
}

#[tokio::test(start_paused = true)]
async fn test_join_sends_register_hint_to_new_player() {
    let net = network().await;
    let alex = player("Alex");
    let (_, mut notices) = net.lobby.join(alex.clone()).await.unwrap();

    let first = notices.recv().await.unwrap();
    assert_eq!(
        first,
        PlayerNotice::Message("Please register first! Use /register".into())
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_sends_login_hint_to_known_player() {
    let net = network().await;
    let alex = player("Alex");
    net.credentials.add_account(alex.id, "hunter2", true);
    let (_, mut notices) = net.lobby.join(alex.clone()).await.unwrap();

    let first = notices.recv().await.unwrap();
    assert_eq!(
        first,
        PlayerNotice::Message("Please login first! Use /login <password>".into())
    );
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_login_authenticates_once_and_broadcasts() {
    let net = network().await;
    let alex = player("Alex");
    net.credentials.add_account(alex.id, "hunter2", true);
    net.proxy.connect(alex.clone());
    let _alex_on_lobby = net.lobby.join(alex.clone()).await.unwrap();

    let before = epoch_millis();
    let outcome = net.lobby.login(alex.id, "hunter2").await.unwrap();
    assert_eq!(outcome, LoginOutcome::Authenticated(CredentialKind::Secret));
    assert!(net.lobby.is_authenticated(&alex.id));
    assert_eq!(net.lobby.timer_state(&alex.id), Some(TimerState::Cancelled));
    assert!(net.lobby.check(&alex.id, &walk()).is_allowed());

    // The survival node and the proxy hear about it.
    assert!(eventually(|| net.survival.cached_session(&alex.id).is_some()).await);
    let session = net.survival.cached_session(&alex.id).unwrap();
    assert!(session.verified);
    assert!(session.origin_timestamp >= before);
    assert_eq!(session.source_node, NodeId::new("lobby"));
    assert!(eventually(|| net.proxy.is_authenticated(&alex.id)).await);

    let again = net.lobby.login(alex.id, "hunter2").await.unwrap();
    assert_eq!(again, LoginOutcome::AlreadyAuthenticated);
}

#[tokio::test(start_paused = true)]
async fn test_failed_login_mutates_nothing() {
    let net = network().await;
    let alex = player("Alex");
    net.credentials.add_account(alex.id, "hunter2", true);
    let (_, mut notices) = net.lobby.join(alex.clone()).await.unwrap();

    let result = net.lobby.login(alex.id, "letmein").await;
    assert!(matches!(
        result.as_ref().map_err(|e| e.as_auth()),
        Err(Some(AuthError::CredentialInvalid))
    ));
    assert!(!net.lobby.is_authenticated(&alex.id));
    assert_eq!(net.lobby.timer_state(&alex.id), Some(TimerState::Running));

    let told = drain(&mut notices);
    assert!(told.contains(&PlayerNotice::Message("Incorrect password or code.".into())));
    assert!(!eventually(|| net.survival.cached_session(&alex.id).is_some()).await);
}

#[tokio::test(start_paused = true)]
async fn test_login_of_absent_player_is_not_connected() {
    let net = network().await;
    let ghost = PlayerId::random();
    let result = net.lobby.login(ghost, "hunter2").await;
    assert!(matches!(
        result.as_ref().map_err(|e| e.as_auth()),
        Err(Some(AuthError::NotConnected(id))) if *id == ghost
    ));
}

#[tokio::test(start_paused = true)]
async fn test_consumed_code_fails_on_second_use() {
    let net = network().await;
    let alex = player("Alex");
    let _alex_on_lobby = net.lobby.join(alex.clone()).await.unwrap();

    let RegisterOutcome::Issued { code, link } = net.lobby.register(alex.id).await.unwrap() else {
        panic!("expected fresh credentials");
    };
    assert!(link.starts_with("https://play.example.com/register?token="));
    net.lobby.login(alex.id, code.clone()).await.unwrap();

    // Forget the session so the next join has to log in again.
    net.lobby.leave(alex.id).await.unwrap();
    net.lobby.reload(config("lobby")).await.unwrap();
    let (outcome, _notices) = net.lobby.join(alex.clone()).await.unwrap();
    assert_eq!(outcome, JoinOutcome::Pending);

    let second = net.lobby.login(alex.id, code).await;
    assert!(second.is_err());
    assert!(!net.lobby.is_authenticated(&alex.id));
}

#[tokio::test(start_paused = true)]
async fn test_code_past_ttl_reports_expired() {
    let credentials = Arc::new(MemoryCredentialStore::new(CredentialConfig {
        ttl: Duration::from_secs(60),
        ..CredentialConfig::default()
    }));
    let net = network_with(credentials).await;
    let alex = player("Alex");
    let (_, mut notices) = net.lobby.join(alex.clone()).await.unwrap();

    let RegisterOutcome::Issued { code, .. } = net.lobby.register(alex.id).await.unwrap() else {
        panic!("expected fresh credentials");
    };
    tokio::time::sleep(Duration::from_secs(61)).await;

    let result = net.lobby.login(alex.id, code).await;
    assert!(matches!(
        result.as_ref().map_err(|e| e.as_auth()),
        Err(Some(AuthError::CredentialExpired))
    ));
    assert!(!net.lobby.is_authenticated(&alex.id));
    assert_eq!(net.lobby.timer_state(&alex.id), Some(TimerState::Running));

    let told = drain(&mut notices);
    let expected = AuthError::CredentialExpired.user_message();
    assert!(told.contains(&PlayerNotice::Message(expected.into())));
}

#[tokio::test(start_paused = true)]
async fn test_register_reply_states_configured_code_lifetime() {
    let hub = MemoryHub::new();
    let mut lobby_config = config("lobby");
    lobby_config.registration.code_ttl_secs = 600;
    let credentials = Arc::new(MemoryCredentialStore::new(lobby_config.credential_config()));
    let (link, inbound) = hub.join("lobby");
    let lobby = BackendNode::start(lobby_config, credentials, link, inbound).await;

    let alex = player("Alex");
    let (_, mut notices) = lobby.join(alex.clone()).await.unwrap();
    lobby.register(alex.id).await.unwrap();

    let told = drain(&mut notices);
    assert!(told.iter().any(|n| matches!(
        n,
        PlayerNotice::Message(m) if m.contains("valid for 10 minutes")
    )));
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_reports_try_again() {
    let net = network().await;
    let alex = player("Alex");
    net.credentials.add_account(alex.id, "hunter2", true);
    let _alex_on_lobby = net.lobby.join(alex.clone()).await.unwrap();

    net.credentials.set_available(false);
    let result = net.lobby.login(alex.id, "hunter2").await;
    assert!(matches!(
        result.as_ref().map_err(|e| e.as_auth()),
        Err(Some(AuthError::StoreUnavailable(_)))
    ));
    assert!(!net.lobby.is_authenticated(&alex.id));
}

// ============================================================================
// Verification deadline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_warns_counts_down_and_kicks() {
    let net = network().await;
    let alex = player("Alex");
    let (_, mut notices) = net.lobby.join(alex.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(305)).await;
    let told = drain(&mut notices);

    let warnings: Vec<u64> = told
        .iter()
        .filter_map(|n| match n {
            PlayerNotice::Warning { remaining_secs } => Some(*remaining_secs),
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![240, 180, 120, 60, 30]);

    let countdown: Vec<u64> = told
        .iter()
        .filter_map(|n| match n {
            PlayerNotice::Countdown { remaining_secs } => Some(*remaining_secs),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, (1..=10).rev().collect::<Vec<_>>());

    assert!(matches!(told.last(), Some(PlayerNotice::Kicked { .. })));
    assert_eq!(net.lobby.timer_state(&alex.id), None);
    assert_eq!(net.lobby.info().await.unwrap().players, 0);
    // The link was dropped with the kick.
    assert!(notices.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_login_before_deadline_prevents_kick() {
    let net = network().await;
    let alex = player("Alex");
    net.credentials.add_account(alex.id, "hunter2", true);
    let (_, mut notices) = net.lobby.join(alex.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(100)).await;
    net.lobby.login(alex.id, "hunter2").await.unwrap();
    tokio::time::sleep(Duration::from_secs(300)).await;

    let told = drain(&mut notices);
    assert!(!told.iter().any(|n| matches!(n, PlayerNotice::Kicked { .. })));
    assert!(net.lobby.is_authenticated(&alex.id));
    assert_eq!(net.lobby.info().await.unwrap().players, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_link_cancels_timer() {
    let net = network().await;
    let alex = player("Alex");
    let (_, notices) = net.lobby.join(alex.clone()).await.unwrap();
    drop(notices);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(net.lobby.timer_state(&alex.id), None);
    assert_eq!(net.lobby.info().await.unwrap().players, 0);
}

#[tokio::test(start_paused = true)]
async fn test_closed_link_of_authenticated_player_is_reaped() {
    let net = network().await;
    let alex = player("Alex");
    let bob = player("Bob");
    net.credentials.add_account(alex.id, "hunter2", true);
    let (_, alex_notices) = net.lobby.join(alex.clone()).await.unwrap();
    let (_, _bob_notices) = net.lobby.join(bob.clone()).await.unwrap();
    net.lobby.login(alex.id, "hunter2").await.unwrap();
    assert_eq!(net.lobby.timer_state(&alex.id), Some(TimerState::Cancelled));

    drop(alex_notices);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!net.lobby.is_authenticated(&alex.id));
    assert_eq!(net.lobby.timer_state(&alex.id), None);
    let info = net.lobby.info().await.unwrap();
    assert_eq!(info.players, 1);
    assert_eq!(info.authenticated, 0);
}

#[tokio::test(start_paused = true)]
async fn test_leave_clears_local_state() {
    let net = network().await;
    let alex = player("Alex");
    let _alex_on_lobby = net.lobby.join(alex.clone()).await.unwrap();

    assert!(net.lobby.leave(alex.id).await.unwrap());
    assert_eq!(net.lobby.timer_state(&alex.id), None);
    assert!(!net.lobby.leave(alex.id).await.unwrap());
}

// ============================================================================
// Cross-node propagation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_register_on_one_node_play_on_another() {
    let net = network().await;
    let p = player("P");
    let (outcome, mut notices) = net.lobby.join(p.clone()).await.unwrap();
    assert_eq!(outcome, JoinOutcome::Pending);

    // Warned at 240 s remaining.
    tokio::time::sleep(Duration::from_secs(61)).await;
    let told = drain(&mut notices);
    assert!(told.contains(&PlayerNotice::Warning { remaining_secs: 240 }));

    let RegisterOutcome::Issued { code, .. } = net.lobby.register(p.id).await.unwrap() else {
        panic!("expected fresh credentials");
    };
    let outcome = net.lobby.login(p.id, code).await.unwrap();
    assert_eq!(outcome, LoginOutcome::Authenticated(CredentialKind::OneTimeCode));
    assert_eq!(net.lobby.timer_state(&p.id), Some(TimerState::Cancelled));

    assert!(eventually(|| net.survival.cached_session(&p.id).is_some()).await);

    net.lobby.leave(p.id).await.unwrap();
    let (outcome, _notices) = net.survival.join(p.clone()).await.unwrap();
    assert_eq!(outcome, JoinOutcome::Resumed);
    assert!(net.survival.is_authenticated(&p.id));
    assert_eq!(net.survival.timer_state(&p.id), None);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_transfer_blocked_only_for_unauthenticated() {
    let net = network().await;
    let q = player("Q");
    let r = player("R");
    net.credentials.add_account(q.id, "q-secret", true);
    let mut links = Vec::new();
    for who in [&q, &r] {
        net.proxy.connect(who.clone());
        links.push(net.lobby.join(who.clone()).await.unwrap());
    }

    net.lobby.login(q.id, "q-secret").await.unwrap();
    assert!(eventually(|| net.proxy.is_authenticated(&q.id)).await);

    assert!(net.proxy.check_transfer(&q.id, "survival").is_allowed());

    let denied = net.proxy.check_transfer(&r.id, "survival");
    assert!(!denied.is_allowed());
    assert!(denied.message().unwrap().contains("verify your account"));
    assert!(net.proxy.check_transfer(&r.id, "lobby").is_allowed());
}

#[tokio::test(start_paused = true)]
async fn test_peer_session_promotes_player_connected_elsewhere() {
    let net = network().await;
    let alex = player("Alex");
    net.credentials.add_account(alex.id, "hunter2", true);
    let _alex_on_lobby = net.lobby.join(alex.clone()).await.unwrap();
    let (_, mut on_survival) = net.survival.join(alex.clone()).await.unwrap();

    net.lobby.login(alex.id, "hunter2").await.unwrap();

    assert!(eventually(|| net.survival.is_authenticated(&alex.id)).await);
    let told = drain(&mut on_survival);
    assert!(told.iter().any(|n| matches!(
        n,
        PlayerNotice::Message(m) if m.contains("another server")
    )));
}

#[tokio::test(start_paused = true)]
async fn test_lost_broadcast_costs_a_second_login() {
    let net = network().await;
    let alex = player("Alex");
    net.credentials.add_account(alex.id, "hunter2", true);
    net.hub.set_reachable(net.lobby.node_id(), false);

    let _alex_on_lobby = net.lobby.join(alex.clone()).await.unwrap();
    net.lobby.login(alex.id, "hunter2").await.unwrap();
    assert!(net.lobby.is_authenticated(&alex.id));

    assert!(!eventually(|| net.survival.cached_session(&alex.id).is_some()).await);
    let (outcome, _notices) = net.survival.join(alex.clone()).await.unwrap();
    assert_eq!(outcome, JoinOutcome::Pending);
    net.survival.login(alex.id, "hunter2").await.unwrap();
    assert!(net.survival.is_authenticated(&alex.id));
}

// ============================================================================
// Fail-closed and reload
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_at_startup_fails_closed() {
    let credentials = Arc::new(MemoryCredentialStore::default());
    credentials.set_available(false);
    let net = network_with(credentials).await;
    let alex = player("Alex");
    let _alex_on_lobby = net.lobby.join(alex.clone()).await.unwrap();

    assert_eq!(net.lobby.info().await.unwrap().mode, GateMode::FailClosed);
    assert!(!net.lobby.check(&alex.id, &Action::Chat { message: "hi".into() }).is_allowed());
    assert!(net.lobby.check(&alex.id, &Action::Command { line: "/login x".into() }).is_allowed());
}

#[tokio::test(start_paused = true)]
async fn test_reload_swaps_gate_settings_and_clears_cache() {
    let net = network().await;
    let alex = player("Alex");
    net.credentials.add_account(alex.id, "hunter2", true);
    let _alex_on_lobby = net.lobby.join(alex.clone()).await.unwrap();
    net.lobby.login(alex.id, "hunter2").await.unwrap();
    assert!(eventually(|| net.survival.cached_session(&alex.id).is_some()).await);

    let bob = player("Bob");
    let _bob_on_survival = net.survival.join(bob.clone()).await.unwrap();
    let to_hub = Action::Transfer {
        target: Some("hub".into()),
    };
    assert!(!net.survival.check(&bob.id, &to_hub).is_allowed());

    let mut reloaded = config("survival");
    reloaded.gate.lobby_server = "hub".into();
    net.survival.reload(reloaded).await.unwrap();

    assert!(net.survival.check(&bob.id, &to_hub).is_allowed());
    assert!(net.survival.cached_session(&alex.id).is_none());
    assert_eq!(net.survival.info().await.unwrap().cached_sessions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_makes_handle_unavailable() {
    let net = network().await;
    net.lobby.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let result = net.lobby.join(player("Alex")).await;
    assert!(matches!(result, Err(GatehouseError::NodeUnavailable(_))));
}
