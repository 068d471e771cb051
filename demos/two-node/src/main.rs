//! A proxy, a lobby and a survival server in one process.
//!
//! Walks two players through the network: Alex registers on the lobby and
//! then moves to survival without logging in again; Bob never logs in and
//! stays stuck in the lobby.
//!
//! ```text
//! cargo run -p two-node                  # in-process hub
//! cargo run -p two-node -- --mesh        # real WebSocket links on localhost
//! cargo run -p two-node -- gatehouse.toml
//! ```
//!
//! Set `RUST_LOG=debug` to see the session traffic.

use std::sync::Arc;
use std::time::Duration;

use gatehouse::prelude::*;
use gatehouse::telemetry;
use gatehouse::transport::{PeerMesh, WebSocketTransport};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

struct Nodes {
    proxy: ProxyHandle,
    lobby: NodeHandle,
    survival: NodeHandle,
}

fn node_config(base: &GatehouseConfig, node_id: &str) -> GatehouseConfig {
    GatehouseConfig {
        node_id: node_id.into(),
        ..base.clone()
    }
}

async fn in_process(base: &GatehouseConfig, credentials: Arc<MemoryCredentialStore>) -> Nodes {
    let hub = MemoryHub::new();

    let (_, inbound) = hub.join("proxy");
    let proxy = ProxyNode::start(node_config(base, "proxy"), inbound);

    let (link, inbound) = hub.join("lobby");
    let lobby = BackendNode::start(
        node_config(base, "lobby"),
        Arc::clone(&credentials),
        link,
        inbound,
    )
    .await;

    let (link, inbound) = hub.join("survival");
    let survival =
        BackendNode::start(node_config(base, "survival"), credentials, link, inbound).await;

    Nodes {
        proxy,
        lobby,
        survival,
    }
}

/// Each node listens on its own port and dials the ones started before
/// it, which gives a full mesh.
async fn over_websockets(
    base: &GatehouseConfig,
    credentials: Arc<MemoryCredentialStore>,
) -> Result<Nodes, GatehouseError> {
    let (proxy_mesh, inbound) = PeerMesh::new("proxy");
    let proxy_addr = listen(&proxy_mesh).await?;
    let proxy = ProxyNode::start(node_config(base, "proxy"), inbound);

    let (lobby_mesh, inbound) = PeerMesh::new("lobby");
    let lobby_addr = listen(&lobby_mesh).await?;
    lobby_mesh.dial(&proxy_addr).await?;
    let lobby = BackendNode::start(
        node_config(base, "lobby"),
        Arc::clone(&credentials),
        lobby_mesh,
        inbound,
    )
    .await;

    let (survival_mesh, inbound) = PeerMesh::new("survival");
    listen(&survival_mesh).await?;
    survival_mesh.dial(&proxy_addr).await?;
    survival_mesh.dial(&lobby_addr).await?;
    let survival = BackendNode::start(
        node_config(base, "survival"),
        credentials,
        survival_mesh,
        inbound,
    )
    .await;

    // Let the accepting sides register their links.
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(Nodes {
        proxy,
        lobby,
        survival,
    })
}

async fn listen(mesh: &PeerMesh) -> Result<String, GatehouseError> {
    let transport = WebSocketTransport::bind("127.0.0.1:0").await?;
    let addr = transport.local_addr()?.to_string();
    mesh.serve(transport);
    Ok(addr)
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Logs whatever the node has told a player so far.
fn show(name: &str, notices: &mut UnboundedReceiver<PlayerNotice>) {
    while let Ok(notice) = notices.try_recv() {
        info!(player = name, ?notice, "to player");
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn run(nodes: Nodes) -> Result<(), GatehouseError> {
    let Nodes {
        proxy,
        lobby,
        survival,
    } = nodes;

    let alex = PlayerIdentity::new(PlayerId::random(), "Alex");
    let bob = PlayerIdentity::new(PlayerId::random(), "Bob");
    proxy.connect(alex.clone());
    proxy.connect(bob.clone());

    let (outcome, mut alex_notices) = lobby.join(alex.clone()).await?;
    info!(?outcome, "Alex joined the lobby");
    let (_, mut bob_notices) = lobby.join(bob.clone()).await?;
    settle().await;

    let chat = Action::Chat {
        message: "hello?".into(),
    };
    info!(verdict = ?lobby.check(&alex.id, &chat), "Alex tries to chat");

    let RegisterOutcome::Issued { code, link } = lobby.register(alex.id).await? else {
        info!("Alex was already registered");
        return Ok(());
    };
    info!(%link, "Alex opens the registration link");
    let login = lobby.login(alex.id, code).await?;
    info!(?login, "Alex logs in with the one-time code");
    settle().await;
    show("Alex", &mut alex_notices);

    info!(
        alex = ?proxy.check_transfer(&alex.id, "survival"),
        bob = ?proxy.check_transfer(&bob.id, "survival"),
        "both ask the proxy for survival"
    );
    if let Some(verdict) = proxy.check_server_command(&bob.id, "server lobby") {
        info!(?verdict, "Bob asks for the lobby instead");
    }

    lobby.leave(alex.id).await?;
    let (outcome, mut alex_notices) = survival.join(alex.clone()).await?;
    info!(?outcome, "Alex arrives on survival");
    show("Alex", &mut alex_notices);

    match lobby.login(bob.id, "guess").await {
        Ok(outcome) => info!(?outcome, "Bob guessed right"),
        Err(e) => info!(error = %e, "Bob's guess is rejected"),
    }
    show("Bob", &mut bob_notices);

    for handle in [&lobby, &survival] {
        let node = handle.info().await?;
        info!(
            node = %node.node_id,
            players = node.players,
            authenticated = node.authenticated,
            cached = node.cached_sessions,
            "node summary"
        );
    }

    lobby.shutdown().await?;
    survival.shutdown().await?;
    proxy.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GatehouseError> {
    telemetry::init();

    let mut use_mesh = false;
    let mut config = GatehouseConfig::default();
    for arg in std::env::args().skip(1) {
        if arg == "--mesh" {
            use_mesh = true;
        } else {
            config = GatehouseConfig::load(&arg)?;
        }
    }

    let credentials = Arc::new(MemoryCredentialStore::new(config.credential_config()));
    let nodes = if use_mesh {
        over_websockets(&config, credentials).await?
    } else {
        in_process(&config, credentials).await
    };
    run(nodes).await
}
