//! Backend node: one game server's authentication main loop.
//!
//! Everything that changes a player's authentication state happens on one
//! Tokio task, the node actor. It owns the player links and selects over
//! four sources:
//!
//! ```text
//!   NodeHandle ──Command──▶ ┌──────────────┐ ──PlayerNotice──▶ player
//!   transport ──Inbound───▶ │  node actor  │
//!   TickScheduler (1 Hz) ─▶ │              │ ──SessionUpdate──▶ peers
//!   sweep interval ───────▶ └──────────────┘ ──SetAuthenticated─▶ proxy
//! ```
//!
//! Credential checks are slow (they ask an external store), so the actor
//! spawns them and carries on. The result comes back as another command
//! (`LoginResolved`, ...) and is applied on the actor before the caller's
//! reply is sent.
//!
//! Gate checks don't go through the actor at all: [`NodeHandle::check`]
//! reads the shared [`AuthStateStore`] directly, from any task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_gate::{Action, GateEnforcer, GateMode, Verdict};
use gatehouse_protocol::{NodeId, PlayerId, PlayerIdentity};
use gatehouse_session::{
    AuthError, AuthStateStore, CredentialStore, Session, SessionCache, SessionConfig,
    epoch_millis,
};
use gatehouse_tick::{CancelReason, TickConfig, TickInfo, TickScheduler, TimerEvent, TimerState};
use gatehouse_transport::{Inbound, Outbound};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::{Received, SessionChannel};
use crate::login::{CredentialKind, LoginFlow, LoginOutcome, RegisterOutcome};
use crate::{GatehouseConfig, GatehouseError};

/// Bounded so a flood of commands applies backpressure to callers.
const COMMAND_CHANNEL_SIZE: usize = 256;

const LOGIN_SUCCESS: &str = "Successfully logged in!";
const SESSION_RESUMED: &str = "Welcome back! Your login from another server is still valid.";
const SESSION_PROMOTED: &str = "You have been logged in from another server.";
const DEADLINE_EXCEEDED: &str =
    "You did not log in within the time limit. Rejoin and use /login or /register.";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Something the node wants shown to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerNotice {
    /// A chat line.
    Message(String),
    /// "N seconds left to log in."
    Warning { remaining_secs: u64 },
    /// The final per-second countdown.
    Countdown { remaining_secs: u64 },
    /// The player must be disconnected. Always the last notice on a link.
    Kicked { reason: String },
}

/// Channel sender the node uses to reach one player.
pub type PlayerLink = mpsc::UnboundedSender<PlayerNotice>;

/// How a player's join went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A verified session from another node was still fresh. No timer.
    Resumed,
    /// The player must log in; their verification timer is running.
    Pending,
}

/// A snapshot of node metadata.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub mode: GateMode,
    /// Players currently connected.
    pub players: usize,
    /// Of those, how many are authenticated.
    pub authenticated: usize,
    /// Sessions from other nodes held in the cache.
    pub cached_sessions: usize,
    pub ticks: u64,
}

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

enum Command {
    Join {
        identity: PlayerIdentity,
        link: PlayerLink,
        reply: oneshot::Sender<JoinOutcome>,
    },
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    Login {
        player_id: PlayerId,
        credential: String,
        reply: oneshot::Sender<Result<LoginOutcome, AuthError>>,
    },
    LoginResolved {
        player_id: PlayerId,
        result: Result<CredentialKind, AuthError>,
        reply: oneshot::Sender<Result<LoginOutcome, AuthError>>,
    },
    Register {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<RegisterOutcome, AuthError>>,
    },
    RegistrationResolved {
        player_id: PlayerId,
        result: Result<RegisterOutcome, AuthError>,
        reply: oneshot::Sender<Result<RegisterOutcome, AuthError>>,
    },
    RegisteredResolved {
        player_id: PlayerId,
        result: Result<bool, AuthError>,
    },
    Reload {
        config: Box<GatehouseConfig>,
        reply: oneshot::Sender<()>,
    },
    Info {
        reply: oneshot::Sender<NodeInfo>,
    },
    Shutdown,
}

/// Handle to a running backend node. Cheap to clone.
#[derive(Clone)]
pub struct NodeHandle {
    node_id: NodeId,
    sender: mpsc::Sender<Command>,
    store: Arc<AuthStateStore>,
    cache: Arc<SessionCache>,
    gate: Arc<RwLock<GateEnforcer>>,
}

impl NodeHandle {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Connects a player. Returns how the join went and the receiver on
    /// which the node will talk to them.
    pub async fn join(
        &self,
        identity: PlayerIdentity,
    ) -> Result<(JoinOutcome, mpsc::UnboundedReceiver<PlayerNotice>), GatehouseError> {
        let (link, notices) = mpsc::unbounded_channel();
        let outcome = self
            .request(|reply| Command::Join {
                identity,
                link,
                reply,
            })
            .await?;
        Ok((outcome, notices))
    }

    /// Disconnects a player. Returns `false` if they weren't connected.
    pub async fn leave(&self, player_id: PlayerId) -> Result<bool, GatehouseError> {
        self.request(|reply| Command::Leave { player_id, reply })
            .await
    }

    /// `/login <credential>`.
    pub async fn login(
        &self,
        player_id: PlayerId,
        credential: impl Into<String>,
    ) -> Result<LoginOutcome, GatehouseError> {
        let credential = credential.into();
        let result = self
            .request(|reply| Command::Login {
                player_id,
                credential,
                reply,
            })
            .await?;
        Ok(result?)
    }

    /// `/register`.
    pub async fn register(&self, player_id: PlayerId) -> Result<RegisterOutcome, GatehouseError> {
        let result = self
            .request(|reply| Command::Register { player_id, reply })
            .await?;
        Ok(result?)
    }

    /// `/authreload`: applies new gate and timer settings and clears the
    /// session cache. Running timers keep the schedule they started with.
    pub async fn reload(&self, config: GatehouseConfig) -> Result<(), GatehouseError> {
        self.request(|reply| Command::Reload {
            config: Box::new(config),
            reply,
        })
        .await
    }

    pub async fn info(&self) -> Result<NodeInfo, GatehouseError> {
        self.request(|reply| Command::Info { reply }).await
    }

    /// Stops the node. Pending requests fail with
    /// [`GatehouseError::NodeUnavailable`].
    pub async fn shutdown(&self) -> Result<(), GatehouseError> {
        self.sender
            .send(Command::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }

    /// Whether `action` by `player_id` goes through.
    ///
    /// Synchronous, and safe to call from any task.
    pub fn check(&self, player_id: &PlayerId, action: &Action) -> Verdict {
        self.gate.read().check(player_id, action)
    }

    pub fn is_authenticated(&self, player_id: &PlayerId) -> bool {
        self.store.is_authenticated(player_id)
    }

    /// State of the player's verification timer, if they have one.
    pub fn timer_state(&self, player_id: &PlayerId) -> Option<TimerState> {
        self.store.timer_state(player_id)
    }

    /// The cached session for `player_id`, if fresh.
    pub fn cached_session(&self, player_id: &PlayerId) -> Option<Session> {
        self.cache.get(player_id, epoch_millis())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, GatehouseError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> GatehouseError {
        GatehouseError::NodeUnavailable(self.node_id.to_string())
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The node actor. Build one with [`BackendNode::start`].
pub struct BackendNode<S: CredentialStore, O: Outbound> {
    node_id: NodeId,
    mode: GateMode,
    store: Arc<AuthStateStore>,
    gate: Arc<RwLock<GateEnforcer>>,
    channel: SessionChannel<O>,
    flow: Arc<LoginFlow<S>>,
    links: HashMap<PlayerId, PlayerLink>,
    session_config: SessionConfig,
    /// How long an issued code stays valid, for the `/register` reply.
    code_ttl: Duration,
    /// Weak so the loop ends once every handle is gone.
    commands_tx: mpsc::WeakSender<Command>,
}

impl<S: CredentialStore, O: Outbound> BackendNode<S, O> {
    /// Starts a node and returns its handle.
    ///
    /// Pings the credential store first. If it doesn't answer, the node
    /// runs fail-closed: nobody can authenticate, so the gate denies
    /// everything but the allow-listed commands.
    pub async fn start(
        config: GatehouseConfig,
        credentials: Arc<S>,
        outbound: O,
        inbound: mpsc::UnboundedReceiver<Inbound>,
    ) -> NodeHandle {
        let config = config.validated();
        let node_id = config.node_id();

        let mode = match credentials.ping().await {
            Ok(()) => GateMode::Normal,
            Err(e) => {
                warn!(node = %node_id, error = %e, "credential store unreachable, running fail-closed");
                GateMode::FailClosed
            }
        };

        let session_config = config.session_config();
        let store = Arc::new(AuthStateStore::new(config.timer_schedule()));
        let cache = Arc::new(SessionCache::new(&session_config));
        let gate = Arc::new(RwLock::new(GateEnforcer::new(
            Arc::clone(&store),
            &config.gate_config(),
            mode,
        )));
        let flow = Arc::new(LoginFlow::new(
            credentials,
            config.registration.code_length,
            config.registration.website_url.clone(),
        ));
        let channel = SessionChannel::new(Arc::new(outbound), Arc::clone(&cache), Arc::clone(&store));

        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let actor = Self {
            node_id: node_id.clone(),
            mode,
            store: Arc::clone(&store),
            gate: Arc::clone(&gate),
            channel,
            flow,
            links: HashMap::new(),
            session_config,
            code_ttl: config.credential_config().ttl,
            commands_tx: tx.downgrade(),
        };

        let mut ticks = TickScheduler::new(TickConfig::default());
        ticks.pause();
        tokio::spawn(actor.run(rx, inbound, ticks));

        NodeHandle {
            node_id,
            sender: tx,
            store,
            cache,
            gate,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        mut ticks: TickScheduler,
    ) {
        info!(node = %self.node_id, mode = ?self.mode, "node started");

        let mut sweep = time::interval_at(
            Instant::now() + self.session_config.sweep_interval,
            self.session_config.sweep_interval,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd, &mut ticks),
                },
                Some(msg) = inbound.recv() => self.handle_inbound(msg),
                tick = ticks.wait_for_tick() => self.handle_tick(tick, &mut ticks),
                _ = sweep.tick() => {
                    let evicted = self.channel.cache().evict_stale(epoch_millis());
                    if evicted > 0 {
                        debug!(node = %self.node_id, evicted, "stale sessions swept");
                    }
                }
            }
        }

        for (player_id, _) in self.links.drain() {
            self.store.disconnect(&player_id);
        }
        info!(node = %self.node_id, "node stopped");
    }

    fn handle_command(&mut self, cmd: Command, ticks: &mut TickScheduler) {
        match cmd {
            Command::Join {
                identity,
                link,
                reply,
            } => {
                let outcome = self.handle_join(identity, link);
                ticks.resume();
                let _ = reply.send(outcome);
            }
            Command::Leave { player_id, reply } => {
                let was_connected = self.drop_player(&player_id).is_some();
                if was_connected {
                    info!(node = %self.node_id, %player_id, "player left");
                }
                if self.links.is_empty() {
                    ticks.pause();
                }
                let _ = reply.send(was_connected);
            }
            Command::Login {
                player_id,
                credential,
                reply,
            } => self.handle_login(player_id, credential, reply),
            Command::LoginResolved {
                player_id,
                result,
                reply,
            } => {
                let outcome = result.and_then(|kind| self.complete_login(player_id, kind));
                if let Err(e) = &outcome {
                    debug!(node = %self.node_id, %player_id, error = %e, "login failed");
                    self.send_to(&player_id, PlayerNotice::Message(e.user_message().into()));
                }
                let _ = reply.send(outcome);
            }
            Command::Register { player_id, reply } => self.handle_register(player_id, reply),
            Command::RegistrationResolved {
                player_id,
                result,
                reply,
            } => {
                match &result {
                    Ok(RegisterOutcome::Issued { code, link }) => {
                        self.send_to(
                            &player_id,
                            PlayerNotice::Message(format!(
                                "Finish registering at {link} and then type /login {code} here. \
                                 The code is valid for {}.",
                                describe_duration(self.code_ttl)
                            )),
                        );
                    }
                    Ok(RegisterOutcome::AlreadyRegistered) => {
                        self.store.set_registered(&player_id, true);
                        self.send_to(
                            &player_id,
                            PlayerNotice::Message(
                                "You are already registered. Use /login <password>.".into(),
                            ),
                        );
                    }
                    Err(e) => {
                        self.send_to(&player_id, PlayerNotice::Message(e.user_message().into()));
                    }
                }
                let _ = reply.send(result);
            }
            Command::RegisteredResolved { player_id, result } => match result {
                Ok(registered) => {
                    if !self.store.contains(&player_id) {
                        return;
                    }
                    self.store.set_registered(&player_id, registered);
                    if !self.store.is_authenticated(&player_id) {
                        let hint = self.gate.read().hint_for(&player_id);
                        self.send_to(&player_id, PlayerNotice::Message(hint.into()));
                    }
                }
                Err(e) => {
                    warn!(node = %self.node_id, %player_id, error = %e, "registration lookup failed");
                }
            },
            Command::Reload { config, reply } => {
                self.reload(*config);
                let _ = reply.send(());
            }
            Command::Info { reply } => {
                let _ = reply.send(NodeInfo {
                    node_id: self.node_id.clone(),
                    mode: self.mode,
                    players: self.links.len(),
                    authenticated: self.store.authenticated_ids().len(),
                    cached_sessions: self.channel.cache().len(),
                    ticks: ticks.tick_count(),
                });
            }
            // Handled by the loop.
            Command::Shutdown => {}
        }
    }

    fn handle_join(&mut self, identity: PlayerIdentity, link: PlayerLink) -> JoinOutcome {
        let player_id = identity.id;
        self.store.connect(identity.clone());
        self.links.insert(player_id, link);

        if self.channel.cache().is_verified(&player_id, epoch_millis()) {
            self.store.mark_authenticated(&player_id);
            self.channel.notify_proxy(player_id, true);
            self.send_to(&player_id, PlayerNotice::Message(SESSION_RESUMED.into()));
            info!(node = %self.node_id, %player_id, name = %identity.display_name, "player joined with a verified session");
            return JoinOutcome::Resumed;
        }

        self.store.start_timer(&player_id, Instant::now());
        info!(node = %self.node_id, %player_id, name = %identity.display_name, "player joined, awaiting login");

        let flow = Arc::clone(&self.flow);
        self.spawn_resolution(async move {
            let result = flow.is_registered(&identity).await;
            Command::RegisteredResolved { player_id, result }
        });
        JoinOutcome::Pending
    }

    fn handle_login(
        &mut self,
        player_id: PlayerId,
        credential: String,
        reply: oneshot::Sender<Result<LoginOutcome, AuthError>>,
    ) {
        let Some(identity) = self.store.identity(&player_id) else {
            let _ = reply.send(Err(AuthError::NotConnected(player_id)));
            return;
        };
        if self.store.is_authenticated(&player_id) {
            self.send_to(
                &player_id,
                PlayerNotice::Message("You are already logged in.".into()),
            );
            let _ = reply.send(Ok(LoginOutcome::AlreadyAuthenticated));
            return;
        }

        let flow = Arc::clone(&self.flow);
        self.spawn_resolution(async move {
            let result = flow.verify(&identity, &credential).await;
            Command::LoginResolved {
                player_id,
                result,
                reply,
            }
        });
    }

    /// Applies a successful credential check. Runs on the actor, so the
    /// player can't have been authenticated or removed concurrently.
    fn complete_login(
        &mut self,
        player_id: PlayerId,
        kind: CredentialKind,
    ) -> Result<LoginOutcome, AuthError> {
        let identity = self
            .store
            .identity(&player_id)
            .ok_or(AuthError::NotConnected(player_id))?;
        if !self.store.mark_authenticated(&player_id) {
            return Ok(LoginOutcome::AlreadyAuthenticated);
        }

        let timestamp = epoch_millis();
        self.channel.cache().apply(
            Session {
                identity: identity.clone(),
                verified: true,
                origin_timestamp: timestamp,
                source_node: self.node_id.clone(),
            },
            timestamp,
        );
        self.channel.broadcast(&identity, true, timestamp);
        self.channel.notify_proxy(player_id, true);

        info!(node = %self.node_id, %player_id, via = ?kind, "player authenticated");
        self.send_to(&player_id, PlayerNotice::Message(LOGIN_SUCCESS.into()));
        Ok(LoginOutcome::Authenticated(kind))
    }

    fn handle_register(
        &mut self,
        player_id: PlayerId,
        reply: oneshot::Sender<Result<RegisterOutcome, AuthError>>,
    ) {
        let Some(identity) = self.store.identity(&player_id) else {
            let _ = reply.send(Err(AuthError::NotConnected(player_id)));
            return;
        };
        let flow = Arc::clone(&self.flow);
        self.spawn_resolution(async move {
            let result = flow.register(&identity).await;
            Command::RegistrationResolved {
                player_id,
                result,
                reply,
            }
        });
    }

    fn handle_inbound(&mut self, msg: Inbound) {
        if let Received::Session {
            player,
            promoted: true,
            ..
        } = self.channel.on_receive(&msg, epoch_millis())
        {
            info!(node = %self.node_id, player_id = %player, from = %msg.from, "player authenticated by peer session");
            self.send_to(&player, PlayerNotice::Message(SESSION_PROMOTED.into()));
        }
    }

    fn handle_tick(&mut self, tick: TickInfo, ticks: &mut TickScheduler) {
        let links = &self.links;
        let events = self
            .store
            .advance_timers(tick.now, |id| links.get(id).is_some_and(|l| !l.is_closed()));

        for event in events {
            match event {
                TimerEvent::Warning {
                    player,
                    remaining_secs,
                } => {
                    debug!(node = %self.node_id, player_id = %player, remaining_secs, "verification warning");
                    self.send_to(&player, PlayerNotice::Warning { remaining_secs });
                }
                TimerEvent::Countdown {
                    player,
                    remaining_secs,
                } => {
                    self.send_to(&player, PlayerNotice::Countdown { remaining_secs });
                }
                TimerEvent::Expired { player } => {
                    info!(node = %self.node_id, player_id = %player, "verification deadline exceeded, kicking");
                    self.send_to(
                        &player,
                        PlayerNotice::Kicked {
                            reason: DEADLINE_EXCEEDED.into(),
                        },
                    );
                    self.links.remove(&player);
                    self.gate.read().forget(&player);
                }
                TimerEvent::Cancelled {
                    player,
                    reason: CancelReason::Disconnected,
                } => {
                    debug!(node = %self.node_id, player_id = %player, "player link closed");
                    self.links.remove(&player);
                    self.gate.read().forget(&player);
                }
                TimerEvent::Cancelled { .. } => {}
            }
        }

        // Authenticated players have no timer to notice a closed link.
        let closed: Vec<PlayerId> = self
            .links
            .iter()
            .filter(|(_, link)| link.is_closed())
            .map(|(id, _)| *id)
            .collect();
        for player_id in closed {
            debug!(node = %self.node_id, %player_id, "player link closed");
            self.drop_player(&player_id);
        }

        if self.links.is_empty() {
            ticks.pause();
        }
    }

    fn reload(&mut self, config: GatehouseConfig) {
        let config = config.validated();
        self.store.set_schedule(config.timer_schedule());
        *self.gate.write() =
            GateEnforcer::new(Arc::clone(&self.store), &config.gate_config(), self.mode);
        self.flow = Arc::new(LoginFlow::new(
            Arc::clone(self.flow.store()),
            config.registration.code_length,
            config.registration.website_url.clone(),
        ));
        self.code_ttl = config.credential_config().ttl;
        self.channel.cache().clear();
        info!(node = %self.node_id, "configuration reloaded");
    }

    /// Removes every trace of a player on this node.
    fn drop_player(&mut self, player_id: &PlayerId) -> Option<PlayerLink> {
        self.store.disconnect(player_id);
        self.gate.read().forget(player_id);
        self.links.remove(player_id)
    }

    /// Runs `work` off the actor and feeds its result back as a command.
    fn spawn_resolution<F>(&self, work: F)
    where
        F: Future<Output = Command> + Send + 'static,
    {
        let commands = self.commands_tx.clone();
        tokio::spawn(async move {
            let cmd = work.await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(cmd).await;
            }
        });
    }

    /// Sends a notice to a player. Dropped if they're gone.
    fn send_to(&self, player_id: &PlayerId, notice: PlayerNotice) {
        if let Some(link) = self.links.get(player_id) {
            let _ = link.send(notice);
        }
    }
}

/// "30 minutes", "1 hour", "45 seconds".
fn describe_duration(d: Duration) -> String {
    fn unit(n: u64, name: &str) -> String {
        if n == 1 {
            format!("1 {name}")
        } else {
            format!("{n} {name}s")
        }
    }
    let secs = d.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        unit(secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        unit(secs / 60, "minute")
    } else {
        unit(secs, "second")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_duration_picks_largest_whole_unit() {
        assert_eq!(describe_duration(Duration::from_secs(30 * 60)), "30 minutes");
        assert_eq!(describe_duration(Duration::from_secs(3600)), "1 hour");
        assert_eq!(describe_duration(Duration::from_secs(90)), "90 seconds");
        assert_eq!(describe_duration(Duration::from_secs(60)), "1 minute");
    }
}
