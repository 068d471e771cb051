//! Gate configuration.

use std::time::Duration;

/// How the gate treats players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateMode {
    /// Authenticated players do anything; everyone else goes through the
    /// rules.
    #[default]
    Normal,
    /// The credential store was unreachable at startup. Nobody can be
    /// verified, so everything except allow-listed commands is denied,
    /// whatever the player's state.
    FailClosed,
}

/// Settings for a [`GateEnforcer`](crate::GateEnforcer).
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// The server unauthenticated players may always transfer to.
    pub lobby_server: String,
    /// Commands usable without authenticating (names, no `/`).
    pub allowed_commands: Vec<String>,
    /// Minimum gap between movement reminders for one player.
    pub move_notice_interval: Duration,
    /// Shown in transfer denials so players know where to register.
    pub website_url: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            lobby_server: "lobby".into(),
            allowed_commands: vec!["register".into(), "login".into(), "authreload".into()],
            move_notice_interval: Duration::from_secs(5),
            website_url: "https://example.invalid".into(),
        }
    }
}
