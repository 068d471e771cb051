//! Node configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid config. The
//! sections map one-to-one onto the settings types of the sub-crates;
//! the `*_config()` accessors do the conversion.
//!
//! ```toml
//! node_id = "lobby"
//!
//! [verification]
//! deadline_secs = 300
//!
//! [gate]
//! lobby_server = "hub"
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use gatehouse_gate::GateConfig;
use gatehouse_protocol::NodeId;
use gatehouse_session::{CredentialConfig, SessionConfig};
use gatehouse_tick::TimerSchedule;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::GatehouseError;

/// Complete configuration for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    /// Name of this node on the network (`"proxy"`, `"lobby"`, ...).
    pub node_id: String,
    pub verification: VerificationSection,
    pub session: SessionSection,
    pub gate: GateSection,
    pub registration: RegistrationSection,
    pub transport: TransportSection,
}

/// `[verification]`: the deadline timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSection {
    pub deadline_secs: u64,
    pub warning_thresholds_secs: Vec<u64>,
    pub countdown_from_secs: u64,
}

/// `[session]`: cross-node session cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

/// `[gate]`: what unauthenticated players may do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSection {
    pub lobby_server: String,
    pub allowed_commands: Vec<String>,
    pub move_notice_interval_ms: u64,
}

/// `[registration]`: how players are pointed at the website.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSection {
    pub website_url: String,
    pub code_length: usize,
    /// Lifetime of issued codes and registration tokens.
    pub code_ttl_secs: u64,
}

/// `[transport]`: the node mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Where to accept peer links.
    pub listen: String,
    /// Peers to dial at startup.
    pub peers: Vec<String>,
}

impl Default for GatehouseConfig {
    fn default() -> Self {
        Self {
            node_id: "lobby".into(),
            verification: VerificationSection::default(),
            session: SessionSection::default(),
            gate: GateSection::default(),
            registration: RegistrationSection::default(),
            transport: TransportSection::default(),
        }
    }
}

impl Default for VerificationSection {
    fn default() -> Self {
        let schedule = TimerSchedule::default();
        Self {
            deadline_secs: schedule.deadline.as_secs(),
            warning_thresholds_secs: schedule.warning_thresholds_secs,
            countdown_from_secs: schedule.countdown_from_secs,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        let config = SessionConfig::default();
        Self {
            ttl_secs: config.ttl.as_secs(),
            sweep_interval_secs: config.sweep_interval.as_secs(),
        }
    }
}

impl Default for GateSection {
    fn default() -> Self {
        let config = GateConfig::default();
        Self {
            lobby_server: config.lobby_server,
            allowed_commands: config.allowed_commands,
            move_notice_interval_ms: config.move_notice_interval.as_millis() as u64,
        }
    }
}

impl Default for RegistrationSection {
    fn default() -> Self {
        let credentials = CredentialConfig::default();
        Self {
            website_url: GateConfig::default().website_url,
            code_length: credentials.code_length,
            code_ttl_secs: credentials.ttl.as_secs(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:25580".into(),
            peers: Vec::new(),
        }
    }
}

impl GatehouseConfig {
    /// Shortest sweep interval accepted.
    pub const MIN_SWEEP_INTERVAL_SECS: u64 = 1;
    /// Longest sweep interval accepted.
    pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;
    /// Longest session TTL accepted.
    pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;
    /// Longest code and token lifetime accepted.
    pub const MAX_CODE_TTL_SECS: u64 = 7 * 24 * 60 * 60;
    /// Code lengths outside this range are clamped.
    pub const CODE_LENGTH_RANGE: (usize, usize) = (4, 12);

    /// Parses a config from TOML text and validates it.
    ///
    /// # Errors
    /// [`GatehouseError::Config`] if the text isn't valid TOML or a field
    /// has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, GatehouseError> {
        let config: Self =
            toml::from_str(text).map_err(|e| GatehouseError::Config(e.to_string()))?;
        Ok(config.validated())
    }

    /// Reads and parses a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatehouseError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GatehouseError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Timer thresholds are validated by [`TimerSchedule::validated`] when
    /// the schedule is built; this covers the rest.
    pub fn validated(mut self) -> Self {
        if self.node_id.trim().is_empty() {
            warn!("empty node_id, using \"lobby\"");
            self.node_id = "lobby".into();
        }
        let sweep = self
            .session
            .sweep_interval_secs
            .clamp(Self::MIN_SWEEP_INTERVAL_SECS, Self::MAX_SWEEP_INTERVAL_SECS);
        if sweep != self.session.sweep_interval_secs {
            warn!(
                sweep_interval_secs = self.session.sweep_interval_secs,
                clamped = sweep,
                "session sweep interval out of range, clamping"
            );
            self.session.sweep_interval_secs = sweep;
        }
        if self.session.ttl_secs == 0 {
            warn!("session ttl of zero, using default");
            self.session.ttl_secs = SessionSection::default().ttl_secs;
        } else if self.session.ttl_secs > Self::MAX_SESSION_TTL_SECS {
            warn!(ttl_secs = self.session.ttl_secs, "session ttl too long, capping");
            self.session.ttl_secs = Self::MAX_SESSION_TTL_SECS;
        }
        if self.registration.code_ttl_secs == 0 {
            warn!("code ttl of zero, using default");
            self.registration.code_ttl_secs = RegistrationSection::default().code_ttl_secs;
        } else if self.registration.code_ttl_secs > Self::MAX_CODE_TTL_SECS {
            warn!(
                code_ttl_secs = self.registration.code_ttl_secs,
                "code ttl too long, capping"
            );
            self.registration.code_ttl_secs = Self::MAX_CODE_TTL_SECS;
        }
        let (min, max) = Self::CODE_LENGTH_RANGE;
        let clamped = self.registration.code_length.clamp(min, max);
        if clamped != self.registration.code_length {
            warn!(
                code_length = self.registration.code_length,
                clamped, "one-time code length out of range, clamping"
            );
            self.registration.code_length = clamped;
        }
        while self.registration.website_url.ends_with('/') {
            self.registration.website_url.pop();
        }
        self
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.node_id.clone())
    }

    /// The verification timer schedule.
    pub fn timer_schedule(&self) -> TimerSchedule {
        TimerSchedule {
            deadline: Duration::from_secs(self.verification.deadline_secs),
            warning_thresholds_secs: self.verification.warning_thresholds_secs.clone(),
            countdown_from_secs: self.verification.countdown_from_secs,
        }
        .validated()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ttl: Duration::from_secs(self.session.ttl_secs),
            sweep_interval: Duration::from_secs(self.session.sweep_interval_secs),
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            lobby_server: self.gate.lobby_server.clone(),
            allowed_commands: self.gate.allowed_commands.clone(),
            move_notice_interval: Duration::from_millis(self.gate.move_notice_interval_ms),
            website_url: self.registration.website_url.clone(),
        }
    }

    /// Settings for issued credentials.
    pub fn credential_config(&self) -> CredentialConfig {
        CredentialConfig {
            code_length: self.registration.code_length,
            ttl: Duration::from_secs(self.registration.code_ttl_secs),
        }
    }

    /// The listen address, if it parses.
    pub fn listen_addr(&self) -> Result<SocketAddr, GatehouseError> {
        self.transport.listen.parse().map_err(|e| {
            GatehouseError::Config(format!("transport.listen {:?}: {e}", self.transport.listen))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = GatehouseConfig::from_toml_str("").unwrap();
        assert_eq!(config.node_id, "lobby");
        assert_eq!(config.verification.deadline_secs, 300);
        assert_eq!(
            config.verification.warning_thresholds_secs,
            vec![240, 180, 120, 60, 30]
        );
        assert_eq!(config.session.ttl_secs, 3600);
        assert_eq!(config.gate.move_notice_interval_ms, 5000);
        assert_eq!(config.registration.code_length, 6);
        assert_eq!(config.credential_config().ttl, Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_full_toml_parses() {
        let text = r#"
            node_id = "survival"

            [verification]
            deadline_secs = 120
            warning_thresholds_secs = [60, 30]
            countdown_from_secs = 5

            [session]
            ttl_secs = 600
            sweep_interval_secs = 30

            [gate]
            lobby_server = "hub"
            allowed_commands = ["login", "register"]
            move_notice_interval_ms = 2000

            [registration]
            website_url = "https://play.example.com/"
            code_length = 8
            code_ttl_secs = 600

            [transport]
            listen = "0.0.0.0:25581"
            peers = ["10.0.0.2:25580"]
        "#;
        let config = GatehouseConfig::from_toml_str(text).unwrap();

        assert_eq!(config.node_id(), NodeId::new("survival"));
        assert_eq!(config.timer_schedule().deadline, Duration::from_secs(120));
        assert_eq!(config.session_config().ttl, Duration::from_secs(600));

        let gate = config.gate_config();
        assert_eq!(gate.lobby_server, "hub");
        assert_eq!(gate.move_notice_interval, Duration::from_secs(2));
        // Trailing slash trimmed so links can be joined with "/register".
        assert_eq!(gate.website_url, "https://play.example.com");

        assert_eq!(config.credential_config().code_length, 8);
        assert_eq!(config.credential_config().ttl, Duration::from_secs(600));
        assert_eq!(config.transport.peers, vec!["10.0.0.2:25580".to_string()]);
        assert_eq!(config.listen_addr().unwrap().port(), 25581);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = GatehouseConfig::from_toml_str("node_id = [");
        assert!(matches!(result, Err(GatehouseError::Config(_))));

        let result = GatehouseConfig::from_toml_str("[session]\nttl_secs = \"long\"");
        assert!(matches!(result, Err(GatehouseError::Config(_))));
    }

    #[test]
    fn test_validated_clamps_out_of_range() {
        let mut config = GatehouseConfig::default();
        config.node_id = "  ".into();
        config.session.sweep_interval_secs = 0;
        config.session.ttl_secs = 0;
        config.registration.code_length = 40;

        let config = config.validated();
        assert_eq!(config.node_id, "lobby");
        assert_eq!(config.session.sweep_interval_secs, 1);
        assert_eq!(config.session.ttl_secs, 3600);
        assert_eq!(config.registration.code_length, 12);
    }

    #[test]
    fn test_validated_caps_huge_durations() {
        let text = format!(
            "[verification]\ndeadline_secs = {max}\n\
             [session]\nttl_secs = {max}\nsweep_interval_secs = {max}\n",
            max = i64::MAX
        );
        let config = GatehouseConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.timer_schedule().deadline, TimerSchedule::MAX_DEADLINE);
        assert_eq!(config.session_config().ttl.as_secs(), GatehouseConfig::MAX_SESSION_TTL_SECS);

        let mut config = GatehouseConfig::default();
        config.verification.deadline_secs = u64::MAX;
        config.session.ttl_secs = u64::MAX;
        config.session.sweep_interval_secs = u64::MAX;
        config.registration.code_ttl_secs = u64::MAX;
        let config = config.validated();

        assert_eq!(config.timer_schedule().deadline, TimerSchedule::MAX_DEADLINE);
        assert_eq!(
            config.session.ttl_secs,
            GatehouseConfig::MAX_SESSION_TTL_SECS
        );
        assert_eq!(
            config.session.sweep_interval_secs,
            GatehouseConfig::MAX_SWEEP_INTERVAL_SECS
        );
        assert_eq!(
            config.registration.code_ttl_secs,
            GatehouseConfig::MAX_CODE_TTL_SECS
        );
    }

    #[test]
    fn test_bad_listen_addr_is_config_error() {
        let mut config = GatehouseConfig::default();
        config.transport.listen = "not an address".into();
        assert!(matches!(
            config.listen_addr(),
            Err(GatehouseError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = GatehouseConfig::load("/nonexistent/gatehouse.toml");
        assert!(matches!(result, Err(GatehouseError::Config(_))));
    }
}
