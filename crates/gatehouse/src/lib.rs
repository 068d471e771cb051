//! # Gatehouse
//!
//! Distributed authentication state for a network of game servers.
//!
//! A player connecting through the proxy lands on a backend node frozen:
//! they may look around and type `/login` or `/register`, and nothing
//! else, until they authenticate or their verification deadline passes.
//! Once they log in on one backend, the other backends and the proxy learn
//! about it over the session channel, so the next server doesn't ask again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gatehouse::prelude::*;
//!
//! # async fn demo() -> Result<(), GatehouseError> {
//! let hub = MemoryHub::new();
//! let (link, inbound) = hub.join("lobby");
//! let credentials = Arc::new(MemoryCredentialStore::default());
//!
//! let lobby = BackendNode::start(GatehouseConfig::default(), credentials, link, inbound).await;
//!
//! let alex = PlayerIdentity::new(PlayerId::random(), "Alex");
//! let (outcome, _notices) = lobby.join(alex.clone()).await?;
//! assert_eq!(outcome, JoinOutcome::Pending);
//! assert!(!lobby.check(&alex.id, &Action::Chat { message: "hi".into() }).is_allowed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate                 | Concern                                      |
//! |-----------------------|----------------------------------------------|
//! | `gatehouse-protocol`  | identities and the wire format               |
//! | `gatehouse-transport` | moving bytes between nodes                   |
//! | `gatehouse-tick`      | the 1 Hz scheduler and verification timers   |
//! | `gatehouse-session`   | auth state, session cache, credential seam   |
//! | `gatehouse-gate`      | deciding which actions go through            |
//! | `gatehouse` (this)    | the node and proxy main loops, login, config |

pub mod channel;
pub mod config;
mod error;
pub mod login;
pub mod node;
pub mod proxy;
pub mod telemetry;

pub use error::GatehouseError;
pub use config::GatehouseConfig;

pub use gatehouse_gate as gate;
pub use gatehouse_protocol as protocol;
pub use gatehouse_session as session;
pub use gatehouse_tick as tick;
pub use gatehouse_transport as transport;

/// The types most code needs, in one import.
pub mod prelude {
    pub use crate::channel::{Received, SessionChannel};
    pub use crate::config::GatehouseConfig;
    pub use crate::login::{CredentialKind, LoginFlow, LoginOutcome, RegisterOutcome};
    pub use crate::node::{BackendNode, JoinOutcome, NodeHandle, NodeInfo, PlayerNotice};
    pub use crate::proxy::{ProxyHandle, ProxyNode};
    pub use crate::GatehouseError;

    pub use gatehouse_gate::{Action, GateMode, Location, Position, Verdict};
    pub use gatehouse_protocol::{NodeId, PlayerId, PlayerIdentity};
    pub use gatehouse_session::{AuthError, CredentialStore, MemoryCredentialStore};
    pub use gatehouse_tick::TimerState;
    pub use gatehouse_transport::{MemoryHub, Outbound};
}
