//! Authentication state for Gatehouse.
//!
//! This crate holds everything a node knows about who is allowed to play:
//!
//! 1. **Local state**: [`AuthStateStore`]: which connected players are
//!    authenticated on *this* node, and each one's verification timer.
//! 2. **Remote knowledge**: [`SessionCache`]: verified sessions other
//!    nodes have told us about, resolved last-write-wins.
//! 3. **Credentials**: the [`CredentialStore`] seam to wherever secrets
//!    and one-time codes live, plus an in-memory implementation for tests
//!    and demos.
//!
//! # How it fits in the stack
//!
//! ```text
//! Node (gatehouse)  ← owns the stores, runs the main loop
//!     ↕
//! Session layer (this crate)  ← state, cache, credential seam
//!     ↕
//! Tick layer (gatehouse-tick)  ← verification timers
//!     ↕
//! Protocol layer (gatehouse-protocol)  ← PlayerId, SessionUpdate
//! ```

#![allow(async_fn_in_trait)]

mod cache;
mod credential;
mod error;
mod session;
mod store;

pub use cache::{ApplyOutcome, SessionCache};
pub use credential::{CodeCheck, CredentialConfig, CredentialStore, MemoryCredentialStore};
pub use error::{AuthError, StoreError};
pub use session::{Session, SessionConfig, epoch_millis};
pub use store::{AuthEntry, AuthState, AuthStateStore};
