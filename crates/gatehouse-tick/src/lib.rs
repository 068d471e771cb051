//! Verification deadlines for Gatehouse.
//!
//! Two pieces live here:
//!
//! - [`VerificationTimer`]: a plain state machine (`Idle → Running →
//!   Cancelled | Expired`) that knows a deadline and which warnings it has
//!   already announced. It never sleeps; you advance it with an explicit
//!   [`Instant`](tokio::time::Instant), which makes it trivially testable.
//! - [`TickScheduler`]: the fixed-interval clock that decides *when* to
//!   advance. A backend node ticks once per second.
//!
//! # Integration
//!
//! The scheduler sits inside the node's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = scheduler.wait_for_tick() => {
//!             let events = store.advance_timers(Instant::now(), |id| links.contains_key(id));
//!             /* warn, count down, or kick */
//!         }
//!     }
//! }
//! ```

mod scheduler;
mod timer;

pub use scheduler::{TickConfig, TickInfo, TickPolicy, TickScheduler};
pub use timer::{
    CancelOutcome, CancelReason, TimerEvent, TimerSchedule, TimerState, VerificationTimer,
};
