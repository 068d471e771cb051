//! Wire protocol for Gatehouse.
//!
//! This crate defines the "language" that nodes speak to each other:
//!
//! - **Types** ([`PlayerId`], [`PlayerIdentity`], [`NodeId`]): the
//!   identity values every other crate keys its state by.
//! - **Messages** ([`ChannelMessage`], [`SessionUpdate`],
//!   [`SetAuthenticated`], [`LegacyRequest`]): the facts that travel
//!   between the proxy and the backend nodes.
//! - **Codec** ([`WireFormat`] trait, [`Envelope`]): how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer sits below everything else. It doesn't know about
//! connections, timers or authentication state. It only knows how to
//! serialize and deserialize messages.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope → ChannelMessage) → Node (state)
//! ```
//!
//! # Wire format
//!
//! Every message is a flat sequence of fields in a fixed order:
//!
//! - strings: 2-byte big-endian length, then that many UTF-8 bytes
//! - booleans: one byte, `0` or `1`
//! - timestamps: 8-byte big-endian signed integer (epoch millis)
//!
//! The first field of a channel message is always its type tag.

mod codec;
mod envelope;
mod error;
mod legacy;
mod messages;
mod types;

pub use codec::{WireFormat, get_bool, get_i64, get_str, put_bool, put_i64, put_str};
pub use envelope::Envelope;
pub use error::ProtocolError;
pub use legacy::{LEGACY_CHANNELS, LegacyRequest, LegacySubCommand};
pub use messages::{ChannelMessage, SessionUpdate, SetAuthenticated};
pub use types::{ChannelName, NodeId, PlayerId, PlayerIdentity};
