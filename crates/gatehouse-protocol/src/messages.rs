//! Messages carried on the Gatehouse channels.
//!
//! Two message types exist today:
//!
//! - [`SessionUpdate`]: "identity X is (or is no longer) verified, as of
//!   time T". Sent on the session channel between backends.
//! - [`SetAuthenticated`]: "identity X just became (de)authenticated on my
//!   node". Sent from a backend to the proxy.
//!
//! Both start with a string type tag. Receivers decode through
//! [`ChannelMessage`] and must treat [`ProtocolError::UnknownType`] as a
//! no-op rather than a failure.

use bytes::BytesMut;

use crate::codec::{WireFormat, get_bool, get_i64, get_str, put_bool, put_i64, put_str};
use crate::{PlayerId, ProtocolError};

const SESSION_UPDATE: &str = "SessionUpdate";
const SET_AUTHENTICATED: &str = "SetAuthenticated";

// ---------------------------------------------------------------------------
// SessionUpdate
// ---------------------------------------------------------------------------

/// A propagatable fact about one identity's authentication status.
///
/// Field order on the wire: type tag, identity id (UUID text), username,
/// verified flag, timestamp (epoch millis).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    pub identity_id: PlayerId,
    pub username: String,
    pub verified: bool,
    /// When the originating node observed the fact, in epoch millis.
    /// Used for last-write-wins conflict resolution.
    pub timestamp: i64,
}

impl SessionUpdate {
    fn write_body(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        put_str(out, &self.identity_id.to_string())?;
        put_str(out, &self.username)?;
        put_bool(out, self.verified);
        put_i64(out, self.timestamp);
        Ok(())
    }

    fn read_body(input: &mut &[u8]) -> Result<Self, ProtocolError> {
        let identity_id = get_str(input)?.parse()?;
        let username = get_str(input)?;
        let verified = get_bool(input)?;
        let timestamp = get_i64(input)?;
        Ok(Self {
            identity_id,
            username,
            verified,
            timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// SetAuthenticated
// ---------------------------------------------------------------------------

/// Tells the proxy that an identity's authenticated flag changed on some
/// backend. The proxy uses this (and only this) for transfer blocking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAuthenticated {
    pub identity_id: PlayerId,
    pub authenticated: bool,
}

impl SetAuthenticated {
    fn write_body(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        put_str(out, &self.identity_id.to_string())?;
        put_bool(out, self.authenticated);
        Ok(())
    }

    fn read_body(input: &mut &[u8]) -> Result<Self, ProtocolError> {
        let identity_id = get_str(input)?.parse()?;
        let authenticated = get_bool(input)?;
        Ok(Self {
            identity_id,
            authenticated,
        })
    }
}

// ---------------------------------------------------------------------------
// ChannelMessage
// ---------------------------------------------------------------------------

/// Any message that can appear on a Gatehouse channel, dispatched by its
/// leading type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    SessionUpdate(SessionUpdate),
    SetAuthenticated(SetAuthenticated),
}

impl ChannelMessage {
    /// The type tag written in front of this message.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::SessionUpdate(_) => SESSION_UPDATE,
            Self::SetAuthenticated(_) => SET_AUTHENTICATED,
        }
    }
}

impl From<SessionUpdate> for ChannelMessage {
    fn from(msg: SessionUpdate) -> Self {
        Self::SessionUpdate(msg)
    }
}

impl From<SetAuthenticated> for ChannelMessage {
    fn from(msg: SetAuthenticated) -> Self {
        Self::SetAuthenticated(msg)
    }
}

impl WireFormat for ChannelMessage {
    fn write_to(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        put_str(out, self.type_tag())?;
        match self {
            Self::SessionUpdate(msg) => msg.write_body(out),
            Self::SetAuthenticated(msg) => msg.write_body(out),
        }
    }

    fn read_from(input: &mut &[u8]) -> Result<Self, ProtocolError> {
        let tag = get_str(input)?;
        match tag.as_str() {
            SESSION_UPDATE => SessionUpdate::read_body(input).map(Self::SessionUpdate),
            SET_AUTHENTICATED => {
                SetAuthenticated::read_body(input).map(Self::SetAuthenticated)
            }
            _ => Err(ProtocolError::UnknownType(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_update() -> SessionUpdate {
        SessionUpdate {
            identity_id: "1b4e28ba-2fa1-11d2-883f-0016d3cca427".parse().unwrap(),
            username: "Steve".into(),
            verified: true,
            timestamp: 1_700_000_000_123,
        }
    }

    #[test]
    fn test_session_update_field_order_matches_wire_layout() {
        let bytes = ChannelMessage::from(sample_update()).to_bytes().unwrap();

        let mut input = &bytes[..];
        assert_eq!(get_str(&mut input).unwrap(), "SessionUpdate");
        assert_eq!(
            get_str(&mut input).unwrap(),
            "1b4e28ba-2fa1-11d2-883f-0016d3cca427"
        );
        assert_eq!(get_str(&mut input).unwrap(), "Steve");
        assert!(get_bool(&mut input).unwrap());
        assert_eq!(get_i64(&mut input).unwrap(), 1_700_000_000_123);
        assert!(input.is_empty());
    }

    #[test]
    fn test_decode_session_update() {
        let bytes = ChannelMessage::from(sample_update()).to_bytes().unwrap();
        let decoded = ChannelMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, ChannelMessage::SessionUpdate(sample_update()));
    }

    #[test]
    fn test_decode_set_authenticated() {
        let msg = SetAuthenticated {
            identity_id: PlayerId::random(),
            authenticated: false,
        };
        let bytes = ChannelMessage::from(msg.clone()).to_bytes().unwrap();
        assert_eq!(
            ChannelMessage::from_bytes(&bytes).unwrap(),
            ChannelMessage::SetAuthenticated(msg)
        );
    }

    #[test]
    fn test_decode_unknown_type_tag_is_reported() {
        let mut out = BytesMut::new();
        put_str(&mut out, "Teleport").unwrap();
        put_str(&mut out, "whatever").unwrap();

        let result = ChannelMessage::from_bytes(&out);
        assert!(matches!(result, Err(ProtocolError::UnknownType(t)) if t == "Teleport"));
    }

    #[test]
    fn test_decode_bad_uuid_is_reported() {
        let mut out = BytesMut::new();
        put_str(&mut out, "SetAuthenticated").unwrap();
        put_str(&mut out, "player-one").unwrap();
        put_bool(&mut out, true);

        let result = ChannelMessage::from_bytes(&out);
        assert!(matches!(result, Err(ProtocolError::InvalidUuid(_))));
    }

    #[test]
    fn test_decode_truncated_session_update_is_error() {
        let bytes = ChannelMessage::from(sample_update()).to_bytes().unwrap();
        // Chop off half of the timestamp.
        let cut = &bytes[..bytes.len() - 4];
        assert!(matches!(
            ChannelMessage::from_bytes(cut),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_empty_payload_is_error() {
        assert!(ChannelMessage::from_bytes(&[]).is_err());
    }
}
