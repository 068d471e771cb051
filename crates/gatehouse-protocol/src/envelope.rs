//! Node-to-node framing.
//!
//! When messages travel over a real network link (rather than an
//! in-process hub) each frame has to say who sent it and which channel it
//! belongs to. The [`Envelope`] wraps an opaque channel payload with those
//! two facts.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{WireFormat, get_str, put_str};
use crate::{NodeId, ProtocolError};

/// Upper bound on a single payload. Channel messages are a few hundred
/// bytes at most; anything near this size is garbage or hostile.
const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// One frame on a node-to-node link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The node that published the payload.
    pub from: NodeId,
    /// Wire name of the channel (see [`ChannelName`](crate::ChannelName)).
    pub channel: String,
    /// The channel message itself, still encoded.
    pub payload: Bytes,
}

impl WireFormat for Envelope {
    fn write_to(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        put_str(out, self.from.as_str())?;
        put_str(out, &self.channel)?;
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidMessage(format!(
                "payload of {} bytes exceeds {MAX_PAYLOAD_LEN}",
                self.payload.len()
            )));
        }
        out.put_u32(self.payload.len() as u32);
        out.put_slice(&self.payload);
        Ok(())
    }

    fn read_from(input: &mut &[u8]) -> Result<Self, ProtocolError> {
        let from = NodeId::new(get_str(input)?);
        let channel = get_str(input)?;
        if input.remaining() < 4 {
            return Err(ProtocolError::Truncated {
                needed: 4 - input.remaining(),
            });
        }
        let len = input.get_u32() as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidMessage(format!(
                "payload length {len} exceeds {MAX_PAYLOAD_LEN}"
            )));
        }
        if input.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: len - input.remaining(),
            });
        }
        let payload = input.copy_to_bytes(len);
        Ok(Self {
            from,
            channel,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_decodes_what_it_encodes() {
        let env = Envelope {
            from: NodeId::new("lobby"),
            channel: "gatehouse:session".into(),
            payload: Bytes::from_static(b"\x00\x01x"),
        };
        let bytes = env.to_bytes().unwrap();
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), env);
    }

    #[test]
    fn test_envelope_rejects_absurd_payload_length() {
        let mut out = BytesMut::new();
        put_str(&mut out, "lobby").unwrap();
        put_str(&mut out, "gatehouse:session").unwrap();
        out.put_u32(u32::MAX);

        assert!(matches!(
            Envelope::from_bytes(&out),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_envelope_truncated_payload_is_error() {
        let mut out = BytesMut::new();
        put_str(&mut out, "lobby").unwrap();
        put_str(&mut out, "gatehouse:session").unwrap();
        out.put_u32(10);
        out.put_slice(b"abc");

        assert!(matches!(
            Envelope::from_bytes(&out),
            Err(ProtocolError::Truncated { needed: 7 })
        ));
    }
}
