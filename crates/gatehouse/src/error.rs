//! Unified error type for Gatehouse.

use gatehouse_protocol::ProtocolError;
use gatehouse_session::{AuthError, StoreError};
use gatehouse_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Code that drives a node through the `gatehouse` meta-crate deals with
/// this one type. Each `#[from]` variant lets `?` convert a sub-crate
/// error automatically.
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    /// A transport-level error (connect, send, no peers).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed or unknown wire message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The credential store could not answer.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A login or registration attempt failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The node's main loop has stopped.
    #[error("node {0} is not running")]
    NodeUnavailable(String),
}

impl GatehouseError {
    /// The wrapped [`AuthError`], if this is one.
    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            Self::Auth(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: GatehouseError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, GatehouseError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: GatehouseError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, GatehouseError::Protocol(_)));
    }

    #[test]
    fn test_from_auth_error() {
        let err: GatehouseError = AuthError::CredentialInvalid.into();
        assert!(matches!(err.as_auth(), Some(AuthError::CredentialInvalid)));
    }

    #[test]
    fn test_from_store_error() {
        let err: GatehouseError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(err, GatehouseError::Store(_)));
        assert!(err.as_auth().is_none());
    }
}
