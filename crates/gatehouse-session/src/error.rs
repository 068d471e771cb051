//! Error types for the session layer.

use gatehouse_protocol::PlayerId;

/// The credential store could not answer.
///
/// There is exactly one failure mode worth distinguishing: the store is
/// down or timed out. Callers must never read it as "authenticated".
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Why a login or registration attempt failed.
///
/// Every variant maps to exactly one message shown to the player, see
/// [`user_message`](Self::user_message).
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Wrong secret, or a code that doesn't match.
    #[error("credential rejected")]
    CredentialInvalid,

    /// The one-time code (or registration token) outlived its TTL.
    #[error("credential expired")]
    CredentialExpired,

    /// No account exists for the identity.
    #[error("identity {0} is not registered")]
    IdentityNotRegistered(PlayerId),

    /// The credential store could not be reached.
    #[error("credential store unavailable")]
    StoreUnavailable(#[from] StoreError),

    /// A required cross-node message could not be sent.
    #[error("transport unavailable")]
    TransportUnavailable,

    /// The identity is not connected to this node.
    #[error("player {0} is not connected here")]
    NotConnected(PlayerId),
}

impl AuthError {
    /// The one line the player sees.
    ///
    /// A wrong secret and a wrong code read the same, so the message never
    /// tells an attacker which half of a guess was close.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::CredentialInvalid => "Incorrect password or code.",
            Self::CredentialExpired => {
                "That code has expired. Use /register to get a new one."
            }
            Self::IdentityNotRegistered(_) => "You are not registered yet. Use /register first.",
            Self::StoreUnavailable(_) => {
                "Authentication is temporarily unavailable. Please try again shortly."
            }
            Self::TransportUnavailable => "The network is unavailable. Please try again.",
            Self::NotConnected(_) => "You are not connected to this server.",
        }
    }
}
