//! Session-level error taxonomy.
//!
//! Every variant is recoverable: the session stays usable and the user
//! decides what to do next (re-enter a code, pick a role again, resend).

use crate::core::negotiator::ConnectionState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Wrong password, wrong encryption level, or a tampered envelope.
    #[error("code could not be decrypted: wrong password, wrong level or corrupted data")]
    AuthenticationFailure,

    /// Malformed or unexpected descriptor text.
    #[error("invalid code: {0}")]
    InvalidCode(String),

    /// Local audio capture is unavailable. The session continues without it.
    #[error("microphone unavailable: {0}")]
    MediaAcquisitionDenied(String),

    /// The peer or the network closed the channel.
    #[error("channel closed")]
    ChannelClosed,

    /// A control frame carried an unknown or malformed discriminant.
    #[error("unrecognized control frame: {0}")]
    UnrecognizedControlFrame(String),

    #[error("transition {from} -> {to} is not allowed")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("not connected")]
    NotConnected,

    #[error("personal encryption level requires a passphrase")]
    MissingPassphrase,

    /// Failure inside the underlying peer connection.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl SessionError {
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
