//! Server error kinds.

use thiserror::Error;

/// Errors raised accepting connections or routing outbound containers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `session_limit_count` was reached; the connection was refused.
    #[error("session limit reached ({0} sessions)")]
    SessionLimitReached(usize),

    /// No confirmed session matched the outbound container's routing
    /// header.
    #[error("no session found for target {target_id:?}/{target_sub_id:?}")]
    NoMatchingSession {
        /// The unmatched `target_id`.
        target_id: String,
        /// The unmatched `target_sub_id`.
        target_sub_id: String,
    },

    /// The underlying session rejected the handshake or the send.
    #[error(transparent)]
    Session(#[from] courier_session::SessionError),

    /// Listener accept or bind failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout `courier-server`.
pub type ServerResult<T> = std::result::Result<T, ServerError>;
