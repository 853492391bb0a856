//! Session error kinds (distilled spec §7).

use thiserror::Error;

/// Errors raised by the framing layer, the handshake, or the send/receive
/// pipelines.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad start/end code, a length exceeding the configured maximum, or
    /// the socket closing mid-frame.
    #[error("framing error: {0}")]
    Framing(String),

    /// The peer replied `confirm=false`, or the connection key did not
    /// match, or the handshake never completed.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Attempted to send a message-line container on a session that has
    /// not completed its handshake.
    #[error("session is not confirmed")]
    NotConfirmed,

    /// Attempted to use a session in a way its `session_type` forbids —
    /// e.g. sending a container over a binary-line session.
    #[error("wrong session type for this operation")]
    WrongSessionType,

    /// The container model or wire codec rejected the payload.
    #[error(transparent)]
    Container(#[from] courier_core::Error),

    /// The crypto backend failed to encrypt or decrypt a payload.
    #[error(transparent)]
    Crypto(#[from] courier_crypto::CryptoError),

    /// The compression backend failed to compress or decompress a payload.
    #[error(transparent)]
    Compress(#[from] courier_compress::CompressError),

    /// The scheduler refused a job (the session has already been stopped).
    #[error(transparent)]
    Scheduler(#[from] courier_scheduler::SchedulerError),

    /// Underlying socket or file I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout `courier-session`.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
