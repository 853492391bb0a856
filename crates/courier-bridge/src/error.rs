//! Bridge error kinds.

use thiserror::Error;

/// Errors raised standing up or running a [`crate::bridge::Bridge`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The downstream listener or an upstream connect attempt failed.
    #[error(transparent)]
    Session(#[from] courier_session::SessionError),

    /// The downstream server's accept loop or routing table failed.
    #[error(transparent)]
    Server(#[from] courier_server::ServerError),

    /// The container model or wire codec rejected a forwarded payload.
    #[error(transparent)]
    Container(#[from] courier_core::Error),

    /// Underlying socket or file I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout `courier-bridge`.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
