//! # COURIER Server
//!
//! Listener, per-peer session registry, and outbound routing (distilled
//! spec §4.4): binds a [`tokio::net::TcpListener`], hands every accepted
//! socket to [`courier_session::Session::accept`], and keeps a
//! [`registry::SessionRegistry`] of confirmed sessions keyed by the
//! `(target_id, target_sub_id)` the peer announced at handshake so that
//! outbound containers can be routed by broadcast, fan-out, or unique
//! match.
//!
//! ## Module structure
//!
//! - [`registry`]: the concurrent `(target_id, target_sub_id) -> Session`
//!   map
//! - [`server`]: [`Server`], the accept loop and routing table
//! - [`error`]: [`ServerError`]

#![warn(missing_docs)]

pub mod error;
pub mod registry;
pub mod server;

pub use error::{ServerError, ServerResult};
pub use registry::{RegistryKey, SessionRegistry};
pub use server::{Server, ServerCallbacks, ServerConfig};
