//! # COURIER Bridge
//!
//! The middle-tier bridge (distilled spec §4.5): a downstream
//! [`server::Server`] clients connect to, and two upstream
//! [`courier_session::Session`]s (`data_line`, `file_line`) to a main
//! server, plus a [`file_manager::FileManager`] tracking whole-file
//! transfer progress per `indication_id`.
//!
//! ## Module structure
//!
//! - [`bridge`]: [`Bridge`], the forwarding table between the three lines
//! - [`file_manager`]: the per-`indication_id` progress tracker
//! - [`error`]: [`BridgeError`]

#![warn(missing_docs)]

pub mod bridge;
pub mod error;
pub mod file_manager;

pub use bridge::{Bridge, BridgeConfig};
pub use error::{BridgeError, BridgeResult};
pub use file_manager::FileManager;
