//! # COURIER Session
//!
//! The framed TCP session protocol (distilled spec §4.3): a
//! `START_CODE/MODE/LENGTH/PAYLOAD/END_CODE` frame, a
//! `request_connection`/`confirm_connection` handshake state machine, and
//! the packet/file/binary send and receive pipelines, each stage
//! dispatched through [`courier_scheduler::Scheduler`] at the priority the
//! spec assigns it.
//!
//! ## Module structure
//!
//! - [`frame`]: the wire frame and its resync-on-bad-start-code reader
//! - [`handshake`]: `request_connection`/`confirm_connection` container
//!   shapes and the echo probe/reply
//! - [`pipeline`]: compress→encrypt (send) / decrypt→decompress (receive),
//!   scheduler-mediated
//! - [`file_transfer`]: the file-mode wire payload
//! - [`binary`]: the binary-mode wire payload
//! - [`session`]: [`Session`], the handshake state machine and dispatch loop

#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]

pub mod binary;
pub mod error;
pub mod file_transfer;
pub mod frame;
pub mod handshake;
pub mod pipeline;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use frame::{Frame, FrameCodes, Mode};
pub use handshake::SessionKind;
pub use session::{Callbacks, ConfirmState, Session, SessionConfig};
