//! # COURIER Core
//!
//! The typed message container and wire codec at the heart of the COURIER
//! protocol: a labelled value tree (`Value`), the routed envelope that
//! carries it (`Container`), and the encoders/decoder for the wire formats
//! in `codec`.
//!
//! ## Module Structure
//!
//! - [`value`]: the tagged-variant value tree
//! - [`container`]: the routed, internally-synchronized envelope
//! - [`codec`]: text (round-trip), JSON and XML (emit-only) wire encodings
//! - [`error`]: error types and result handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod container;
pub mod error;
pub mod value;

pub use container::{Container, DEFAULT_MESSAGE_TYPE, DEFAULT_VERSION};
pub use error::{Error, Result};
pub use value::{Value, ValueKind, ValuePath};
