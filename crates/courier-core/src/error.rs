//! Error types for the container data model and wire codec.

use thiserror::Error;

/// Errors raised while building, parsing, or serializing a container.
#[derive(Debug, Error)]
pub enum Error {
    /// `@header={...};` was missing, had an unclosed brace, or used an
    /// unrecognized tag.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// `@data={...};` failed to parse, or a declared container child count
    /// did not match the number of children actually present.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// A value's type code fell outside the enumerated set `0..=14`.
    #[error("invalid type code: {0}")]
    InvalidType(u8),

    /// File I/O failed while loading or saving a packet.
    #[error("io failed: {0}")]
    IoFailed(#[from] std::io::Error),
}

/// Result alias used throughout `courier-core`.
pub type Result<T> = std::result::Result<T, Error>;
