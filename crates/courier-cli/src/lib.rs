//! # COURIER CLI
//!
//! Library surface behind the `courier` binary: configuration loading and
//! transfer progress display, kept importable independently of `main` so
//! the doctests in [`progress`] resolve against a real crate root.

pub mod config;
pub mod progress;
