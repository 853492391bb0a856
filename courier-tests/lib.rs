//! Shared helpers for the cross-crate integration test suite.

pub mod test_helpers;
