//! Harness version information.
//!
//! The value is taken from Cargo metadata (`CARGO_PKG_VERSION`) at compile time so the CLI and any report
//! consumer agree on it.

/// The autospec version string (for example, `0.1.0`).
pub const AUTOSPEC_VERSION: &str = env!("CARGO_PKG_VERSION");
