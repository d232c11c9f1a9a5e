//! crosswire core: transport-agnostic protocol primitives.
//!
//! This crate defines the wire-level contracts shared by every crosswire
//! engine: the value model and its extensible tagged coder, the packet schema
//! and protocol version gate, the status sentinels, and the shared error
//! surface. It intentionally carries no runtime dependencies so it can be
//! reused by any transport integration.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `CrosswireError`/`Result` so engines
//! do not crash on malformed input or hostile peers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod coder;
pub mod error;
pub mod packet;
pub mod priority;
pub mod value;

/// Shared result type.
pub use error::{CrosswireError, Result};
pub use packet::{Packet, PROTOCOL_VERSION};
pub use value::{Status, Value};
