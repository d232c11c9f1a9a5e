//! Top-level facade crate for crosswire.
//!
//! Re-exports the protocol core and the hub library so users can depend on a
//! single crate.

pub mod core {
    pub use crosswire_core::*;
}

pub mod hub {
    pub use crosswire_hub::*;
}
