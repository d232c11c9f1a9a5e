//! crosswire hub: the bidirectional RPC engine stack.
//!
//! This crate wires the middleware pipeline, the per-connection call engine,
//! the handler registry, and the server multiplexer into a cohesive engine
//! over any duplex transport. It is consumed by application code and by the
//! integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod channels;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod transport;

pub use client::RpcClient;
pub use engine::{CallBuilder, CallEngine, CallOptions, EngineOptions};
pub use server::{Broadcast, PeerSelector, RpcServer, ServerOptions};
