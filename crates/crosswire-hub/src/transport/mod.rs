//! Transport collaborator boundary.
//!
//! The engine assumes a reliable, already-connected duplex channel with
//! named-channel emit/receive, a stable per-connection identity, and
//! connect/disconnect notification. Reliability, encryption, and reconnection
//! live on the other side of this trait.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use crosswire_core::Result;
use tokio::sync::mpsc;

pub use memory::MemoryTransport;

/// A duplex, channel-named message socket.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable identity of the peer behind this connection.
    fn peer_id(&self) -> String;

    /// Send a payload on a named channel. `compress` is advisory; the engine
    /// always requests uncompressed delivery for its own frames.
    async fn emit(&self, channel: &str, payload: Bytes, compress: bool) -> Result<()>;

    /// Receive payloads arriving on a named channel.
    fn subscribe(&self, channel: &str) -> mpsc::Receiver<Bytes>;

    /// Resolve once the underlying connection is established. Transports
    /// that are born connected resolve immediately.
    async fn wait_connected(&self) {}
}

/// Connection lifecycle notifications consumed by the server multiplexer.
pub enum TransportEvent {
    Connected(Arc<dyn Transport>),
    Disconnected(String),
}
