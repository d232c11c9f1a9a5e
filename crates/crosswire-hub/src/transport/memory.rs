//! In-memory duplex transport.
//!
//! Two cross-wired halves sharing channel tables: whatever one side emits on
//! a channel lands in the other side's subscription for that channel. Born
//! connected; used by tests and as the reference transport implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use crosswire_core::{CrosswireError, Result};
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::Transport;

const QUEUE_DEPTH: usize = 64;

type ChannelTable = Arc<DashMap<String, mpsc::Sender<Bytes>>>;

/// One half of an in-memory duplex pair.
pub struct MemoryTransport {
    peer_id: String,
    /// The remote side's subscriptions; emits land here.
    remote: ChannelTable,
    /// This side's subscriptions; the remote emits into these.
    local: ChannelTable,
}

impl MemoryTransport {
    /// Build a connected pair. `left_peer` names the peer as seen from the
    /// left half, and vice versa.
    pub fn pair(
        left_peer: impl Into<String>,
        right_peer: impl Into<String>,
    ) -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
        let a: ChannelTable = Arc::new(DashMap::new());
        let b: ChannelTable = Arc::new(DashMap::new());
        let left = Arc::new(MemoryTransport {
            peer_id: left_peer.into(),
            remote: b.clone(),
            local: a.clone(),
        });
        let right = Arc::new(MemoryTransport {
            peer_id: right_peer.into(),
            remote: a,
            local: b,
        });
        (left, right)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn peer_id(&self) -> String {
        self.peer_id.clone()
    }

    async fn emit(&self, channel: &str, payload: Bytes, _compress: bool) -> Result<()> {
        // Emitting on a channel nobody listens to is not an error; the
        // payload just goes nowhere, as on a real socket.
        let Some(tx) = self.remote.get(channel).map(|e| e.value().clone()) else {
            return Ok(());
        };
        tx.send(payload)
            .await
            .map_err(|_| CrosswireError::Transport(format!("channel {channel} closed")))
    }

    fn subscribe(&self, channel: &str) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        self.local.insert(channel.to_string(), tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[tokio::test]
    async fn emits_cross_the_pair() {
        let (left, right) = MemoryTransport::pair("srv", "cli");
        let mut on_right = right.subscribe("ch");

        left.emit("ch", Bytes::from_static(b"ping"), false)
            .await
            .unwrap();
        assert_eq!(on_right.recv().await.unwrap(), Bytes::from_static(b"ping"));

        // Unsubscribed channel: silently dropped.
        left.emit("nobody", Bytes::from_static(b"x"), false)
            .await
            .unwrap();
    }
}
