#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crosswire_hub::transport::{MemoryTransport, TransportEvent};
use crosswire_hub::{EngineOptions, RpcClient, RpcServer, ServerOptions};
use tokio::sync::mpsc;

/// Engine options tightened for tests: short window, fast sweep.
pub fn fast_engine() -> EngineOptions {
    EngineOptions {
        prefix: "api.".into(),
        timeout: Duration::from_secs(5),
        sweep_interval: Duration::from_millis(20),
        throw_status: true,
    }
}

pub fn fast_server() -> ServerOptions {
    ServerOptions {
        engine: fast_engine(),
        emit_timeout: Duration::from_millis(400),
    }
}

/// A server with one attached connection and the matching client.
pub async fn serve_one(
    opts: ServerOptions,
) -> (Arc<RpcServer>, RpcClient, mpsc::Sender<TransportEvent>) {
    let engine = opts.engine.clone();
    let server = RpcServer::new(opts);
    let (tx, rx) = mpsc::channel(8);
    server.clone().attach(rx);
    let client = connect_peer(&server, &tx, "cli-1", engine).await;
    (server, client, tx)
}

/// Feed one connection into the multiplexer and wait until it is live.
pub async fn connect_peer(
    server: &Arc<RpcServer>,
    events: &mpsc::Sender<TransportEvent>,
    peer: &str,
    engine: EngineOptions,
) -> RpcClient {
    let (server_half, client_half) = MemoryTransport::pair(peer, "server");
    events
        .send(TransportEvent::Connected(server_half))
        .await
        .unwrap();
    while server.peer(peer).is_none() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    RpcClient::connect(client_half, engine)
}
