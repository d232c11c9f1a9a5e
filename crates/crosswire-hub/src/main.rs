//! crosswire hub demo
//!
//! Wires an in-process server/client pair over the memory transport:
//! - strict config load with engine defaults as fallback
//! - one shared handler on the multiplexer
//! - a single round trip, logged

use crosswire_core::Value;
use crosswire_hub::config;
use crosswire_hub::dispatch::handler_fn;
use crosswire_hub::middleware::ParamPlan;
use crosswire_hub::transport::{MemoryTransport, TransportEvent};
use crosswire_hub::{RpcClient, RpcServer, ServerOptions};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let opts = match config::load_from_file("crosswire.yaml") {
        Ok(cfg) => cfg.server_options(),
        Err(_) => ServerOptions::default(),
    };
    let engine_opts = opts.engine.clone();

    let server = RpcServer::new(opts);
    let (events, rx) = tokio::sync::mpsc::channel(8);
    server.clone().attach(rx);
    server.on(
        "sum",
        ParamPlan::positional(2),
        handler_fn(|call| {
            let a = call.params[0].as_i64().unwrap_or(0);
            let b = call.params[1].as_i64().unwrap_or(0);
            Ok(Value::Int(a + b))
        }),
    );

    let (server_half, client_half) = MemoryTransport::pair("demo-client", "server");
    events
        .send(TransportEvent::Connected(server_half))
        .await
        .expect("multiplexer stopped");
    while server.peer("demo-client").is_none() {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let client = RpcClient::connect(client_half, engine_opts);
    client.ready().await;

    let out = client
        .call("sum", vec![Value::Int(2), Value::Int(3)])
        .await
        .expect("call failed");
    tracing::info!(?out, "sum answered");
}
