#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{connect_peer, fast_engine, fast_server};
use crosswire_core::Value;
use crosswire_hub::dispatch::handler_fn;
use crosswire_hub::middleware::{mw_fn, ParamPlan};
use crosswire_hub::transport::TransportEvent;
use crosswire_hub::{PeerSelector, RpcServer};
use tokio::sync::mpsc;

#[tokio::test]
async fn broadcast_gathers_answers_and_nulls_silent_peers() {
    let server = RpcServer::new(fast_server());
    let (tx, rx) = mpsc::channel(8);
    server.clone().attach(rx);

    let one = connect_peer(&server, &tx, "p-one", fast_engine()).await;
    let two = connect_peer(&server, &tx, "p-two", fast_engine()).await;
    let mute = connect_peer(&server, &tx, "p-mute", fast_engine()).await;

    one.on(
        "status",
        ParamPlan::empty(),
        handler_fn(|_| Ok(Value::Str("one".into()))),
    );
    two.on(
        "status",
        ParamPlan::empty(),
        handler_fn(|_| Ok(Value::Str("two".into()))),
    );
    // The mute peer swallows incoming calls and never answers.
    mute.registries().incoming_before(mw_fn(|ctx, _| {
        ctx.drop_packet();
        Ok(None)
    }));

    let answers = server.broadcast("status", vec![]).await;
    assert_eq!(answers.len(), 3);
    assert_eq!(answers["p-one"], Value::Str("one".into()));
    assert_eq!(answers["p-two"], Value::Str("two".into()));
    assert_eq!(answers["p-mute"], Value::Null);
}

#[tokio::test]
async fn to_addresses_a_subset_of_peers() {
    let server = RpcServer::new(fast_server());
    let (tx, rx) = mpsc::channel(8);
    server.clone().attach(rx);

    let mut clients = Vec::new();
    for peer in ["p-1", "p-2", "p-3"] {
        let client = connect_peer(&server, &tx, peer, fast_engine()).await;
        let name = peer.to_string();
        client.on(
            "name",
            ParamPlan::empty(),
            handler_fn(move |_| Ok(Value::Str(name.clone()))),
        );
        clients.push(client);
    }

    let answers = server
        .to(PeerSelector::Ids(vec!["p-1".into(), "p-3".into()]))
        .call("name", vec![])
        .await;
    assert_eq!(answers.len(), 2);
    assert_eq!(answers["p-1"], Value::Str("p-1".into()));
    assert_eq!(answers["p-3"], Value::Str("p-3".into()));

    let picked = server
        .to(PeerSelector::Predicate(Arc::new(|p: &str| p.ends_with('2'))))
        .call("name", vec![])
        .await;
    assert_eq!(picked.len(), 1);
    assert_eq!(picked["p-2"], Value::Str("p-2".into()));
}

#[tokio::test]
async fn local_engine_shares_handlers_and_outgoing_middleware() {
    let server = RpcServer::new(fast_server());
    server.on(
        "sum",
        ParamPlan::positional(2),
        handler_fn(|call| {
            let a = call.params[0].as_i64().unwrap_or(0);
            let b = call.params[1].as_i64().unwrap_or(0);
            Ok(Value::Int(a + b))
        }),
    );
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    server.registries().outgoing_before(mw_fn(move |ctx, _| {
        s.lock().unwrap().push(ctx.packet.name.clone());
        Ok(None)
    }));

    let out = server
        .local()
        .call("sum", vec![Value::Int(2), Value::Int(3)])
        .await
        .unwrap();
    assert_eq!(out, Some(Value::Int(5)));
    assert_eq!(*seen.lock().unwrap(), vec!["sum".to_string()]);
}

#[tokio::test]
async fn local_engine_rejects_unknown_operations() {
    let server = RpcServer::new(fast_server());
    let err = server.local().call("missing", vec![]).await.unwrap_err();
    assert_eq!(err.code(), "API_NOT_FOUND");
}

#[tokio::test]
async fn shared_middleware_covers_every_connection() {
    let server = RpcServer::new(fast_server());
    let (tx, rx) = mpsc::channel(8);
    server.clone().attach(rx);
    server.on(
        "ping",
        ParamPlan::empty(),
        handler_fn(|_| Ok(Value::Bool(true))),
    );
    let served = Arc::new(AtomicU64::new(0));
    let s = served.clone();
    server.registries().incoming_before(mw_fn(move |_, _| {
        s.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }));

    let a = connect_peer(&server, &tx, "p-a", fast_engine()).await;
    let b = connect_peer(&server, &tx, "p-b", fast_engine()).await;
    a.call("ping", vec![]).await.unwrap();
    b.call("ping", vec![]).await.unwrap();
    assert_eq!(served.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connection_lifecycle_callbacks_fire() {
    let server = RpcServer::new(fast_server());
    let (tx, rx) = mpsc::channel(8);
    server.clone().attach(rx);

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    server.on_connect(Arc::new(move |peer: &str| {
        l.lock().unwrap_or_else(|e| e.into_inner()).push(format!("+{peer}"));
    }));
    let l = log.clone();
    server.on_disconnect(Arc::new(move |peer: &str| {
        l.lock().unwrap_or_else(|e| e.into_inner()).push(format!("-{peer}"));
    }));

    let _client = connect_peer(&server, &tx, "p-x", fast_engine()).await;
    assert_eq!(server.peers(), vec!["p-x".to_string()]);

    tx.send(TransportEvent::Disconnected("p-x".into()))
        .await
        .unwrap();
    while !server.peers().is_empty() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(*log.lock().unwrap(), vec!["+p-x".to_string(), "-p-x".to_string()]);
}
