#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{fast_server, serve_one};
use crosswire_core::{Result, Status, Value};
use crosswire_hub::dispatch::{Handler, HandlerCall};
use crosswire_hub::middleware::{mw_fn, ParamPlan};

struct Stall;

#[async_trait]
impl Handler for Stall {
    async fn handle(&self, _call: HandlerCall) -> Result<Value> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn unanswered_call_times_out_after_its_window() {
    let (server, client, _events) = serve_one(fast_server()).await;
    // Swallow the call on the serving side; no response ever goes back.
    server.registries().incoming_before(mw_fn(|ctx, _| {
        ctx.drop_packet();
        Ok(None)
    }));

    let window = Duration::from_millis(120);
    let started = Instant::now();
    let err = client
        .timeout(window)
        .call("void", vec![])
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.code(), "API_TIMEOUT");
    assert!(elapsed >= window, "resolved early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "sweep too slow: {elapsed:?}");
    assert_eq!(client.engine().metrics().snapshot().timeouts, 1);
}

#[tokio::test]
async fn slow_handler_times_out_the_caller() {
    let (server, client, _events) = serve_one(fast_server()).await;
    server.on("stall", ParamPlan::empty(), Arc::new(Stall));

    let err = client
        .timeout(Duration::from_millis(100))
        .call("stall", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "API_TIMEOUT");
}

#[tokio::test]
async fn timeout_is_a_raw_sentinel_when_not_throwing() {
    let mut opts = fast_server();
    opts.engine.throw_status = false;
    let (server, client, _events) = serve_one(opts).await;
    server.registries().incoming_before(mw_fn(|ctx, _| {
        ctx.drop_packet();
        Ok(None)
    }));

    let out = client
        .timeout(Duration::from_millis(100))
        .call("void", vec![])
        .await
        .unwrap();
    assert_eq!(out, Some(Value::Status(Status::Timeout)));
}

#[tokio::test]
async fn late_response_after_timeout_is_discarded() {
    let (server, client, _events) = serve_one(fast_server()).await;
    server.on("stall", ParamPlan::empty(), Arc::new(Stall));

    let err = client
        .timeout(Duration::from_millis(80))
        .call("stall", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "API_TIMEOUT");

    // A later answer for the swept id must not disturb new calls.
    server.on(
        "ping",
        ParamPlan::empty(),
        crosswire_hub::dispatch::handler_fn(|_| Ok(Value::Bool(true))),
    );
    let out = client.call("ping", vec![]).await.unwrap();
    assert_eq!(out, Some(Value::Bool(true)));
}
