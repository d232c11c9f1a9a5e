//! Client-side connection wrapper.
//!
//! Thin facade over a client-role [`CallEngine`]: same call surface, plus a
//! readiness gate for transports that connect asynchronously.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crosswire_core::{Result, Value};
use uuid::Uuid;

use crate::dispatch::Handler;
use crate::engine::{CallBuilder, CallEngine, EngineOptions};
use crate::middleware::{ParamPlan, SharedRegistries};
use crate::transport::Transport;

pub struct RpcClient {
    engine: Arc<CallEngine>,
    transport: Arc<dyn Transport>,
}

impl RpcClient {
    pub fn connect(transport: Arc<dyn Transport>, opts: EngineOptions) -> Self {
        let engine = CallEngine::connect(transport.clone(), false, opts);
        RpcClient { engine, transport }
    }

    /// Resolves once the underlying transport is connected.
    pub async fn ready(&self) {
        self.transport.wait_connected().await;
    }

    pub fn engine(&self) -> &Arc<CallEngine> {
        &self.engine
    }

    pub fn registries(&self) -> &Arc<SharedRegistries> {
        self.engine.registries()
    }

    /// Register a handler callable by the server side.
    pub fn on(&self, name: impl Into<String>, plan: ParamPlan, handler: Arc<dyn Handler>) -> Uuid {
        self.engine.on(name, plan, handler)
    }

    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Option<Value>> {
        self.engine.call(name, args).await
    }

    pub fn meta(&self, meta: BTreeMap<String, Value>) -> CallBuilder<'_> {
        self.engine.meta(meta)
    }

    pub fn timeout(&self, timeout: Duration) -> CallBuilder<'_> {
        self.engine.timeout(timeout)
    }
}
