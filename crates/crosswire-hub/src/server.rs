//! The server multiplexer.
//!
//! One [`RpcServer`] fans a connection stream out into per-connection
//! [`CallEngine`]s that all share a single handler table, middleware
//! registries, and coder. Registering a handler or middleware once makes it
//! live on every current and future connection.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crosswire_core::coder::Coder;
use crosswire_core::Value;
use dashmap::DashMap;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::dispatch::{Handler, HandlerRegistry};
use crate::engine::{CallEngine, CallOptions, EngineOptions};
use crate::middleware::{ParamPlan, SharedRegistries};
use crate::transport::TransportEvent;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub engine: EngineOptions,
    /// Per-peer window for broadcast answers.
    pub emit_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            engine: EngineOptions::default(),
            emit_timeout: Duration::from_secs(60 * 8),
        }
    }
}

/// Which peers a broadcast addresses.
#[derive(Clone)]
pub enum PeerSelector {
    All,
    Ids(Vec<String>),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl PeerSelector {
    fn matches(&self, peer: &str) -> bool {
        match self {
            PeerSelector::All => true,
            PeerSelector::Ids(ids) => ids.iter().any(|id| id == peer),
            PeerSelector::Predicate(pred) => pred(peer),
        }
    }
}

type PeerCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Multiplexes shared registries over every accepted connection.
pub struct RpcServer {
    opts: ServerOptions,
    registries: Arc<SharedRegistries>,
    dispatch: Arc<HandlerRegistry>,
    coder: Arc<Coder>,
    peers: DashMap<String, Arc<CallEngine>>,
    local: Arc<CallEngine>,
    on_connect: RwLock<Vec<PeerCallback>>,
    on_disconnect: RwLock<Vec<PeerCallback>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RpcServer {
    pub fn new(opts: ServerOptions) -> Arc<Self> {
        let registries = Arc::new(SharedRegistries::new());
        let dispatch = Arc::new(HandlerRegistry::new());
        let coder = Arc::new(Coder::new());
        let local = CallEngine::build(
            None,
            true,
            true,
            opts.engine.clone(),
            registries.clone(),
            dispatch.clone(),
            coder.clone(),
        );
        Arc::new(RpcServer {
            opts,
            registries,
            dispatch,
            coder,
            peers: DashMap::new(),
            local,
            on_connect: RwLock::new(Vec::new()),
            on_disconnect: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Consume a connection event stream, spinning an engine up per accepted
    /// transport and tearing it down on disconnect.
    pub fn attach(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        let server = Arc::downgrade(&self);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(server) = server.upgrade() else { break };
                match event {
                    TransportEvent::Connected(transport) => {
                        let peer = transport.peer_id();
                        let engine = CallEngine::build(
                            Some(transport),
                            true,
                            false,
                            server.opts.engine.clone(),
                            server.registries.clone(),
                            server.dispatch.clone(),
                            server.coder.clone(),
                        );
                        tracing::info!(peer = %peer, "connection accepted");
                        server.peers.insert(peer.clone(), engine);
                        server.notify(&server.on_connect, &peer);
                    }
                    TransportEvent::Disconnected(peer) => {
                        if server.peers.remove(&peer).is_some() {
                            tracing::info!(peer = %peer, "connection closed");
                            server.notify(&server.on_disconnect, &peer);
                        }
                    }
                }
            }
        });
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    fn notify(&self, list: &RwLock<Vec<PeerCallback>>, peer: &str) {
        if let Ok(list) = list.read() {
            for cb in list.iter() {
                cb(peer);
            }
        }
    }

    pub fn on_connect(&self, cb: PeerCallback) {
        if let Ok(mut list) = self.on_connect.write() {
            list.push(cb);
        }
    }

    pub fn on_disconnect(&self, cb: PeerCallback) {
        if let Ok(mut list) = self.on_disconnect.write() {
            list.push(cb);
        }
    }

    /// Register a handler shared by every connection.
    pub fn on(&self, name: impl Into<String>, plan: ParamPlan, handler: Arc<dyn Handler>) -> Uuid {
        self.dispatch.on(name, plan, handler)
    }

    pub fn registries(&self) -> &Arc<SharedRegistries> {
        &self.registries
    }

    pub fn dispatch(&self) -> &Arc<HandlerRegistry> {
        &self.dispatch
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn peer(&self, id: &str) -> Option<Arc<CallEngine>> {
        self.peers.get(id).map(|e| e.value().clone())
    }

    /// In-process engine over the shared registries; calls through it never
    /// touch a socket but run the full pipeline.
    pub fn local(&self) -> &Arc<CallEngine> {
        &self.local
    }

    /// Address a subset of peers.
    pub fn to(&self, selector: PeerSelector) -> Broadcast<'_> {
        Broadcast {
            server: self,
            selector,
            opts: CallOptions::default(),
        }
    }

    /// Call every connected peer, gathering answers per peer id.
    pub async fn broadcast(&self, name: &str, args: Vec<Value>) -> BTreeMap<String, Value> {
        self.to(PeerSelector::All).call(name, args).await
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.lock() {
            for task in tasks.iter() {
                task.abort();
            }
        }
    }
}

/// A pending fan-out call over selected peers.
pub struct Broadcast<'a> {
    server: &'a RpcServer,
    selector: PeerSelector,
    opts: CallOptions,
}

impl<'a> Broadcast<'a> {
    pub fn meta(mut self, meta: BTreeMap<String, Value>) -> Self {
        self.opts.meta.extend(meta);
        self
    }

    /// Call each selected peer concurrently. A peer that errors, drops the
    /// call, or misses the emit window contributes `Value::Null`; the result
    /// map always holds one entry per addressed peer.
    pub async fn call(self, name: &str, args: Vec<Value>) -> BTreeMap<String, Value> {
        let window = self.server.opts.emit_timeout;
        let selected: Vec<(String, Arc<CallEngine>)> = self
            .server
            .peers
            .iter()
            .filter(|e| self.selector.matches(e.key()))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut futs = FuturesUnordered::new();
        for (peer, engine) in selected {
            let name = name.to_string();
            let args = args.clone();
            let opts = self.opts.clone();
            futs.push(async move {
                let answer =
                    match tokio::time::timeout(window, engine.call_with(&name, args, opts)).await {
                        Ok(Ok(Some(value))) => value,
                        Ok(Ok(None)) => Value::Null,
                        Ok(Err(e)) => {
                            tracing::debug!(peer = %peer, error = %e, "broadcast answer failed");
                            Value::Null
                        }
                        Err(_) => {
                            tracing::debug!(peer = %peer, "broadcast answer timed out");
                            Value::Null
                        }
                    };
                (peer, answer)
            });
        }

        let mut answers = BTreeMap::new();
        while let Some((peer, answer)) = futs.next().await {
            answers.insert(peer, answer);
        }
        answers
    }
}
