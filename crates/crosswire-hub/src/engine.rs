//! The per-connection call engine.
//!
//! Drives the four-phase call lifecycle: outgoing call, incoming call,
//! outgoing response, incoming response. Outgoing legs run the outgoing
//! registry, incoming legs the incoming registry — the same registered
//! middleware sees both sides of serving a request (before on the arriving
//! call, after on the departing response).
//!
//! Pending calls are resolved exactly once, by response, error, or the
//! deadline sweep — whichever wins the `DashMap::remove`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use crosswire_core::coder::Coder;
use crosswire_core::{CrosswireError, Packet, Result, Status, Value};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::channels::{self, ChannelNames};
use crate::dispatch::{DispatchSeed, Handler, HandlerRegistry};
use crate::metrics::EngineMetrics;
use crate::middleware::{
    pipeline, MwConfig, MwCtx, Next, ParamPlan, SharedRegistries, Terminal,
};
use crate::transport::Transport;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Channel name prefix; both sides must agree on it.
    pub prefix: String,
    /// Default per-call response window.
    pub timeout: Duration,
    /// Deadline sweep period.
    pub sweep_interval: Duration,
    /// Surface status sentinels as rejections instead of raw values.
    pub throw_status: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            timeout: Duration::from_secs(60 * 10),
            sweep_interval: Duration::from_secs(5),
            throw_status: true,
        }
    }
}

/// Per-call overrides folded into the packet before the outgoing leg.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub meta: BTreeMap<String, Value>,
    pub timeout: Option<Duration>,
}

/// Builder returned by [`CallEngine::meta`] / [`CallEngine::timeout`].
pub struct CallBuilder<'a> {
    engine: &'a CallEngine,
    opts: CallOptions,
}

impl<'a> CallBuilder<'a> {
    /// Attach per-call meta annotations.
    pub fn meta(mut self, meta: BTreeMap<String, Value>) -> Self {
        self.opts.meta.extend(meta);
        self
    }

    /// Override this call's timeout window.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = Some(timeout);
        self
    }

    pub async fn call(self, name: &str, args: Vec<Value>) -> Result<Option<Value>> {
        self.engine.call_with(name, args, self.opts).await
    }
}

struct Resolution {
    value: Value,
    error: Option<String>,
}

struct Pending {
    deadline: Instant,
    tx: oneshot::Sender<Resolution>,
}

type PeerCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// One side of a call/response connection.
pub struct CallEngine {
    opts: EngineOptions,
    is_server: bool,
    is_local: bool,
    channels: ChannelNames,
    coder: Arc<Coder>,
    registries: Arc<SharedRegistries>,
    dispatch: Arc<HandlerRegistry>,
    transport: Option<Arc<dyn Transport>>,
    pending: DashMap<String, Pending>,
    metrics: Arc<EngineMetrics>,
    on_connect: RwLock<Vec<PeerCallback>>,
    on_disconnect: RwLock<Vec<PeerCallback>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CallEngine {
    /// Engine over a connected transport, with its own registries.
    pub fn connect(
        transport: Arc<dyn Transport>,
        is_server: bool,
        opts: EngineOptions,
    ) -> Arc<Self> {
        Self::build(
            Some(transport),
            is_server,
            false,
            opts,
            Arc::new(SharedRegistries::new()),
            Arc::new(HandlerRegistry::new()),
            Arc::new(Coder::new()),
        )
    }

    /// Standalone in-process engine: no socket, calls dispatch to the local
    /// handler table through the same pipeline.
    pub fn local(opts: EngineOptions) -> Arc<Self> {
        Self::build(
            None,
            true,
            true,
            opts,
            Arc::new(SharedRegistries::new()),
            Arc::new(HandlerRegistry::new()),
            Arc::new(Coder::new()),
        )
    }

    pub(crate) fn build(
        transport: Option<Arc<dyn Transport>>,
        is_server: bool,
        is_local: bool,
        opts: EngineOptions,
        registries: Arc<SharedRegistries>,
        dispatch: Arc<HandlerRegistry>,
        coder: Arc<Coder>,
    ) -> Arc<Self> {
        let channels = channels::derive(&opts.prefix, is_server);
        let engine = Arc::new(CallEngine {
            opts,
            is_server,
            is_local,
            channels,
            coder,
            registries,
            dispatch,
            transport,
            pending: DashMap::new(),
            metrics: Arc::new(EngineMetrics::default()),
            on_connect: RwLock::new(Vec::new()),
            on_disconnect: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        });
        engine.clone().spawn_tasks();
        engine
    }

    fn spawn_tasks(self: Arc<Self>) {
        let mut tasks = Vec::new();

        if let Some(transport) = &self.transport {
            let mut calls = transport.subscribe(&self.channels.cmd_from);
            let weak = Arc::downgrade(&self);
            tasks.push(tokio::spawn(async move {
                while let Some(raw) = calls.recv().await {
                    let Some(engine) = weak.upgrade() else { break };
                    if let Err(e) = engine.incoming_call(raw).await {
                        // A handler or response-leg middleware raised; the
                        // API_ERROR response is already on the wire.
                        tracing::error!(error = %e, "serving incoming call failed");
                    }
                }
                if let Some(engine) = weak.upgrade() {
                    engine.notify_disconnect();
                }
            }));

            let mut responses = transport.subscribe(&self.channels.cmd_to_ret);
            let weak = Arc::downgrade(&self);
            tasks.push(tokio::spawn(async move {
                while let Some(raw) = responses.recv().await {
                    let Some(engine) = weak.upgrade() else { break };
                    if let Err(e) = engine.incoming_response(raw).await {
                        tracing::warn!(error = %e, "handling incoming response failed");
                    }
                }
            }));

            let transport = transport.clone();
            let weak = Arc::downgrade(&self);
            tasks.push(tokio::spawn(async move {
                transport.wait_connected().await;
                if let Some(engine) = weak.upgrade() {
                    engine.notify_connect();
                }
            }));
        }

        let weak = Arc::downgrade(&self);
        let period = self.opts.sweep_interval;
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(engine) = weak.upgrade() else { break };
                engine.sweep();
            }
        }));

        if let Ok(mut slot) = self.tasks.lock() {
            *slot = tasks;
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn channels(&self) -> &ChannelNames {
        &self.channels
    }

    pub fn peer_id(&self) -> Option<String> {
        self.transport.as_ref().map(|t| t.peer_id())
    }

    pub fn registries(&self) -> &Arc<SharedRegistries> {
        &self.registries
    }

    pub fn dispatch(&self) -> &Arc<HandlerRegistry> {
        &self.dispatch
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Register a handler on the local dispatch table.
    pub fn on(&self, name: impl Into<String>, plan: ParamPlan, handler: Arc<dyn Handler>) -> Uuid {
        self.dispatch.on(name, plan, handler)
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

    fn notify_connect(&self) {
        let peer = self.peer_id().unwrap_or_default();
        if let Ok(list) = self.on_connect.read() {
            for cb in list.iter() {
                cb(&peer);
            }
        }
    }

    fn notify_disconnect(&self) {
        let peer = self.peer_id().unwrap_or_default();
        if let Ok(list) = self.on_disconnect.read() {
            for cb in list.iter() {
                cb(&peer);
            }
        }
    }

    /// Attach per-call meta, then call.
    pub fn meta(&self, meta: BTreeMap<String, Value>) -> CallBuilder<'_> {
        CallBuilder {
            engine: self,
            opts: CallOptions {
                meta,
                timeout: None,
            },
        }
    }

    /// Override the timeout for one call.
    pub fn timeout(&self, timeout: Duration) -> CallBuilder<'_> {
        CallBuilder {
            engine: self,
            opts: CallOptions {
                meta: BTreeMap::new(),
                timeout: Some(timeout),
            },
        }
    }

    /// Invoke a named remote operation with positional arguments.
    ///
    /// Resolves exactly once: with the correlated result, with a substitute
    /// value a middleware broke in, with `None` when a middleware dropped the
    /// call, or with a timeout/sentinel rejection.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Option<Value>> {
        self.call_with(name, args, CallOptions::default()).await
    }

    pub async fn call_with(
        &self,
        name: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> Result<Option<Value>> {
        let timeout = opts.timeout.unwrap_or(self.opts.timeout);
        let id = Uuid::new_v4().to_string();
        let mut packet = Packet::new(id.clone(), name.trim(), args);
        packet.meta.extend(opts.meta);

        let mut ctx = MwCtx::new(
            packet,
            self.peer_id(),
            false,
            self.is_server,
            self.is_local,
            MwConfig::default(),
        );
        pipeline::run(&self.registries.outgoing, &mut ctx).await;
        let packet = ctx.packet;

        if packet.has_error {
            EngineMetrics::bump(&self.metrics.middleware_errors);
            return Err(CrosswireError::Remote(
                packet
                    .error_description
                    .unwrap_or_else(|| "middleware error".into()),
            ));
        }
        if packet.dropped {
            EngineMetrics::bump(&self.metrics.dropped_calls);
            tracing::debug!(name = %packet.name, "outgoing call dropped by middleware");
            return Ok(None);
        }
        if packet.breaked {
            return Ok(Some(
                packet.args.into_iter().next().unwrap_or(Value::Absent),
            ));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            Pending {
                deadline: Instant::now() + timeout,
                tx,
            },
        );

        let sent = if self.is_local {
            self.local_fast_path(packet).await
        } else if let Some(transport) = &self.transport {
            match packet.encode(&self.coder) {
                Ok(raw) => transport.emit(&self.channels.cmd_to, raw, false).await,
                Err(e) => Err(e),
            }
        } else {
            Err(CrosswireError::Internal(
                "engine has neither transport nor local mode".into(),
            ))
        };
        if let Err(e) = sent {
            self.pending.remove(&id);
            return Err(e);
        }

        let res = rx
            .await
            .map_err(|_| CrosswireError::Internal("engine shut down".into()))?;
        self.finish(res)
    }

    fn finish(&self, res: Resolution) -> Result<Option<Value>> {
        if let Some(desc) = res.error {
            return Err(CrosswireError::Remote(desc));
        }
        if self.opts.throw_status {
            if let Some(status) = res.value.as_status() {
                return Err(status.into());
            }
        }
        Ok(Some(res.value))
    }

    /// Local mode: dispatch in-process and feed the synthesized response
    /// through the normal response path, serialization included, minus the
    /// wire.
    async fn local_fast_path(&self, mut packet: Packet) -> Result<()> {
        let ret = if self.dispatch.exists(&packet.name) {
            let seed = DispatchSeed {
                call_id: packet.id.clone(),
                name: packet.name.clone(),
                meta: packet.meta.clone(),
                peer_id: None,
                remote: false,
                injects: BTreeMap::new(),
            };
            match self.dispatch.invoke(&packet.name, &packet.args, &seed).await {
                Ok(Some(v)) => v,
                Ok(None) => Value::Status(Status::NotFound),
                Err(e) => {
                    EngineMetrics::bump(&self.metrics.handler_errors);
                    return Err(e);
                }
            }
        } else {
            Value::Status(Status::NotFound)
        };

        packet.args = vec![ret];
        let raw = packet.encode(&self.coder)?;
        self.incoming_response(raw).await
    }

    /// A call packet arrived on the wire.
    pub(crate) async fn incoming_call(&self, raw: Bytes) -> Result<()> {
        let packet = match Packet::decode(&self.coder, raw) {
            Ok(p) if p.check() => p,
            Ok(_) | Err(_) => {
                EngineMetrics::bump(&self.metrics.invalid_call_packets);
                tracing::warn!(peer = ?self.peer_id(), "discarding invalid call packet");
                return Ok(());
            }
        };

        let call_id = packet.id.clone();
        let name = packet.name.trim().to_string();

        let mut ctx = MwCtx::new(
            packet,
            self.peer_id(),
            false,
            self.is_server,
            self.is_local,
            MwConfig::default(),
        );
        ctx.packet.name = name.clone();
        pipeline::run(&self.registries.incoming, &mut ctx).await;

        if ctx.packet.dropped {
            EngineMetrics::bump(&self.metrics.dropped_incoming_calls);
            tracing::debug!(name = %name, "incoming call dropped by middleware");
            return Ok(());
        }

        if ctx.packet.breaked {
            let has_error = ctx.packet.has_error;
            if has_error {
                EngineMetrics::bump(&self.metrics.middleware_errors);
            }
            let ret = if has_error {
                Value::Status(Status::ApiError)
            } else {
                ctx.packet.args.first().cloned().unwrap_or(Value::Absent)
            };
            let cfg = MwConfig {
                api_packet_id: Some(call_id),
                has_error,
                error_description: ctx.packet.error_description.clone(),
            };
            return self.outgoing_response(&name, cfg, ret).await;
        }

        let chain = self.registries.wrap.snapshot();
        let terminal = DispatchTerminal {
            dispatch: self.dispatch.clone(),
            peer_id: self.peer_id(),
        };
        match Next::new(&chain, &terminal).run(&mut ctx).await {
            Ok(ret) => {
                let cfg = MwConfig {
                    api_packet_id: Some(call_id),
                    has_error: false,
                    error_description: None,
                };
                self.outgoing_response(&name, cfg, ret).await
            }
            Err(e) => {
                EngineMetrics::bump(&self.metrics.handler_errors);
                let cfg = MwConfig {
                    api_packet_id: Some(call_id),
                    has_error: true,
                    error_description: Some(e.to_string()),
                };
                self.outgoing_response(&name, cfg, Value::Status(Status::ApiError))
                    .await
            }
        }
    }

    /// Send a response for a served call. Runs the incoming registry's
    /// after phase, so the middleware that saw the call also sees its
    /// response. When an error was captured anywhere in the serving leg,
    /// the wire carries API_ERROR and the error is re-raised here after
    /// transmission.
    pub(crate) async fn outgoing_response(
        &self,
        name: &str,
        cfg: MwConfig,
        ret: Value,
    ) -> Result<()> {
        // Responses only exist for correlated calls.
        let Some(id) = cfg.api_packet_id.clone() else {
            return Ok(());
        };
        let leg_error = cfg.has_error;
        let leg_desc = cfg.error_description.clone();

        let packet = Packet::new(id, name.trim(), vec![ret]);
        let mut ctx = MwCtx::new(
            packet,
            self.peer_id(),
            true,
            self.is_server,
            self.is_local,
            cfg,
        );
        pipeline::run(&self.registries.incoming, &mut ctx).await;
        let mut packet = ctx.packet;

        if packet.dropped {
            EngineMetrics::bump(&self.metrics.dropped_responses);
            tracing::debug!(name = %packet.name, "outgoing response dropped by middleware");
            return Ok(());
        }
        if self.is_local {
            return Ok(());
        }

        if leg_error {
            packet.args = vec![Value::Status(Status::ApiError)];
        }
        let raw = packet.encode(&self.coder)?;
        let Some(transport) = &self.transport else {
            return Err(CrosswireError::Internal("engine has no transport".into()));
        };
        transport
            .emit(&self.channels.cmd_from_ret, raw, false)
            .await?;

        if packet.has_error || leg_error {
            let desc = packet
                .error_description
                .or(leg_desc)
                .unwrap_or_else(|| "handler error".into());
            return Err(CrosswireError::Remote(desc));
        }
        Ok(())
    }

    /// A response packet arrived for a call this side sent.
    pub(crate) async fn incoming_response(&self, raw: Bytes) -> Result<()> {
        let mut packet = match Packet::decode(&self.coder, raw) {
            Ok(p) if p.check() => p,
            Ok(_) | Err(_) => {
                EngineMetrics::bump(&self.metrics.invalid_response_packets);
                tracing::warn!(peer = ?self.peer_id(), "discarding invalid response packet");
                return Ok(());
            }
        };
        packet.name = packet.name.trim().to_string();

        let mut ctx = MwCtx::new(
            packet,
            self.peer_id(),
            true,
            self.is_server,
            self.is_local,
            MwConfig::default(),
        );
        pipeline::run(&self.registries.outgoing, &mut ctx).await;
        let packet = ctx.packet;

        if packet.dropped {
            EngineMetrics::bump(&self.metrics.dropped_responses);
            tracing::debug!(name = %packet.name, "incoming response dropped; caller will time out");
            return Ok(());
        }

        let id = packet.id;
        let error = if packet.has_error {
            Some(
                packet
                    .error_description
                    .unwrap_or_else(|| "remote error".into()),
            )
        } else {
            None
        };
        let mut args = packet.args;
        let value = if args.len() == 1 {
            args.swap_remove(0)
        } else {
            Value::Seq(args)
        };

        // First resolution wins; a sweep that already fired leaves nothing
        // to remove and this becomes a no-op.
        if let Some((_, pending)) = self.pending.remove(&id) {
            let _ = pending.tx.send(Resolution { value, error });
        }
        Ok(())
    }

    /// Fail-fast every pending call whose deadline has passed.
    fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|e| e.value().deadline <= now)
            .map(|e| e.key().clone())
            .collect();
        for id in expired {
            if let Some((_, pending)) = self.pending.remove(&id) {
                EngineMetrics::bump(&self.metrics.timeouts);
                tracing::debug!(call_id = %id, "pending call timed out");
                let _ = pending.tx.send(Resolution {
                    value: Value::Status(Status::Timeout),
                    error: None,
                });
            }
        }
    }
}

impl Drop for CallEngine {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.lock() {
            for task in tasks.iter() {
                task.abort();
            }
        }
    }
}

struct DispatchTerminal {
    dispatch: Arc<HandlerRegistry>,
    peer_id: Option<String>,
}

#[async_trait]
impl Terminal for DispatchTerminal {
    async fn dispatch(&self, ctx: &mut MwCtx) -> Result<Value> {
        let name = ctx.packet.name.clone();
        if !self.dispatch.exists(&name) {
            return Ok(Value::Status(Status::NotFound));
        }
        let seed = DispatchSeed {
            call_id: ctx.packet.id.clone(),
            name: name.clone(),
            meta: ctx.packet.meta.clone(),
            peer_id: self.peer_id.clone(),
            remote: true,
            injects: ctx.injects.clone(),
        };
        let args = ctx.packet.args.clone();
        match self.dispatch.invoke(&name, &args, &seed).await? {
            Some(v) => Ok(v),
            None => Ok(Value::Status(Status::NotFound)),
        }
    }
}
