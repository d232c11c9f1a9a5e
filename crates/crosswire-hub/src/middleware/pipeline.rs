//! The middleware pipeline engine.
//!
//! One traversal runs every applicable entry of a registry against a packet:
//! ascending priority, registration order within a priority, phase-matching
//! entries only. Errors never escape a traversal; they are captured into the
//! packet and forced into an API_ERROR break.

use std::collections::BTreeMap;

use crosswire_core::{Packet, Status, Value};
use uuid::Uuid;

use super::registry::MwRegistry;

/// Free-form traversal configuration, carried from the serving legs.
#[derive(Debug, Clone, Default)]
pub struct MwConfig {
    /// Correlation id of the call a response leg belongs to.
    pub api_packet_id: Option<String>,
    /// An earlier leg captured an error.
    pub has_error: bool,
    pub error_description: Option<String>,
}

/// Injection context for one pipeline traversal.
///
/// Owns the packet while middleware runs; the engine takes it back when the
/// traversal finishes. The `injects` map is what context parameter slots
/// resolve against, seeded with the packet fields and role flags and
/// refreshed after every middleware invocation.
pub struct MwCtx {
    pub packet: Packet,
    pub injects: BTreeMap<String, Value>,
    /// Ids of every middleware that ran in this traversal.
    pub mw_affected: Vec<Uuid>,
    pub peer_id: Option<String>,
    pub is_after: bool,
    pub is_server: bool,
    pub is_local: bool,
    pub config: MwConfig,
}

impl MwCtx {
    pub fn new(
        packet: Packet,
        peer_id: Option<String>,
        is_after: bool,
        is_server: bool,
        is_local: bool,
        config: MwConfig,
    ) -> Self {
        let mut ctx = MwCtx {
            packet,
            injects: BTreeMap::new(),
            mw_affected: Vec::new(),
            peer_id,
            is_after,
            is_server,
            is_local,
            config,
        };
        ctx.refresh_injects();
        ctx
    }

    pub fn is_before(&self) -> bool {
        !self.is_after
    }

    /// Sync the packet-derived keys of the injection map.
    pub fn refresh_injects(&mut self) {
        self.injects
            .insert("id".into(), Value::Str(self.packet.id.clone()));
        self.injects
            .insert("name".into(), Value::Str(self.packet.name.clone()));
        self.injects
            .insert("args".into(), Value::Seq(self.packet.args.clone()));
        self.injects
            .insert("meta".into(), Value::Map(self.packet.meta.clone()));
        self.injects.insert(
            "peer".into(),
            match &self.peer_id {
                Some(p) => Value::Str(p.clone()),
                None => Value::Null,
            },
        );
        self.injects
            .insert("is_after".into(), Value::Bool(self.is_after));
        self.injects
            .insert("is_before".into(), Value::Bool(!self.is_after));
        self.injects
            .insert("is_server".into(), Value::Bool(self.is_server));
        self.injects
            .insert("is_local".into(), Value::Bool(self.is_local));
    }

    /// Replace the packet's positional arguments.
    pub fn set_args(&mut self, args: Vec<Value>) {
        self.packet.args = args;
    }

    /// Replace one positional argument.
    pub fn set_arg(&mut self, idx: usize, val: Value) {
        if idx < self.packet.args.len() {
            self.packet.args[idx] = val;
        }
    }

    /// Add a context injection.
    pub fn add(&mut self, key: impl Into<String>, val: Value) {
        self.injects.insert(key.into(), val);
    }

    /// Remove a context injection.
    pub fn del(&mut self, key: &str) -> Option<Value> {
        self.injects.remove(key)
    }

    /// Look up a context injection.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.injects.get(key)
    }

    /// Veto delivery entirely.
    pub fn drop_packet(&mut self) {
        self.packet.dropped = true;
    }

    /// Substitute `ret` as the sole result. Marks the short-circuit flag;
    /// the traversal itself keeps going unless `skip_mw` is also set.
    pub fn break_with(&mut self, ret: Value) {
        self.packet.breaked = true;
        self.packet.args = vec![ret];
    }

    /// Abort the entire remaining traversal, all priorities and phases.
    pub fn skip_mw(&mut self) {
        self.packet.skip_mw = true;
    }
}

/// Run one traversal of `registry` against the context's packet.
pub async fn run(registry: &MwRegistry, ctx: &mut MwCtx) {
    ctx.refresh_injects();
    for entry in registry.snapshot() {
        if let Some(is_after) = entry.is_after {
            if is_after != ctx.is_after {
                continue;
            }
        }
        ctx.mw_affected.push(entry.id);

        // Middleware positional slots never see call arguments; only
        // context slots carry data into the function.
        let params = entry.plan.resolve(&[], &ctx.injects);
        let ret = entry.mw.invoke(ctx, params).await;
        ctx.refresh_injects();

        match ret {
            Ok(Some(v)) => {
                ctx.packet.breaked = true;
                ctx.packet.args = vec![v];
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(name = %ctx.packet.name, error = %e, "middleware error captured");
                ctx.break_with(Value::Status(Status::ApiError));
                ctx.packet.has_error = true;
                ctx.packet.error_description = Some(e.to_string());
            }
        }

        if ctx.packet.skip_mw {
            break;
        }
    }
}
