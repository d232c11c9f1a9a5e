//! Handler registry: the local event-dispatch collaborator, specified at its
//! interface boundary.
//!
//! Handlers register under an operation name with a parameter plan. A name
//! may carry several handlers; a single result unwraps to its value, several
//! collapse into a sequence of their values in registration order.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use crosswire_core::{Result, Value};
use dashmap::DashMap;
use uuid::Uuid;

use crate::middleware::ParamPlan;

/// Per-invocation handler context.
#[derive(Debug, Clone)]
pub struct HandlerCtx {
    /// Correlation id of the packet being served (empty for local calls).
    pub call_id: String,
    /// Fresh id for this specific handler invocation.
    pub event_id: String,
    pub name: String,
    pub meta: BTreeMap<String, Value>,
    pub peer_id: Option<String>,
    /// The call originated on the remote side.
    pub remote: bool,
    /// Snapshot of the injection context at dispatch time.
    pub injects: BTreeMap<String, Value>,
}

/// Arguments bound per the handler's parameter plan, plus context.
#[derive(Debug, Clone)]
pub struct HandlerCall {
    pub params: Vec<Value>,
    pub ctx: HandlerCtx,
}

/// A registered operation handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, call: HandlerCall) -> Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(HandlerCall) -> Result<Value> + Send + Sync,
{
    async fn handle(&self, call: HandlerCall) -> Result<Value> {
        (self.0)(call)
    }
}

/// Wrap a synchronous closure as a handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(HandlerCall) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

struct HandlerEntry {
    id: Uuid,
    plan: ParamPlan,
    handler: Arc<dyn Handler>,
}

/// Seed for building per-invocation contexts.
#[derive(Debug, Clone, Default)]
pub struct DispatchSeed {
    pub call_id: String,
    pub name: String,
    pub meta: BTreeMap<String, Value>,
    pub peer_id: Option<String>,
    pub remote: bool,
    pub injects: BTreeMap<String, Value>,
}

/// Name-keyed handler table shared by a server and its local engines.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Vec<HandlerEntry>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`; returns its id.
    pub fn on(&self, name: impl Into<String>, plan: ParamPlan, handler: Arc<dyn Handler>) -> Uuid {
        let id = Uuid::new_v4();
        self.handlers
            .entry(name.into())
            .or_default()
            .push(HandlerEntry { id, plan, handler });
        id
    }

    /// Drop a previously registered handler.
    pub fn off(&self, id: Uuid) -> bool {
        let mut removed = false;
        for mut entry in self.handlers.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|h| h.id != id);
            removed |= entry.value().len() != before;
        }
        removed
    }

    pub fn exists(&self, name: &str) -> bool {
        self.handlers
            .get(name)
            .map(|e| !e.value().is_empty())
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }

    /// Invoke every handler for `name` in registration order.
    ///
    /// Returns `None` when no handler is registered. A single handler's value
    /// is returned as-is; several collapse into a sequence. Each invocation
    /// gets a fresh event id injected as `event_id`.
    pub async fn invoke(
        &self,
        name: &str,
        args: &[Value],
        seed: &DispatchSeed,
    ) -> Result<Option<Value>> {
        let entries: Vec<(Uuid, ParamPlan, Arc<dyn Handler>)> = match self.handlers.get(name) {
            Some(list) => list
                .value()
                .iter()
                .map(|e| (e.id, e.plan.clone(), e.handler.clone()))
                .collect(),
            None => return Ok(None),
        };
        if entries.is_empty() {
            return Ok(None);
        }

        let mut results = Vec::with_capacity(entries.len());
        for (_, plan, handler) in entries {
            let event_id = Uuid::new_v4().to_string();
            let mut injects = seed.injects.clone();
            injects.insert("event_id".into(), Value::Str(event_id.clone()));

            let params = plan.resolve(args, &injects);
            let ctx = HandlerCtx {
                call_id: seed.call_id.clone(),
                event_id,
                name: seed.name.clone(),
                meta: seed.meta.clone(),
                peer_id: seed.peer_id.clone(),
                remote: seed.remote,
                injects,
            };
            results.push(handler.handle(HandlerCall { params, ctx }).await?);
        }

        Ok(Some(if results.len() == 1 {
            results.swap_remove(0)
        } else {
            Value::Seq(results)
        }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[tokio::test]
    async fn single_handler_unwraps_and_multiple_collapse() {
        let reg = HandlerRegistry::new();
        reg.on(
            "sum",
            ParamPlan::positional(2),
            handler_fn(|call| {
                let a = call.params[0].as_i64().unwrap_or(0);
                let b = call.params[1].as_i64().unwrap_or(0);
                Ok(Value::Int(a + b))
            }),
        );

        let seed = DispatchSeed::default();
        let one = reg
            .invoke("sum", &[Value::Int(2), Value::Int(3)], &seed)
            .await
            .unwrap();
        assert_eq!(one, Some(Value::Int(5)));

        reg.on(
            "sum",
            ParamPlan::positional(2),
            handler_fn(|_| Ok(Value::Str("second".into()))),
        );
        let both = reg
            .invoke("sum", &[Value::Int(2), Value::Int(3)], &seed)
            .await
            .unwrap();
        assert_eq!(
            both,
            Some(Value::Seq(vec![Value::Int(5), Value::Str("second".into())]))
        );
    }

    #[tokio::test]
    async fn context_slots_resolve_from_injects() {
        let reg = HandlerRegistry::new();
        reg.on(
            "who",
            ParamPlan::empty().ctx("peer").ctx("event_id"),
            handler_fn(|call| {
                assert_eq!(call.params[0], Value::Str("p-9".into()));
                // Every invocation carries a fresh correlation id.
                assert!(matches!(call.params[1], Value::Str(_)));
                Ok(Value::Bool(true))
            }),
        );

        let mut seed = DispatchSeed::default();
        seed.injects.insert("peer".into(), Value::Str("p-9".into()));
        let out = reg.invoke("who", &[], &seed).await.unwrap();
        assert_eq!(out, Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn missing_name_and_off() {
        let reg = HandlerRegistry::new();
        assert!(!reg.exists("nope"));
        assert_eq!(
            reg.invoke("nope", &[], &DispatchSeed::default())
                .await
                .unwrap(),
            None
        );

        let id = reg.on("x", ParamPlan::empty(), handler_fn(|_| Ok(Value::Null)));
        assert!(reg.exists("x"));
        assert!(reg.off(id));
        assert!(!reg.exists("x"));
    }
}
