//! Wrap interceptors: an explicit chain-of-responsibility around local
//! handler dispatch.
//!
//! Interceptors run outermost-first in priority-then-registration order; each
//! one receives a `Next` handle for the rest of the chain and may short-
//! circuit by returning without calling it. The innermost step is the
//! engine's dispatch terminal (handler lookup and invocation).

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use crosswire_core::{Result, Value};
use uuid::Uuid;

use super::pipeline::MwCtx;

/// The innermost step of the chain.
#[async_trait]
pub trait Terminal: Send + Sync {
    async fn dispatch(&self, ctx: &mut MwCtx) -> Result<Value>;
}

/// An interceptor composed around dispatch.
#[async_trait]
pub trait WrapInterceptor: Send + Sync {
    async fn around(&self, ctx: &mut MwCtx, next: Next<'_>) -> Result<Value>;
}

/// Handle to the remaining chain.
pub struct Next<'a> {
    chain: &'a [WrapEntry],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [WrapEntry], terminal: &'a dyn Terminal) -> Self {
        Next { chain, terminal }
    }

    /// Invoke the rest of the chain.
    pub async fn run(self, ctx: &mut MwCtx) -> Result<Value> {
        match self.chain.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    chain: rest,
                    terminal: self.terminal,
                };
                first.interceptor.around(ctx, next).await
            }
            None => self.terminal.dispatch(ctx).await,
        }
    }
}

/// One registered interceptor.
#[derive(Clone)]
pub struct WrapEntry {
    pub id: Uuid,
    pub interceptor: Arc<dyn WrapInterceptor>,
}

/// Priority-indexed interceptor registry; lower priority is outermost.
#[derive(Default)]
pub struct WrapRegistry {
    buckets: RwLock<BTreeMap<u32, Vec<WrapEntry>>>,
}

impl WrapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, priority: u32, interceptor: Arc<dyn WrapInterceptor>) -> Uuid {
        let id = Uuid::new_v4();
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry(priority)
            .or_default()
            .push(WrapEntry { id, interceptor });
        id
    }

    /// Chain order, outermost first.
    pub fn snapshot(&self) -> Vec<WrapEntry> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.values().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use crosswire_core::{priority, Packet};

    use super::super::pipeline::MwConfig;
    use super::*;

    struct Tag {
        label: &'static str,
    }

    #[async_trait]
    impl WrapInterceptor for Tag {
        async fn around(&self, ctx: &mut MwCtx, next: Next<'_>) -> Result<Value> {
            let inner = next.run(ctx).await?;
            Ok(Value::Seq(vec![Value::Str(self.label.into()), inner]))
        }
    }

    struct Leaf;

    #[async_trait]
    impl Terminal for Leaf {
        async fn dispatch(&self, _ctx: &mut MwCtx) -> Result<Value> {
            Ok(Value::Str("leaf".into()))
        }
    }

    #[tokio::test]
    async fn lower_priority_wraps_outermost() {
        let reg = WrapRegistry::new();
        reg.add(priority::NORMAL, Arc::new(Tag { label: "inner" }));
        reg.add(priority::FIRST, Arc::new(Tag { label: "outer" }));

        let chain = reg.snapshot();
        let mut ctx = MwCtx::new(
            Packet::new("id", "x", vec![]),
            None,
            false,
            true,
            false,
            MwConfig::default(),
        );
        let out = Next::new(&chain, &Leaf).run(&mut ctx).await.unwrap();

        // outer(inner(leaf))
        assert_eq!(
            out,
            Value::Seq(vec![
                Value::Str("outer".into()),
                Value::Seq(vec![Value::Str("inner".into()), Value::Str("leaf".into())]),
            ])
        );
    }

    struct ShortCircuit;

    #[async_trait]
    impl WrapInterceptor for ShortCircuit {
        async fn around(&self, _ctx: &mut MwCtx, _next: Next<'_>) -> Result<Value> {
            Ok(Value::Str("blocked".into()))
        }
    }

    #[tokio::test]
    async fn interceptor_can_skip_the_rest() {
        let reg = WrapRegistry::new();
        reg.add(priority::FIRST, Arc::new(ShortCircuit));
        reg.add(priority::NORMAL, Arc::new(Tag { label: "never" }));

        let chain = reg.snapshot();
        let mut ctx = MwCtx::new(
            Packet::new("id", "x", vec![]),
            None,
            false,
            true,
            false,
            MwConfig::default(),
        );
        let out = Next::new(&chain, &Leaf).run(&mut ctx).await.unwrap();
        assert_eq!(out, Value::Str("blocked".into()));
    }
}
