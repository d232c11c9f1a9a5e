//! Priority-indexed middleware registries.
//!
//! Three independent registries exist per engine group: incoming (both legs
//! of serving a request), outgoing (both legs of issuing a call), and wrap
//! (interceptors around local dispatch). A server shares one
//! `SharedRegistries` by `Arc` across every per-connection engine, so a
//! middleware registered once applies to all connections, present and future.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use crosswire_core::{priority, Result, Value};
use uuid::Uuid;

use super::param::ParamPlan;
use super::pipeline::MwCtx;
use super::wrap::{WrapInterceptor, WrapRegistry};

/// A phased middleware function.
///
/// Returning `Ok(Some(v))` breaks the traversal result to `v`; `Ok(None)`
/// continues; an `Err` is captured as API_ERROR. Mutations go through the
/// context.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn invoke(&self, ctx: &mut MwCtx, params: Vec<Value>) -> Result<Option<Value>>;
}

struct FnMw<F>(F);

#[async_trait]
impl<F> Middleware for FnMw<F>
where
    F: Fn(&mut MwCtx, Vec<Value>) -> Result<Option<Value>> + Send + Sync,
{
    async fn invoke(&self, ctx: &mut MwCtx, params: Vec<Value>) -> Result<Option<Value>> {
        (self.0)(ctx, params)
    }
}

/// Wrap a synchronous closure as middleware.
pub fn mw_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(&mut MwCtx, Vec<Value>) -> Result<Option<Value>> + Send + Sync + 'static,
{
    Arc::new(FnMw(f))
}

/// One registered middleware.
#[derive(Clone)]
pub struct MwEntry {
    pub id: Uuid,
    pub plan: ParamPlan,
    pub mw: Arc<dyn Middleware>,
    /// `None` runs in both phases, `Some(true)` after only, `Some(false)`
    /// before only.
    pub is_after: Option<bool>,
}

/// Lookup result: where an entry lives.
#[derive(Clone)]
pub struct MwLocation {
    pub priority: u32,
    pub position: usize,
    pub entry: MwEntry,
}

/// One priority-indexed registry. Lower priority runs first; registration
/// order breaks ties within a priority.
#[derive(Default)]
pub struct MwRegistry {
    buckets: RwLock<BTreeMap<u32, Vec<MwEntry>>>,
}

impl MwRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register at a priority; returns the entry id.
    pub fn add(
        &self,
        priority: u32,
        plan: ParamPlan,
        is_after: Option<bool>,
        mw: Arc<dyn Middleware>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets.entry(priority).or_default().push(MwEntry {
            id,
            plan,
            mw,
            is_after,
        });
        id
    }

    /// Flattened traversal order: ascending priority, then registration
    /// order. Snapshotted so traversal never holds the lock across awaits.
    pub fn snapshot(&self) -> Vec<MwEntry> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.values().flatten().cloned().collect()
    }

    pub fn find(&self, id: Uuid) -> Option<MwLocation> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        for (priority, entries) in buckets.iter() {
            for (position, entry) in entries.iter().enumerate() {
                if entry.id == id {
                    return Some(MwLocation {
                        priority: *priority,
                        position,
                        entry: entry.clone(),
                    });
                }
            }
        }
        None
    }
}

/// The three registries one engine group shares.
#[derive(Default)]
pub struct SharedRegistries {
    pub incoming: MwRegistry,
    pub outgoing: MwRegistry,
    pub wrap: WrapRegistry,
}

impl SharedRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incoming_at(
        &self,
        priority: u32,
        plan: ParamPlan,
        is_after: Option<bool>,
        mw: Arc<dyn Middleware>,
    ) -> Uuid {
        self.incoming.add(priority, plan, is_after, mw)
    }

    pub fn outgoing_at(
        &self,
        priority: u32,
        plan: ParamPlan,
        is_after: Option<bool>,
        mw: Arc<dyn Middleware>,
    ) -> Uuid {
        self.outgoing.add(priority, plan, is_after, mw)
    }

    /// Both phases, normal priority.
    pub fn incoming_any(&self, mw: Arc<dyn Middleware>) -> Uuid {
        self.incoming.add(priority::NORMAL, ParamPlan::empty(), None, mw)
    }

    pub fn incoming_before(&self, mw: Arc<dyn Middleware>) -> Uuid {
        self.incoming
            .add(priority::NORMAL, ParamPlan::empty(), Some(false), mw)
    }

    pub fn incoming_after(&self, mw: Arc<dyn Middleware>) -> Uuid {
        self.incoming
            .add(priority::NORMAL, ParamPlan::empty(), Some(true), mw)
    }

    /// Both phases, normal priority.
    pub fn outgoing_any(&self, mw: Arc<dyn Middleware>) -> Uuid {
        self.outgoing.add(priority::NORMAL, ParamPlan::empty(), None, mw)
    }

    pub fn outgoing_before(&self, mw: Arc<dyn Middleware>) -> Uuid {
        self.outgoing
            .add(priority::NORMAL, ParamPlan::empty(), Some(false), mw)
    }

    pub fn outgoing_after(&self, mw: Arc<dyn Middleware>) -> Uuid {
        self.outgoing
            .add(priority::NORMAL, ParamPlan::empty(), Some(true), mw)
    }

    pub fn wrap_at(&self, priority: u32, interceptor: Arc<dyn WrapInterceptor>) -> Uuid {
        self.wrap.add(priority, interceptor)
    }

    pub fn wrap(&self, interceptor: Arc<dyn WrapInterceptor>) -> Uuid {
        self.wrap.add(priority::NORMAL, interceptor)
    }

    /// Locate a phased middleware by id, incoming first, then outgoing.
    pub fn get_middleware(&self, id: Uuid) -> Option<MwLocation> {
        self.incoming.find(id).or_else(|| self.outgoing.find(id))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn snapshot_orders_by_priority_then_registration() {
        let reg = MwRegistry::new();
        let noop = mw_fn(|_ctx, _p| Ok(None));
        let late = reg.add(priority::LAST, ParamPlan::empty(), None, noop.clone());
        let a = reg.add(priority::NORMAL, ParamPlan::empty(), None, noop.clone());
        let b = reg.add(priority::NORMAL, ParamPlan::empty(), None, noop.clone());
        let early = reg.add(priority::FIRST, ParamPlan::empty(), None, noop);

        let order: Vec<Uuid> = reg.snapshot().iter().map(|e| e.id).collect();
        assert_eq!(order, vec![early, a, b, late]);
    }

    #[test]
    fn find_reports_priority_and_position() {
        let regs = SharedRegistries::new();
        let noop = mw_fn(|_ctx, _p| Ok(None));
        regs.outgoing_before(noop.clone());
        let id = regs.outgoing_before(noop);

        let loc = regs.get_middleware(id).unwrap();
        assert_eq!(loc.priority, priority::NORMAL);
        assert_eq!(loc.position, 1);
        assert_eq!(loc.entry.is_after, Some(false));
        assert!(regs.get_middleware(Uuid::new_v4()).is_none());
    }
}
