//! Engine counters.
//!
//! Structurally invalid or mis-versioned packets are silently discarded on
//! the wire (no signal to either side), so these counters are the only
//! observable trace of them. Atomics only, shared via `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct EngineMetrics {
    /// Call packets discarded as malformed or mis-versioned.
    pub invalid_call_packets: AtomicU64,
    /// Response packets discarded as malformed or mis-versioned.
    pub invalid_response_packets: AtomicU64,
    /// Outgoing calls vetoed by middleware.
    pub dropped_calls: AtomicU64,
    /// Incoming calls vetoed by middleware.
    pub dropped_incoming_calls: AtomicU64,
    /// Responses (either leg) vetoed by middleware.
    pub dropped_responses: AtomicU64,
    /// Pending calls resolved by the deadline sweep.
    pub timeouts: AtomicU64,
    /// Errors captured inside middleware traversals.
    pub middleware_errors: AtomicU64,
    /// Errors raised by handlers during dispatch.
    pub handler_errors: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub invalid_call_packets: u64,
    pub invalid_response_packets: u64,
    pub dropped_calls: u64,
    pub dropped_incoming_calls: u64,
    pub dropped_responses: u64,
    pub timeouts: u64,
    pub middleware_errors: u64,
    pub handler_errors: u64,
}

impl EngineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            invalid_call_packets: self.invalid_call_packets.load(Ordering::Relaxed),
            invalid_response_packets: self.invalid_response_packets.load(Ordering::Relaxed),
            dropped_calls: self.dropped_calls.load(Ordering::Relaxed),
            dropped_incoming_calls: self.dropped_incoming_calls.load(Ordering::Relaxed),
            dropped_responses: self.dropped_responses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            middleware_errors: self.middleware_errors.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
