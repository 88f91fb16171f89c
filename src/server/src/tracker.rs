// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! The `inFlight` call list the debug-dump signal reads from.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use conclave_api::CallMetadata;
use conclave_ore::now::{EpochMillis, Now};
use parking_lot::Mutex;

/// A snapshot of one in-flight call, as written into a debug dump.
#[derive(Clone, Debug)]
pub struct CallTrace {
    pub id: u64,
    pub rpc: &'static str,
    pub metadata: CallMetadata,
    pub started_at: EpochMillis,
}

/// The set of calls currently being dispatched, keyed by a monotonic id.
///
/// Every RPC handler enters and leaves through [`InFlightGuard`], which
/// leaves even if the handler returns early or panics, so the tracked set
/// never drifts from reality.
pub struct InFlightTracker {
    now: Now,
    next_id: AtomicU64,
    calls: Mutex<HashMap<u64, CallTrace>>,
}

impl InFlightTracker {
    pub fn new(now: Now) -> Arc<Self> {
        Arc::new(InFlightTracker {
            now,
            next_id: AtomicU64::new(1),
            calls: Mutex::new(HashMap::new()),
        })
    }

    /// Records `rpc` as in-flight under `metadata`, returning a guard that
    /// removes the entry on drop.
    pub fn enter(self: &Arc<Self>, rpc: &'static str, metadata: CallMetadata) -> InFlightGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let trace = CallTrace {
            id,
            rpc,
            metadata: metadata.clone(),
            started_at: self.now.now(),
        };
        tracing::debug!(rpc, metadata = %trace.metadata, "rpc enter");
        self.calls.lock().insert(id, trace);
        InFlightGuard {
            tracker: Arc::clone(self),
            id,
            rpc,
        }
    }

    /// The calls currently in flight, for a debug dump.
    pub fn snapshot(&self) -> Vec<CallTrace> {
        let mut traces: Vec<CallTrace> = self.calls.lock().values().cloned().collect();
        traces.sort_by_key(|t| t.id);
        traces
    }

    fn leave(&self, id: u64) {
        self.calls.lock().remove(&id);
    }
}

pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
    id: u64,
    rpc: &'static str,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        tracing::debug!(rpc = self.rpc, "rpc exit");
        self.tracker.leave(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> CallMetadata {
        CallMetadata::new("t", "u", "h", "i", 1)
    }

    #[test]
    fn entering_and_dropping_removes_the_trace() {
        let tracker = InFlightTracker::new(Now::from_fn(|| 0));
        let guard = tracker.enter("svc.method", meta());
        assert_eq!(tracker.snapshot().len(), 1);
        drop(guard);
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn concurrent_calls_each_get_a_distinct_id() {
        let tracker = InFlightTracker::new(Now::from_fn(|| 0));
        let a = tracker.enter("a", meta());
        let b = tracker.enter("b", meta());
        let ids: Vec<u64> = tracker.snapshot().iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        drop(a);
        drop(b);
    }
}
