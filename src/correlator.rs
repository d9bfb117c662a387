//! In-flight call bookkeeping.
//!
//! DESIGN
//! ======
//! Ids come from a monotonically increasing counter that starts at 1 and
//! skips any id still pending, so two live calls never share an id even
//! after the counter wraps. Every pending call carries a deadline; the
//! client actor sleeps until `next_deadline()` and then drains `expire()`.
//! A `(deadline, id)` index kept beside the table makes both of those
//! ordered lookups instead of scans.
//!
//! Lookup and removal are separate steps. `resolve` only borrows, `remove`
//! returns the owned call or `None`, so id 0 is never mistaken for "absent".

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;

/// One outstanding request awaiting a response.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub id: u64,
    /// Event dispatched when the response (or its error) arrives.
    pub event: String,
    /// Original request parameters, echoed back as `requestParams`.
    pub params: Value,
    /// Extra fields merged underneath the response.
    pub payload: Option<Map<String, Value>>,
    pub deadline: Instant,
}

#[derive(Debug)]
pub struct CallCorrelator {
    next_id: u64,
    timeout: Duration,
    pending: BTreeMap<u64, PendingCall>,
    /// Mirrors `pending`, ordered by deadline.
    deadlines: BTreeSet<(Instant, u64)>,
}

impl CallCorrelator {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { next_id: 1, timeout, pending: BTreeMap::new(), deadlines: BTreeSet::new() }
    }

    /// Issue an id that no pending call is using.
    pub fn next_id(&mut self) -> u64 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Record a pending call and return the id to put on the wire.
    pub fn register(&mut self, event: impl Into<String>, params: Value, payload: Option<Map<String, Value>>) -> u64 {
        self.register_at(event, params, payload, Instant::now())
    }

    /// Register against an explicit clock.
    fn register_at(&mut self, event: impl Into<String>, params: Value, payload: Option<Map<String, Value>>, now: Instant) -> u64 {
        let id = self.next_id();
        let deadline = now + self.timeout;
        let call = PendingCall { id, event: event.into(), params, payload, deadline };
        self.deadlines.insert((deadline, id));
        self.pending.insert(id, call);
        id
    }

    #[must_use]
    pub fn resolve(&self, id: u64) -> Option<&PendingCall> {
        self.pending.get(&id)
    }

    /// Remove a pending call. Absent ids are a no-op.
    pub fn remove(&mut self, id: u64) -> Option<PendingCall> {
        let call = self.pending.remove(&id)?;
        self.deadlines.remove(&(call.deadline, id));
        Some(call)
    }

    /// Earliest deadline among pending calls.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|&(deadline, _)| deadline)
    }

    /// Remove and return every call whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingCall> {
        let mut expired = Vec::new();
        while let Some(&(deadline, id)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            self.deadlines.pop_first();
            if let Some(call) = self.pending.remove(&id) {
                expired.push(call);
            }
        }
        expired
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
#[path = "correlator_test.rs"]
mod tests;
