// observer.rs — Reporting hook for policy outcomes.
//
// The engine calls exactly one observer once per policy, todos included, in
// evaluation order. What the observer does with it (console lines, logs,
// counters) is up to the caller.

use serde::Serialize;

use crate::policy::{Policy, PolicyStatus};

/// Receives each policy's outcome as `run()` evaluates it.
pub trait PolicyObserver {
    fn on_policy_evaluated(&mut self, policy: &Policy, status: PolicyStatus);
}

impl<F> PolicyObserver for F
where
    F: FnMut(&Policy, PolicyStatus),
{
    fn on_policy_evaluated(&mut self, policy: &Policy, status: PolicyStatus) {
        self(policy, status)
    }
}

/// Default observer: one structured `tracing` event per policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PolicyObserver for TracingObserver {
    fn on_policy_evaluated(&mut self, policy: &Policy, status: PolicyStatus) {
        tracing::info!(policy = policy.name(), status = %status, "policy evaluated");
    }
}

/// Outcome counts for a run (or several runs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PolicyStats {
    pub total: usize,
    pub ok: usize,
    pub update: usize,
    pub todo: usize,
}

impl PolicyStats {
    pub fn record(&mut self, status: PolicyStatus) {
        self.total += 1;
        match status {
            PolicyStatus::Ok => self.ok += 1,
            PolicyStatus::Update => self.update += 1,
            PolicyStatus::Todo => self.todo += 1,
        }
    }
}

impl PolicyObserver for PolicyStats {
    fn on_policy_evaluated(&mut self, _policy: &Policy, status: PolicyStatus) {
        self.record(status);
    }
}
