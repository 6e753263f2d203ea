//! Bounded-concurrency admission control.
//!
//! Every listing fetch and every clone runs through one [`ConcurrencyGate`]
//! per mirror run. The gate holds a semaphore with `limit` permits. A task
//! starts only after it holds a permit, and the permit is returned when the
//! task finishes, fails, or is dropped mid-flight.

use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use crate::error::MirrorError;

#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Semaphore,
    limit: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGate {
    /// A gate admitting at most `limit` tasks at once. A limit of zero is
    /// raised to one so the gate can always make progress.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Semaphore::new(limit),
            limit,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of tasks that ever held a slot at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Wait for a free slot, then drive `task` to completion.
    ///
    /// The task's own error is returned as-is after the slot is released.
    pub async fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| MirrorError::GateClosed)?;
        let _slot = Slot::enter(self);
        task.await
    }
}

/// Bookkeeping for one admitted task. Dropped before the permit, so the
/// in-flight count never exceeds the limit.
struct Slot<'a> {
    gate: &'a ConcurrencyGate,
}

impl<'a> Slot<'a> {
    fn enter(gate: &'a ConcurrencyGate) -> Self {
        let now = gate.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gate.peak.fetch_max(now, Ordering::SeqCst);
        Self { gate }
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
