use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::job::{ConcurrencyLimit, Order, Runnable};
use crate::stats::QueueStats;

/// A submitted job waiting for a worker.
struct Entry {
    job: Arc<dyn Runnable>,
    limit: Option<ConcurrencyLimit>,
}

impl Entry {
    fn key(&self) -> usize {
        Arc::as_ptr(&self.job) as *const () as usize
    }

    fn may_start(&self) -> bool {
        self.limit.as_ref().map_or(true, ConcurrencyLimit::has_capacity)
    }
}

/// A job taken off the queue, with its limit already acquired.
pub(super) struct Dispatch {
    pub(super) order: Order,
    pub(super) job: Arc<dyn Runnable>,
    pub(super) limit: Option<ConcurrencyLimit>,
}

/// Everything guarded by the queue mutex.
#[derive(Default)]
pub(super) struct QueueState {
    /// Keyed by (order, submission sequence) so equal orders stay FIFO.
    pending: BTreeMap<(Order, u64), Entry>,
    next_seq: u64,
    running: usize,
    pub(super) shutdown: bool,
    submitted: u64,
    completed: u64,
    failed: u64,
}

impl QueueState {
    pub(super) fn push(
        &mut self,
        order: Order,
        job: Arc<dyn Runnable>,
        limit: Option<ConcurrencyLimit>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.submitted += 1;
        self.pending.insert((order, seq), Entry { job, limit });
    }

    /// Take the head of the queue if it may start now.
    ///
    /// The head is never overtaken: while its limit is saturated nothing is
    /// dispatched, even if later jobs would be eligible.
    pub(super) fn take_next(&mut self) -> Option<Dispatch> {
        let head = self.pending.first_entry()?;
        if let Some(limit) = &head.get().limit {
            if !limit.has_capacity() {
                return None;
            }
            limit.acquire();
        }
        let ((order, _), entry) = head.remove_entry();
        Some(self.dispatch(order, entry))
    }

    /// Pick work for a worker blocked on the job keyed `awaited` while its
    /// own job holds a slot of `held`.
    ///
    /// A saturated head does not stop a helper: it takes the first entry
    /// that may start instead. Failing that, the awaited job runs on the
    /// waiter's slot when both share `held`.
    pub(super) fn take_for_helper(
        &mut self,
        awaited: usize,
        held: Option<&ConcurrencyLimit>,
    ) -> Option<Dispatch> {
        if let Some(dispatch) = self.take_next() {
            return Some(dispatch);
        }
        let lends = |entry: &Entry| match (&entry.limit, held) {
            (Some(limit), Some(held)) => entry.key() == awaited && limit.same(held),
            _ => false,
        };
        let key = self
            .pending
            .iter()
            .find(|&(_, entry)| entry.may_start())
            .or_else(|| self.pending.iter().find(|&(_, entry)| lends(entry)))
            .map(|(key, _)| *key)?;
        let entry = self.pending.remove(&key)?;
        if let Some(limit) = &entry.limit {
            limit.acquire();
        }
        Some(self.dispatch(key.0, entry))
    }

    fn dispatch(&mut self, order: Order, entry: Entry) -> Dispatch {
        self.running += 1;
        Dispatch {
            order,
            job: entry.job,
            limit: entry.limit,
        }
    }

    pub(super) fn finish(&mut self, limit: Option<&ConcurrencyLimit>, ok: bool) {
        if let Some(limit) = limit {
            limit.release();
        }
        self.running -= 1;
        self.completed += 1;
        if !ok {
            self.failed += 1;
        }
    }

    /// Nothing left to hand out and nobody will submit more.
    pub(super) fn drained(&self) -> bool {
        self.shutdown && self.pending.is_empty()
    }

    pub(super) fn snapshot(&self) -> QueueStats {
        QueueStats {
            submitted: self.submitted,
            completed: self.completed,
            failed: self.failed,
            pending: self.pending.len(),
            running: self.running,
            shut_down: self.shutdown,
            taken_at: Utc::now(),
        }
    }
}
