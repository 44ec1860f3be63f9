//! Ordered job queue serviced by a pool's worker threads.
//!
//! Jobs are dispatched in non-decreasing order key, ties in submission
//! order. A job whose concurrency limit is saturated blocks the queue
//! behind it until a job sharing that limit finishes.

mod core;
mod worker;


use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

use crate::error::{JobError, PoolError};
use crate::job::{Job, JobContext, Order, ORDER_MIN};
use crate::scope::Scopes;
use crate::stats::QueueStats;

use self::core::QueueState;

struct QueueShared {
    id: Uuid,
    scopes: Scopes,
    state: Mutex<QueueState>,
    /// Signalled on submission, completion and shutdown.
    changed: Condvar,
}

/// Handle to a pool's job queue. Cheap to clone.
///
/// A clone outliving its pool also keeps the process tier of the cache
/// alive until it drops.
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<QueueShared>,
}

impl JobQueue {
    pub(crate) fn new(id: Uuid, scopes: Scopes) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                id,
                scopes,
                state: Mutex::new(QueueState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    /// Identity of the owning pool.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub(crate) fn scopes(&self) -> &Scopes {
        &self.shared.scopes
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit with the highest priority, behind earlier jobs of that order.
    pub fn submit<T>(&self, job: &Job<T>) -> Result<(), PoolError>
    where
        T: Send + Sync + 'static,
    {
        self.submit_absolute(ORDER_MIN, job)
    }

    /// Submit at `order`. Among equal orders, earlier submissions run first.
    pub fn submit_absolute<T>(&self, order: Order, job: &Job<T>) -> Result<(), PoolError>
    where
        T: Send + Sync + 'static,
    {
        let mut state = self.lock();
        if state.shutdown {
            return Err(PoolError::ShutDown);
        }
        let limit = job.limit();
        let runnable = job.claim(order, self.id()).ok_or(PoolError::AlreadySubmitted)?;
        state.push(order, runnable, limit);
        drop(state);

        self.shared.changed.notify_all();
        Ok(())
    }

    /// Submit at an order relative to the job running on this thread, or to
    /// [`ORDER_MIN`] outside a job of this queue. Saturates at the bounds.
    pub fn submit_relative<T>(&self, delta: Order, job: &Job<T>) -> Result<(), PoolError>
    where
        T: Send + Sync + 'static,
    {
        let base = JobContext::current()
            .filter(|ctx| ctx.pool_id() == self.id())
            .map_or(ORDER_MIN, |ctx| ctx.order());
        self.submit_absolute(base.saturating_add(delta), job)
    }

    /// Block until `job` finishes and return its value or its error.
    ///
    /// Called from a worker of this queue, the worker keeps running queued
    /// jobs while it waits, so nested waits cannot starve the pool. While
    /// helping it may pass a head whose limit is saturated.
    pub fn wait<'a, T>(&self, job: &'a Job<T>) -> Result<&'a T, JobError>
    where
        T: Send + Sync + 'static,
    {
        if let Some(ctx) = JobContext::current().filter(|ctx| ctx.pool_id() == self.id()) {
            if job.queue_id() == Some(self.id()) {
                self.help_until(&ctx, job.key(), || job.is_done());
            }
        }
        job.wait()
    }

    /// Block until every job in `jobs` has finished. Errors are left in the
    /// jobs for the caller to inspect.
    pub fn wait_for_all<'a, T, I>(&self, jobs: I)
    where
        T: Send + Sync + 'static,
        I: IntoIterator<Item = &'a Job<T>>,
    {
        for job in jobs {
            let _ = self.wait(job);
        }
    }

    /// Submit `f` and wait for its result.
    pub fn run<T, F, E>(&self, f: F) -> Result<T, PoolError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        let job = Job::new(f);
        self.submit(&job)?;
        self.wait(&job)?;
        Ok(job.into_result()?)
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().snapshot()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown
    }

    /// Refuse new jobs. Workers finish everything already queued, then exit.
    pub(crate) fn shutdown(&self) {
        let mut state = self.lock();
        if !state.shutdown {
            state.shutdown = true;
            debug!(pool = %self.id(), "job queue shutting down");
        }
        drop(state);
        self.shared.changed.notify_all();
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("id", &self.id())
            .field("stats", &self.stats())
            .finish()
    }
}
