//! Jobs: opaque callables carrying their completion state, captured
//! outcome, order key and an optional concurrency cap.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};

use serde::Serialize;
use uuid::Uuid;

use crate::error::JobError;
use crate::scope::Scopes;

/// Order (priority) key. Lower values are dispatched first.
pub type Order = i32;

/// Highest priority, and the key used by a plain `submit`.
pub const ORDER_MIN: Order = Order::MIN;
/// Lowest priority.
pub const ORDER_MAX: Order = Order::MAX;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobState::Created,
            1 => JobState::Pending,
            2 => JobState::Running,
            3 => JobState::Done,
            _ => JobState::Failed,
        }
    }

    /// `Done` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// Cap on how many jobs sharing this limit may run at the same time.
///
/// Clones share the same counter, which is how replicas of one callable
/// are throttled together.
#[derive(Clone)]
pub struct ConcurrencyLimit {
    inner: Arc<LimitInner>,
}

struct LimitInner {
    max: usize,
    running: AtomicUsize,
}

impl ConcurrencyLimit {
    /// A cap of `max` concurrently running jobs. Zero is treated as one.
    pub fn new(max: usize) -> Self {
        Self {
            inner: Arc::new(LimitInner {
                max: max.max(1),
                running: AtomicUsize::new(0),
            }),
        }
    }

    pub fn max(&self) -> usize {
        self.inner.max
    }

    /// Jobs currently running under this limit.
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    // Counter updates happen under the queue lock; the atomic only makes
    // `running()` readable from outside it.
    pub(crate) fn has_capacity(&self) -> bool {
        self.running() < self.inner.max
    }

    pub(crate) fn acquire(&self) {
        self.inner.running.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) {
        self.inner.running.fetch_sub(1, Ordering::AcqRel);
    }

    /// Whether both handles count against the same cap.
    pub(crate) fn same(&self, other: &ConcurrencyLimit) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyLimit")
            .field("max", &self.max())
            .field("running", &self.running())
            .finish()
    }
}

/// What a running job can learn about where it runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    order: Order,
    worker: usize,
    pool_id: Uuid,
    scopes: Scopes,
    limit: Option<ConcurrencyLimit>,
}

thread_local! {
    static CURRENT: RefCell<Option<JobContext>> = const { RefCell::new(None) };
}

impl JobContext {
    pub(crate) fn new(order: Order, worker: usize, pool_id: Uuid, scopes: Scopes) -> Self {
        Self {
            order,
            worker,
            pool_id,
            scopes,
            limit: None,
        }
    }

    /// Record the limit the running job holds a slot of.
    pub(crate) fn holding(mut self, limit: Option<ConcurrencyLimit>) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn held_limit(&self) -> Option<&ConcurrencyLimit> {
        self.limit.as_ref()
    }

    /// Context of the job executing on this thread, if any.
    pub fn current() -> Option<JobContext> {
        CURRENT.with(|cur| cur.borrow().clone())
    }

    /// Order key the job was submitted with.
    pub fn order(&self) -> Order {
        self.order
    }

    /// Index of the worker thread running the job.
    pub fn worker_index(&self) -> usize {
        self.worker
    }

    pub fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    /// Scope triple of the owning pool.
    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// Install `self` as the current context until the guard drops.
    pub(crate) fn enter(self) -> ContextGuard {
        let previous = CURRENT.with(|cur| cur.replace(Some(self)));
        ContextGuard { previous }
    }
}

pub(crate) struct ContextGuard {
    previous: Option<JobContext>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|cur| *cur.borrow_mut() = previous);
    }
}

/// Run `f`, turning both its error and a panic into a [`JobError`].
pub(crate) fn capture<T, F>(f: F) -> Result<T, JobError>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(JobError::failed(err)),
        Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()).into())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Type-erased view of a job as the queue sees it.
pub(crate) trait Runnable: Send + Sync {
    /// Execute the job and publish its outcome. Returns `false` if it failed.
    fn run(self: Arc<Self>) -> bool;
}

type Task<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

#[derive(Default)]
struct Signal {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn notify(&self) {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self.cond.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

pub(crate) struct JobInner<T> {
    task: Mutex<Option<Task<T>>>,
    state: AtomicU8,
    order: AtomicI32,
    queue: OnceLock<Uuid>,
    limit: Mutex<Option<ConcurrencyLimit>>,
    outcome: OnceLock<Result<T, JobError>>,
    signal: Arc<Signal>,
}

impl<T> JobInner<T> {
    fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl<T: Send + Sync + 'static> Runnable for JobInner<T> {
    fn run(self: Arc<Self>) -> bool {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // The queue hands each job out once; a missing task means it already ran.
        let Some(task) = task else {
            return !matches!(self.state(), JobState::Failed);
        };

        self.set_state(JobState::Running);
        let outcome = capture(task);
        let ok = outcome.is_ok();
        let _ = self.outcome.set(outcome);
        self.set_state(if ok { JobState::Done } else { JobState::Failed });

        // Waiters may unwrap the job once signalled, so our handle goes first.
        let signal = Arc::clone(&self.signal);
        drop(self);
        signal.notify();
        ok
    }
}

/// A unit of work: a callable plus its completion state and outcome.
///
/// A job is submitted at most once. Its outcome is either the value or the
/// error returned by the callable, never both; a panic inside the callable
/// is captured as [`JobError::Panicked`].
pub struct Job<T> {
    inner: Arc<JobInner<T>>,
}

impl<T: Send + Sync + 'static> Job<T> {
    /// Wrap a callable. Any error type convertible to `anyhow::Error` is
    /// accepted and kept for later downcasting.
    pub fn new<F, E>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        let task: Task<T> = Box::new(move || f().map_err(Into::<anyhow::Error>::into));
        Self {
            inner: Arc::new(JobInner {
                task: Mutex::new(Some(task)),
                state: AtomicU8::new(JobState::Created as u8),
                order: AtomicI32::new(ORDER_MIN),
                queue: OnceLock::new(),
                limit: Mutex::new(None),
                outcome: OnceLock::new(),
                signal: Arc::new(Signal::default()),
            }),
        }
    }

    /// Run under `limit`, shared with every other job holding a clone of it.
    /// Has no effect once the job is submitted.
    pub fn with_limit(self, limit: ConcurrencyLimit) -> Self {
        *self.inner.limit.lock().unwrap_or_else(PoisonError::into_inner) = Some(limit);
        self
    }

    /// Shorthand for a private limit of `max` concurrent runs.
    pub fn max_concurrent(self, max: usize) -> Self {
        self.with_limit(ConcurrencyLimit::new(max))
    }

    /// `count` jobs wrapping clones of `f`. With `limit`, all replicas share it.
    pub fn replicate<F, E>(f: F, count: usize, limit: Option<ConcurrencyLimit>) -> Vec<Job<T>>
    where
        F: FnOnce() -> Result<T, E> + Clone + Send + 'static,
        E: Into<anyhow::Error>,
    {
        (0..count)
            .map(|_| {
                let job = Job::new(f.clone());
                match &limit {
                    Some(limit) => job.with_limit(limit.clone()),
                    None => job,
                }
            })
            .collect()
    }

    pub fn state(&self) -> JobState {
        self.inner.state()
    }

    /// True once the job has finished, successfully or not.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Order key the job was submitted with, `None` before submission.
    pub fn order(&self) -> Option<Order> {
        match self.state() {
            JobState::Created => None,
            _ => Some(self.inner.order.load(Ordering::Acquire)),
        }
    }

    /// The value of a finished job, or its error. Calling this again on a
    /// failed job returns the same error.
    pub fn get(&self) -> Result<&T, JobError> {
        match self.inner.outcome.get() {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(err.clone()),
            None if self.state() == JobState::Created => Err(JobError::NotSubmitted),
            None => Err(JobError::NotFinished),
        }
    }

    /// Block until the job finishes, then behave like [`Job::get`].
    ///
    /// This is a hard wait; a worker that must wait on a job of its own
    /// queue should use [`JobQueue::wait`](crate::JobQueue::wait), which
    /// keeps dispatching while it waits.
    pub fn wait(&self) -> Result<&T, JobError> {
        if self.state() == JobState::Created {
            return Err(JobError::NotSubmitted);
        }
        self.inner.signal.wait();
        self.get()
    }

    /// Block until finished and take the value out of the job.
    pub fn into_result(self) -> Result<T, JobError> {
        self.wait()?;
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner.outcome.into_inner().unwrap_or(Err(JobError::NotFinished)),
            Err(inner) => match inner.outcome.get() {
                Some(Err(err)) => Err(err.clone()),
                _ => Err(JobError::NotFinished),
            },
        }
    }

    /// Claim the job for submission at `order` to queue `queue`.
    pub(crate) fn claim(&self, order: Order, queue: Uuid) -> Option<Arc<dyn Runnable>> {
        self.inner
            .state
            .compare_exchange(
                JobState::Created as u8,
                JobState::Pending as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;
        self.inner.order.store(order, Ordering::Release);
        let _ = self.inner.queue.set(queue);
        Some(Arc::clone(&self.inner) as Arc<dyn Runnable>)
    }

    /// Identity the queue knows this job by.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Queue the job was submitted to.
    pub(crate) fn queue_id(&self) -> Option<Uuid> {
        self.inner.queue.get().copied()
    }

    pub(crate) fn limit(&self) -> Option<ConcurrencyLimit> {
        self.inner
            .limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("state", &self.inner.state())
            .field("order", &self.inner.order.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
