//! Parallel-for helpers built from replicated jobs.
//!
//! Every form hands out work through one shared [`WorkDescriptor`]: each
//! replica repeatedly claims the next index from an atomic cursor until the
//! range is exhausted, which balances load without any further locking.
//! With zero threads or no pool the work runs inline on the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::PoolError;
use crate::job::{capture, ConcurrencyLimit, Job, Order, ORDER_MIN};
use crate::pool::Pool;

/// State shared by all replicas of one parallel call.
struct WorkDescriptor<S> {
    state: S,
    cursor: AtomicUsize,
    end: usize,
}

impl<S> WorkDescriptor<S> {
    fn new(state: S, end: usize) -> Self {
        Self {
            state,
            cursor: AtomicUsize::new(0),
            end,
        }
    }

    /// Claim the next unprocessed index.
    fn next(&self) -> Option<usize> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        (i < self.end).then_some(i)
    }
}

/// Options for one parallel call.
///
/// ```no_run
/// # use weft_pool::{Parallel, Pool};
/// # use weft_core::PoolConfig;
/// let pool = Pool::construct(PoolConfig::fixed(4))?;
/// Parallel::new(Some(&*pool))
///     .max_concurrent(2)
///     .index(|i| { println!("{i}"); Ok::<_, anyhow::Error>(()) }, 100)?;
/// # Ok::<_, weft_pool::PoolError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Parallel<'p> {
    pool: Option<&'p Pool>,
    threads: usize,
    order: Order,
    max_concurrent: Option<usize>,
}

impl<'p> Parallel<'p> {
    /// Use every worker of `pool`; without a pool everything runs inline.
    pub fn new(pool: Option<&'p Pool>) -> Self {
        Self {
            pool,
            threads: pool.map_or(0, Pool::num_threads),
            order: ORDER_MIN,
            max_concurrent: None,
        }
    }

    /// Number of pool jobs to use. Zero runs inline on the caller.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Order key for the submitted jobs.
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Cap on how many of this call's jobs may run at once.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max);
        self
    }

    fn target(&self) -> Option<&'p Pool> {
        self.pool.filter(|_| self.threads > 0)
    }

    fn limit(&self) -> Option<ConcurrencyLimit> {
        self.max_concurrent.map(ConcurrencyLimit::new)
    }

    /// Apply `op` to every element of `items`.
    pub fn range<T, F, E>(self, items: impl Into<Arc<[T]>>, op: F) -> Result<(), PoolError>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let items: Arc<[T]> = items.into();
        let end = items.len();
        self.index(move |i| op(&items[i]), end)
    }

    /// Call `state` once with every index in `[0, end)`.
    pub fn index<S, E>(self, state: S, end: usize) -> Result<(), PoolError>
    where
        S: Fn(usize) -> Result<(), E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let Some(pool) = self.target() else {
            return capture(|| {
                for i in 0..end {
                    state(i).map_err(Into::<anyhow::Error>::into)?;
                }
                Ok(())
            })
            .map_err(PoolError::from);
        };

        // Replicas past `end` would find the cursor exhausted.
        let replicas = self.threads.min(end).saturating_add(1);
        let work = Arc::new(WorkDescriptor::new(state, end));
        let jobs = Job::replicate(
            move || -> anyhow::Result<()> {
                while let Some(i) = work.next() {
                    (work.state)(i).map_err(Into::<anyhow::Error>::into)?;
                }
                Ok(())
            },
            replicas,
            self.limit(),
        );
        let (accepted, submitted) = self.submit_all(pool, &jobs);
        let outcome = collect(pool, &jobs[..accepted]);
        submitted?;
        outcome
    }

    /// Run `op` on `threads` jobs and once more on the calling thread.
    ///
    /// Errors from the jobs are reported before the caller's own.
    pub fn replicate<F, E>(self, op: F) -> Result<(), PoolError>
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let op = Arc::new(op);
        let Some(pool) = self.target() else {
            return capture(|| op().map_err(Into::<anyhow::Error>::into)).map_err(PoolError::from);
        };

        let shared = Arc::clone(&op);
        let jobs = Job::replicate(
            move || shared().map_err(Into::<anyhow::Error>::into),
            self.threads,
            self.limit(),
        );
        let (accepted, submitted) = self.submit_all(pool, &jobs);
        let local = capture(|| op().map_err(Into::<anyhow::Error>::into));
        let outcome = collect(pool, &jobs[..accepted]);
        submitted?;
        outcome?;
        local.map_err(PoolError::from)
    }

    /// Submit `jobs` in order, stopping at the first rejection. Returns how
    /// many were accepted.
    fn submit_all(&self, pool: &Pool, jobs: &[Job<()>]) -> (usize, Result<(), PoolError>) {
        for (accepted, job) in jobs.iter().enumerate() {
            if let Err(err) = pool.submit_absolute(self.order, job) {
                return (accepted, Err(err));
            }
        }
        (jobs.len(), Ok(()))
    }
}

/// Wait for every job, then report the first error in job order.
fn collect(pool: &Pool, jobs: &[Job<()>]) -> Result<(), PoolError> {
    pool.wait_for_all(jobs);
    for job in jobs {
        job.get()?;
    }
    Ok(())
}

/// Apply `op` to every element of `items` using `threads` pool jobs.
pub fn parallelize_range<T, F, E>(
    pool: Option<&Pool>,
    items: impl Into<Arc<[T]>>,
    op: F,
    threads: usize,
) -> Result<(), PoolError>
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
    E: Into<anyhow::Error>,
{
    Parallel::new(pool).threads(threads).range(items, op)
}

/// Call `state` with every index in `[0, end)` using `threads` pool jobs.
pub fn parallelize_index<S, E>(
    pool: Option<&Pool>,
    state: S,
    end: usize,
    threads: usize,
) -> Result<(), PoolError>
where
    S: Fn(usize) -> Result<(), E> + Send + Sync + 'static,
    E: Into<anyhow::Error>,
{
    Parallel::new(pool).threads(threads).index(state, end)
}

/// Run `op` on `threads` pool jobs plus once on the calling thread.
pub fn parallelize_replicate<F, E>(
    pool: Option<&Pool>,
    op: F,
    threads: usize,
) -> Result<(), PoolError>
where
    F: Fn() -> Result<(), E> + Send + Sync + 'static,
    E: Into<anyhow::Error>,
{
    Parallel::new(pool).threads(threads).replicate(op)
}
