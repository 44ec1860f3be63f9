use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use uuid::Uuid;
use weft_core::PoolConfig;

use crate::error::{JobError, PoolError};
use crate::job::{Job, Order};
use crate::queue::JobQueue;
use crate::scope::Scopes;
use crate::stats::QueueStats;

/// A fixed set of worker threads servicing one [`JobQueue`], plus the
/// pool's cache tiers.
///
/// Dropping the last handle shuts the queue down, lets the workers finish
/// every queued job and joins them.
pub struct Pool {
    id: Uuid,
    config: PoolConfig,
    queue: JobQueue,
    scopes: Scopes,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Validate `config`, start the workers and return the running pool.
    ///
    /// The configuration is published in the instance tier so collaborators
    /// can read it through [`Scopes::instance`].
    pub fn construct(config: PoolConfig) -> Result<Arc<Pool>, PoolError> {
        config.validate()?;
        let num_threads = config.resolved_threads();
        let id = Uuid::new_v4();
        let scopes = Scopes::new();
        let published = config.clone();
        scopes.instance().get_or_init(move || published);
        let queue = JobQueue::new(id, scopes.clone());

        let mut pool = Pool {
            id,
            config,
            queue,
            scopes,
            workers: Vec::with_capacity(num_threads),
        };

        for index in 0..num_threads {
            let queue = pool.queue.clone();
            let name = format!("{}-{}", pool.config.thread_name_prefix, index);
            // On failure `pool` drops here, which stops and joins the workers
            // started so far.
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || queue.serve(index))
                .map_err(PoolError::Spawn)?;
            pool.workers.push(handle);
        }

        info!(
            pool = %id,
            threads = num_threads,
            adaptive = pool.config.adaptive_threads,
            "Pool started with {} workers",
            num_threads
        );
        Ok(Arc::new(pool))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn submit<T>(&self, job: &Job<T>) -> Result<(), PoolError>
    where
        T: Send + Sync + 'static,
    {
        self.queue.submit(job)
    }

    pub fn submit_absolute<T>(&self, order: Order, job: &Job<T>) -> Result<(), PoolError>
    where
        T: Send + Sync + 'static,
    {
        self.queue.submit_absolute(order, job)
    }

    pub fn wait<'a, T>(&self, job: &'a Job<T>) -> Result<&'a T, JobError>
    where
        T: Send + Sync + 'static,
    {
        self.queue.wait(job)
    }

    pub fn wait_for_all<'a, T, I>(&self, jobs: I)
    where
        T: Send + Sync + 'static,
        I: IntoIterator<Item = &'a Job<T>>,
    {
        self.queue.wait_for_all(jobs)
    }

    /// Run `f` on a worker and wait for its result.
    pub fn run<T, F, E>(&self, f: F) -> Result<T, PoolError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        self.queue.run(f)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.queue.shutdown();
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            if handle.thread().id() == current {
                debug!(pool = %self.id, "pool dropped by its own worker, detaching it");
                continue;
            }
            if handle.join().is_err() {
                warn!(pool = %self.id, "worker thread panicked");
            }
        }
        let stats = self.queue.stats();
        info!(
            pool = %self.id,
            completed = stats.completed,
            failed = stats.failed,
            "Pool shut down"
        );
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("num_threads", &self.workers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
