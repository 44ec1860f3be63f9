use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::error::PoolError;
use crate::job::{Job, JobContext};
use crate::pool::Pool;
use crate::thread_set::ThreadSet;

/// Run `op` exactly once on every worker of `pool`.
///
/// Each worker receives its 1-based arrival index and holds its thread
/// until all workers have arrived, so no worker runs `op` twice. Results
/// come back in submission order; the first error is returned instead.
///
/// The pool should be otherwise idle: a worker busy with a long job delays
/// the rendezvous for everyone. Calling this from one of the pool's own
/// workers is rejected, since that worker could never arrive.
pub fn broadcast<R, F, E>(pool: &Pool, op: F) -> Result<Vec<R>, PoolError>
where
    R: Send + Sync + 'static,
    F: Fn(usize) -> Result<R, E> + Send + Sync + 'static,
    E: Into<anyhow::Error>,
{
    if JobContext::current().is_some_and(|ctx| ctx.pool_id() == pool.id()) {
        return Err(PoolError::BroadcastFromWorker);
    }

    let workers = pool.num_threads();
    let rendezvous: Arc<ThreadSet> = Arc::new(ThreadSet::new(workers));
    let op = Arc::new(op);
    let jobs: Vec<Job<R>> = (0..workers)
        .map(|_| {
            let rendezvous = Arc::clone(&rendezvous);
            let op = Arc::clone(&op);
            Job::new(move || {
                let arrival = rendezvous.visit_current();
                // Arrive at the rendezvous even if `op` panics, or the
                // other workers would wait forever.
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| op(arrival)));
                rendezvous.wait();
                match outcome {
                    Ok(result) => result.map_err(Into::<anyhow::Error>::into),
                    Err(payload) => panic::resume_unwind(payload),
                }
            })
        })
        .collect();

    for job in &jobs {
        pool.submit(job)?;
    }
    pool.wait_for_all(&jobs);
    debug!(pool = %pool.id(), workers, "broadcast complete");

    jobs.into_iter()
        .map(|job| job.into_result().map_err(PoolError::from))
        .collect()
}
