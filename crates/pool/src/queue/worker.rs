use tracing::{debug, trace};

use crate::job::JobContext;

use super::core::{Dispatch, QueueState};
use super::JobQueue;

impl JobQueue {
    /// Service loop of worker `worker`. Returns once the queue is shut down
    /// and drained.
    pub(crate) fn serve(&self, worker: usize) {
        debug!(worker, pool = %self.id(), "worker started");
        while let Some(dispatch) = self.next_dispatch(QueueState::drained, QueueState::take_next) {
            self.execute(worker, dispatch);
        }
        debug!(worker, pool = %self.id(), "worker exiting");
    }

    /// Run queued jobs on the worker of `ctx` until the job keyed `awaited`
    /// is done.
    pub(super) fn help_until(&self, ctx: &JobContext, awaited: usize, done: impl Fn() -> bool) {
        let held = ctx.held_limit();
        while let Some(dispatch) = self.next_dispatch(
            |_| done(),
            |state| state.take_for_helper(awaited, held),
        ) {
            self.execute(ctx.worker_index(), dispatch);
        }
    }

    /// Block until `take` yields a job or `stop` holds.
    fn next_dispatch(
        &self,
        stop: impl Fn(&QueueState) -> bool,
        take: impl Fn(&mut QueueState) -> Option<Dispatch>,
    ) -> Option<Dispatch> {
        let mut state = self.lock();
        loop {
            if stop(&state) {
                return None;
            }
            if let Some(dispatch) = take(&mut state) {
                return Some(dispatch);
            }
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn execute(&self, worker: usize, dispatch: Dispatch) {
        let Dispatch { order, job, limit } = dispatch;
        trace!(worker, order, "job started");

        let ok = {
            let _ctx = JobContext::new(order, worker, self.id(), self.scopes().clone())
                .holding(limit.clone())
                .enter();
            job.run()
        };
        if !ok {
            debug!(worker, order, "job failed");
        }

        self.lock().finish(limit.as_ref(), ok);
        self.shared.changed.notify_all();
    }
}
