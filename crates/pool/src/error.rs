use std::sync::Arc;

use thiserror::Error;
use weft_core::ConfigError;

/// Errors from pool construction and job submission.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("job was already submitted")]
    AlreadySubmitted,

    #[error("job queue is shut down")]
    ShutDown,

    #[error("broadcast called from a worker of the same pool")]
    BroadcastFromWorker,

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Outcome of a job that did not produce a value.
///
/// Cloning is cheap and yields the same underlying error, so a failed job
/// reports identical errors on every access.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("job failed: {0:#}")]
    Failed(Arc<anyhow::Error>),

    #[error("job panicked: {0}")]
    Panicked(Arc<str>),

    #[error("job has not finished")]
    NotFinished,

    #[error("job was never submitted")]
    NotSubmitted,
}

impl JobError {
    /// Downcast the error raised by the job, if it failed with an `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        match self {
            JobError::Failed(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, JobError::Panicked(_))
    }

    pub(crate) fn failed(err: impl Into<anyhow::Error>) -> Self {
        JobError::Failed(Arc::new(err.into()))
    }
}
