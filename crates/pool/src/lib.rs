//! Worker pool, ordered job queue, scoped object cache and parallel-for
//! primitives.

pub mod broadcast;
pub mod error;
pub mod job;
pub mod parallel;
pub mod pool;
pub mod queue;
pub mod scope;
pub mod stats;
pub mod store;
pub mod thread_set;

pub use broadcast::broadcast;
pub use error::{JobError, PoolError};
pub use job::{ConcurrencyLimit, Job, JobContext, JobState, Order, ORDER_MAX, ORDER_MIN};
pub use parallel::{parallelize_index, parallelize_range, parallelize_replicate, Parallel};
pub use pool::Pool;
pub use queue::JobQueue;
pub use scope::{Scope, Scopes};
pub use stats::QueueStats;
pub use store::ObjectStore;
pub use weft_core::PoolConfig;
