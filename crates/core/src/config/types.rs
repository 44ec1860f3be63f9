use serde::{Deserialize, Serialize};

/// Settings required to construct a worker pool.
///
/// `min_threads` and `max_threads` bound the number of worker threads.
/// With `adaptive_threads` off (the default) the pool starts exactly
/// `max_threads` workers. With it on, the host's available parallelism is
/// clamped into `[min_threads, max_threads]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Lower bound on worker threads.
    #[serde(default = "default_min_threads")]
    pub min_threads: usize,

    /// Upper bound on worker threads (and the exact count when not adaptive).
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Size the pool from `std::thread::available_parallelism()`.
    #[serde(default)]
    pub adaptive_threads: bool,

    /// Allow collaborators to use SIMD kernels. Recorded only; the pool
    /// itself never reads it.
    #[serde(default)]
    pub use_simd: bool,

    /// Worker threads are named `{prefix}-{index}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_min_threads() -> usize {
    1
}

fn default_max_threads() -> usize {
    1
}

fn default_thread_name_prefix() -> String {
    "weft-worker".into()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_threads: default_min_threads(),
            max_threads: default_max_threads(),
            adaptive_threads: false,
            use_simd: false,
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl PoolConfig {
    /// Exactly `threads` workers.
    pub fn fixed(threads: usize) -> Self {
        Self {
            min_threads: threads,
            max_threads: threads,
            ..Self::default()
        }
    }

    /// Adaptive sizing between `min` and `max` workers.
    pub fn bounded(min: usize, max: usize) -> Self {
        Self {
            min_threads: min,
            max_threads: max,
            adaptive_threads: true,
            ..Self::default()
        }
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_simd(mut self, enabled: bool) -> Self {
        self.use_simd = enabled;
        self
    }

    /// Number of worker threads a pool built from this config will start.
    ///
    /// Assumes the config has been validated.
    pub fn resolved_threads(&self) -> usize {
        if !self.adaptive_threads || self.min_threads >= self.max_threads {
            return self.max_threads;
        }
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(self.min_threads);
        available.clamp(self.min_threads, self.max_threads)
    }
}
