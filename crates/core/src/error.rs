use thiserror::Error;

/// Errors raised while loading or validating a [`PoolConfig`](crate::PoolConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("min_threads ({min}) must not exceed max_threads ({max})")]
    ThreadBounds { min: usize, max: usize },

    #[error("max_threads must be at least 1")]
    NoWorkers,

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}
