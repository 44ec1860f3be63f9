use super::types::PoolConfig;
use crate::error::ConfigError;

impl PoolConfig {
    /// Validate thread bounds and naming. Called by every loader and by
    /// pool construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_thread_bounds()?;
        self.validate_thread_name_prefix()?;
        Ok(())
    }

    fn validate_thread_bounds(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.min_threads > self.max_threads {
            return Err(ConfigError::ThreadBounds {
                min: self.min_threads,
                max: self.max_threads,
            });
        }
        Ok(())
    }

    /// Thread names may not contain NUL bytes (`std::thread::Builder` panics on them).
    fn validate_thread_name_prefix(&self) -> Result<(), ConfigError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(ConfigError::Invalid(
                "thread_name_prefix must not contain NUL bytes".into(),
            ));
        }
        Ok(())
    }
}
