use std::env;
use std::path::Path;

use tracing::debug;

use super::types::PoolConfig;
use crate::error::ConfigError;

/// Env var naming the active profile. When set (e.g. `BENCH`), every key is
/// first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
pub const PROFILE_ENV: &str = "WEFT_PROFILE";

const MIN_THREADS: &str = "WEFT_MIN_THREADS";
const MAX_THREADS: &str = "WEFT_MAX_THREADS";
const ADAPTIVE_THREADS: &str = "WEFT_ADAPTIVE_THREADS";
const USE_SIMD: &str = "WEFT_USE_SIMD";
const THREAD_NAME_PREFIX: &str = "WEFT_THREAD_NAME_PREFIX";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Tries `{profile}_{key}` first, then `{key}`.
fn profiled_opt(
    lookup: &impl Fn(&str) -> Option<String>,
    profile: &str,
    key: &str,
) -> Option<String> {
    if !profile.is_empty() {
        if let Some(v) = lookup(&format!("{profile}_{key}")) {
            return Some(v);
        }
    }
    lookup(key)
}

fn parse_usize(key: &str, value: String) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key: key.into(), value })
}

fn parse_bool(key: &str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { key: key.into(), value }),
    }
}

impl PoolConfig {
    /// Parse config from a TOML string. Unknown keys are rejected.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults overridden by `WEFT_*` environment variables
    /// (call [`load_dotenv`] first to pick up a `.env` file).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Optional file, then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading pool config");
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(env_opt)
    }

    /// Apply overrides read through `lookup`. Does not validate.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let profile = lookup(PROFILE_ENV).unwrap_or_default().to_uppercase();
        let p = profile.as_str();

        if let Some(v) = profiled_opt(&lookup, p, MIN_THREADS) {
            self.min_threads = parse_usize(MIN_THREADS, v)?;
        }
        if let Some(v) = profiled_opt(&lookup, p, MAX_THREADS) {
            self.max_threads = parse_usize(MAX_THREADS, v)?;
        }
        if let Some(v) = profiled_opt(&lookup, p, ADAPTIVE_THREADS) {
            self.adaptive_threads = parse_bool(ADAPTIVE_THREADS, v)?;
        }
        if let Some(v) = profiled_opt(&lookup, p, USE_SIMD) {
            self.use_simd = parse_bool(USE_SIMD, v)?;
        }
        if let Some(v) = profiled_opt(&lookup, p, THREAD_NAME_PREFIX) {
            self.thread_name_prefix = v;
        }
        Ok(())
    }

    /// Print a one-line summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            min_threads = self.min_threads,
            max_threads = self.max_threads,
            adaptive = self.adaptive_threads,
            use_simd = self.use_simd,
            prefix = %self.thread_name_prefix,
            "pool config loaded"
        );
    }
}
