//! Pool configuration: types, loading (TOML, environment) and validation.

mod loading;
mod types;
mod validation;


pub use loading::load_dotenv;
pub use types::PoolConfig;
