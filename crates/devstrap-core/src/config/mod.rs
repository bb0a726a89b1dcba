//! devstrap configuration layer
//!
//! All environment variable reads live here; the rest of the workspace goes
//! through the structured configs instead of calling `std::env::var`.
//!
//! - `loader`: env_or, env_optional, env_bool helpers and `.env` loading
//! - `schema`: PathsConfig, HttpConfig, ObservabilityConfig
//! - `env_keys`: key constants

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, load_dotenv, load_dotenv_from_dir};
pub use schema::{HttpConfig, ObservabilityConfig, PathsConfig};
