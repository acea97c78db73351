//! Configuration system for the outpost world runtime.
//!
//! Settings persist to disk as RON files. CLI flags (via clap) and process
//! environment variables override whatever was loaded from `config.ron`.

mod cli;
mod config;
mod env;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, NetworkConfig, RuntimeConfig, RuntimeMode, SimConfig};
pub use env::{ENV_RUNTIME_MODE, ENV_SERVER_ADDR, ENV_WORLD_SEED};
pub use error::ConfigError;

/// Default per-user config directory (`<config_dir>/outpost`), if the
/// platform has one.
pub fn default_config_dir() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|dir| dir.join("outpost"))
}
