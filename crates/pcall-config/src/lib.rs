//! # pcall configuration
//!
//! Typed configuration for the pcall server and client, loadable from TOML or
//! JSON and overridable from the environment.
//!
//! ```rust,no_run
//! use pcall_config::PcallConfig;
//!
//! let mut config = PcallConfig::load_or_default(None).unwrap();
//! config.apply_env_overrides().unwrap();
//! println!("listening on {}", config.server.bind_address());
//! ```

mod components;
mod error;
mod loader;

pub use components::*;
pub use error::ConfigError;
pub use loader::{default_config_path, PcallConfig};
