//! Parsing and validation of `retrace.toml` configuration files.
//!
//! This crate reads the optional configuration file, applies `RETRACE_*`
//! environment overrides, and produces a strongly-typed [`RetraceConfig`]
//! holding the replay and JIT optimizer settings.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{apply_env_overrides, load_config, load_config_from_str, validate_config};
pub use types::*;
