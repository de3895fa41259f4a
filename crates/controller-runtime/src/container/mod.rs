//! # Module Container
//!
//! Configuration and the concrete module instances built from it.

pub mod config;
pub mod modules;

pub use config::{ConfigError, ControllerConfig, LoggerConfig, RuntimeConfig};
pub use modules::ModuleContainer;
