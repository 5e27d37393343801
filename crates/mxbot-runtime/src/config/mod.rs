//! Configuration module for the mxbot runtime.
//!
//! Layered loading via figment plus validation of the homeserver and
//! account settings a backend needs to start.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, MatrixConfig, MxbotConfig, SpanEventConfig,
};
pub use validation::validate_config;
