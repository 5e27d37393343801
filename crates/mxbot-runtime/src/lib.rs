//! mxbot Runtime - configuration, logging and the backend lifecycle.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `MxbotConfig`)
//! - Logging setup (`LoggingBuilder`, `logging::init_from_config`)
//! - [`MatrixBackend`], which runs the event loop and exposes blocking
//!   operations to the host runtime
//!
//! ```ignore
//! use std::sync::Arc;
//! use mxbot_runtime::{MatrixBackend, config::load_config, logging};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let backend = Arc::new(MatrixBackend::new(&config)?);
//!     backend.serve(Arc::new(MyHost::new(backend.clone())))?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;

// Re-exports
pub use backend::{MODE, MatrixBackend};
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LoggingConfig, MatrixConfig, MxbotConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
