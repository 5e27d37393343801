//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while setting up or running a backend.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The core failed: authentication, the event loop, or an operation.
    #[error(transparent)]
    Core(#[from] mxbot_core::CoreError),

    /// The protocol client could not be constructed.
    #[error("Failed to create protocol client: {0}")]
    Client(#[from] mxbot_core::ClientError),

    /// A global subscriber was already installed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
