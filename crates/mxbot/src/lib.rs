//! # mxbot
//!
//! Lets a synchronous chat-bot host run over the asynchronous, event-driven
//! Matrix protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  callbacks (blocking workers)  ┌──────────────────────────────┐
//! │   Host    │◀───────────────────────────────│ MatrixBackend                │
//! │ (sync)    │───────────────────────────────▶│  event loop thread           │──▶ homeserver
//! └───────────┘  send / react / rooms (units)  │  (dispatcher, resolver, sync)│
//!                                              └──────────────────────────────┘
//! ```
//!
//! - **Core**: identity model, event classification and dispatch, direct-message
//!   resolution, and the sync/async bridge
//! - **Client**: the Matrix client-server API over HTTP
//! - **Runtime**: configuration, logging, and the backend lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mxbot::prelude::*;
//!
//! struct Echo(Arc<MatrixBackend>);
//!
//! impl Host for Echo {
//!     fn on_message(&self, message: Message) {
//!         if !self.0.is_from_self(&message) {
//!             let reply = self.0.build_reply(&message, &message.body, false);
//!             let _ = self.0.send_message(&reply);
//!         }
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!     let backend = Arc::new(MatrixBackend::new(&config)?);
//!     backend.serve(Arc::new(Echo(backend.clone())))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use mxbot_client as client;
pub use mxbot_core as core;
pub use mxbot_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use mxbot::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use mxbot_runtime::config::{ConfigLoader, MxbotConfig, load_config, load_config_from_file};
    pub use mxbot_runtime::{MatrixBackend, RuntimeError, RuntimeResult, logging};

    // Host surface
    pub use mxbot_core::{BoxedHost, Host, ShutdownHandle};

    // Model
    pub use mxbot_core::{
        DirectRoom, Identifier, Message, MessageType, Person, Reaction, Room, RoomOccupant,
    };

    // Errors
    pub use mxbot_core::{BridgeError, CoreError, CoreResult, RoomError};
}
