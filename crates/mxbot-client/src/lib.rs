//! # mxbot Client
//!
//! Matrix client-server API implementation of
//! [`ProtocolClient`](mxbot_core::ProtocolClient).
//!
//! - [`HttpClient`] talks to `/_matrix/client/v3` and `/_matrix/media/v3`
//!   over `reqwest`
//! - [`RoomTable`] folds `/sync` responses into room snapshots that the core
//!   reads synchronously
//!
//! ```rust,ignore
//! use mxbot_client::HttpClient;
//! use mxbot_core::{Credentials, ProtocolClient, SyncOptions};
//!
//! let client = HttpClient::new("https://matrix.example.org", Duration::from_secs(60))?;
//! client.login(&Credentials::AccessToken(token)).await?;
//! let batch = client.sync(SyncOptions::initial()).await?;
//! ```

mod http;
pub mod rooms;
pub mod sync;

pub use http::HttpClient;
pub use rooms::RoomTable;
