//! # mxbot Core
//!
//! The protocol-adapter core that lets a synchronous chat-bot host operate
//! over the asynchronous, event-driven Matrix protocol.
//!
//! ## Layers
//!
//! ### Model
//!
//! - **Identity**: [`Person`], [`Room`], [`RoomOccupant`], [`DirectRoom`] and the
//!   [`Identifier`] variant over them
//! - **Messages**: [`Message`], [`MessageType`], outbound formatting
//! - **Reactions**: [`Reaction`], [`ReactedTo`]
//!
//! ### Event handling
//!
//! - **Classification**: [`classify`] routes a raw [`SyncEvent`]
//! - **Dispatch**: [`EventDispatcher`] runs handlers and hands results to the [`Host`]
//! - **Direct messages**: [`DirectMessageResolver`] finds or creates management rooms
//!
//! ### Bridge
//!
//! [`Bridge`] runs the single-threaded event loop and lets blocking host
//! threads submit units of work to it.
//!
//! ```text
//! ┌──────────────┐  SyncEvent  ┌────────────┐  spawn_blocking  ┌──────┐
//! │ProtocolClient│────────────▶│ Dispatcher │─────────────────▶│ Host │
//! └──────────────┘             └────────────┘                  └──┬───┘
//!        ▲                                                        │ submit
//!        └──────────────────── Bridge (units) ◀───────────────────┘
//! ```

pub mod bridge;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod host;
pub mod identity;
pub mod message;
pub mod outbound;
pub mod reaction;
pub mod resolver;

pub use bridge::{Bridge, LoopContext, ShutdownHandle};
pub use client::{
    BoxedClient, CreateRoomOptions, Credentials, MemberInfo, Membership, ProfileInfo,
    ProtocolClient, RoomSnapshot, SyncBatch, SyncOptions,
};
pub use dispatcher::{EventDispatcher, Outcome};
pub use error::{
    BridgeError, ClientError, ClientResult, CoreError, CoreResult, RoomError, RoomResult,
};
pub use event::{ClassifiedEvent, RoomSection, SyncEvent, classify};
pub use host::{BoxedHost, Host};
pub use identity::{DirectRoom, Identifier, Person, Profile, Room, RoomOccupant};
pub use message::{HTML_FORMAT, Message, MessageType, render_html};
pub use reaction::{REACTION_EVENT_TYPE, ReactedTo, Reaction, ReactionAction};
pub use resolver::DirectMessageResolver;
