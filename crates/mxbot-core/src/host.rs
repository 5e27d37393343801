//! The host runtime surface.
//!
//! A host is the synchronous bot runtime that consumes messages. Its
//! callbacks are always invoked on a blocking worker thread, never on the
//! event loop, so a host may freely call back into blocking backend
//! operations from inside a callback.

use std::sync::Arc;

use crate::message::Message;
use crate::reaction::Reaction;

/// Callbacks the core delivers inbound traffic to.
pub trait Host: Send + Sync + 'static {
    /// A text message arrived.
    fn on_message(&self, message: Message);

    /// A reaction was added to an event.
    fn on_reaction(&self, _reaction: Reaction) {}

    /// The initial sync finished and the long-poll loop is starting.
    fn on_connected(&self) {}

    /// The long-poll loop stopped.
    fn on_disconnected(&self) {}
}

/// Shared handle to a host.
pub type BoxedHost = Arc<dyn Host>;
