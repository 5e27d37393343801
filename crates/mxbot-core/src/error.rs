//! Unified error types for the mxbot core.
//!
//! Errors are layered the same way the components are:
//!
//! - [`ClientError`] - failures reported by the protocol client
//! - [`RoomError`] - room capability and pass-through command failures
//! - [`BridgeError`] - failures of the sync/async bridge itself
//! - [`CoreError`] - the umbrella type returned by handlers and outbound operations
//!
//! Inbound failures are contained at the dispatch boundary; outbound failures
//! travel back across the bridge to the blocking caller.

use thiserror::Error;

// =============================================================================
// Client Errors
// =============================================================================

/// Errors reported by a protocol client implementation.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The homeserver answered with a non-success status and no Matrix error body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body (possibly truncated).
        body: String,
    },

    /// The homeserver answered with a Matrix error (`errcode` / `error`).
    #[error("{errcode}: {message}")]
    Api {
        /// Matrix error code, e.g. `M_FORBIDDEN`.
        errcode: String,
        /// Human readable message.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response had a different shape than the operation expects.
    #[error("unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse {
        /// What the operation expected.
        expected: &'static str,
        /// What arrived instead.
        got: String,
    },

    /// A payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation needs an authenticated session.
    #[error("client is not logged in")]
    NotLoggedIn,
}

impl ClientError {
    /// Creates an API error from an errcode and message.
    pub fn api(errcode: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            errcode: errcode.into(),
            message: message.into(),
        }
    }

    /// Creates an unexpected-response error.
    pub fn unexpected(expected: &'static str, got: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            expected,
            got: got.into(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for protocol client operations.
pub type ClientResult<T> = Result<T, ClientError>;

// =============================================================================
// Room Errors
// =============================================================================

/// Errors from room capabilities and room pass-through commands.
#[derive(Debug, Clone, Error)]
pub enum RoomError {
    /// The capability needs a joined-room snapshot that is not held.
    #[error("not joined to room '{room_id}'")]
    NotJoined {
        /// The room that is not joined.
        room_id: String,
    },

    /// The capability is not supported by this backend.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// `create` was called on a room that already has an id.
    #[error("room '{room_id}' already exists")]
    AlreadyExists {
        /// The existing room id.
        room_id: String,
    },

    /// The protocol client rejected a room command.
    #[error("failed to {action} room '{room_id}': {reason}")]
    Operation {
        /// The command, e.g. `join` or `leave`.
        action: &'static str,
        /// The room the command targeted.
        room_id: String,
        /// Failure reported by the client.
        reason: String,
    },
}

impl RoomError {
    /// Creates an operation error.
    pub fn operation(
        action: &'static str,
        room_id: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Operation {
            action,
            room_id: room_id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for room operations.
pub type RoomResult<T> = Result<T, RoomError>;

// =============================================================================
// Bridge Errors
// =============================================================================

/// Errors raised by the sync/async bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The event loop is not running, or stopped before the unit completed.
    #[error("event loop is closed")]
    Closed,

    /// A blocking submission was attempted from the event loop thread.
    #[error("blocking submission from the event loop thread")]
    Reentrant,

    /// The submitted unit panicked.
    #[error("submitted unit panicked")]
    Panicked,

    /// `run` was called while the loop is already running.
    #[error("event loop is already running")]
    AlreadyRunning,
}

// =============================================================================
// Core Errors
// =============================================================================

/// Umbrella error for handlers and outbound operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The client could not establish or confirm its identity.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A room operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The protocol client failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The bridge failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// No management room could be found or created for a person.
    #[error("could not obtain a direct channel with {person}: {reason}")]
    DirectChannel {
        /// The person id.
        person: String,
        /// Failure reported by the client.
        reason: String,
    },

    /// The message carries no inbound event id.
    #[error("message has no event id")]
    MissingEventId,

    /// An outbound message has no usable target.
    #[error("cannot resolve a target room: {0}")]
    UnresolvableTarget(String),

    /// A message subtype string is not in the known set.
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    /// An inbound event is missing required fields.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A media file could not be read or is not acceptable.
    #[error("media error: {0}")]
    Media(String),

    /// The event loop runtime could not be built.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl CoreError {
    /// Creates a malformed-event error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent(reason.into())
    }

    /// Creates a media error.
    pub fn media(reason: impl Into<String>) -> Self {
        Self::Media(reason.into())
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_operation_error_names_the_action() {
        let err = RoomError::operation("leave", "!abc:example.org", "M_FORBIDDEN");
        assert_eq!(
            err.to_string(),
            "failed to leave room '!abc:example.org': M_FORBIDDEN"
        );
    }

    #[test]
    fn core_error_is_transparent_over_client_errors() {
        let err: CoreError = ClientError::api("M_FORBIDDEN", "You are not invited").into();
        assert_eq!(err.to_string(), "M_FORBIDDEN: You are not invited");
    }

    #[test]
    fn serde_errors_become_serialization_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            ClientError::from(err),
            ClientError::Serialization(_)
        ));
    }
}
