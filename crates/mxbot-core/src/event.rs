//! Inbound sync events and their classification.
//!
//! The protocol client hands every event it receives to the core as a
//! [`SyncEvent`]: the raw event JSON plus the room and sync section it came
//! from. [`classify`] turns that envelope into a [`ClassifiedEvent`] without
//! performing any I/O, so the routing decision can be tested in isolation
//! from the handlers that act on it.
//!
//! # Routing
//!
//! | Section | Event | Result |
//! |---------|-------|--------|
//! | Joined  | `m.room.message` with `msgtype` `m.text` | [`ClassifiedEvent::Text`] |
//! | Joined  | unmodelled type equal to `m.reaction` | [`ClassifiedEvent::Reaction`] |
//! | Joined  | other unmodelled type | [`ClassifiedEvent::Unknown`] |
//! | Invited | own `m.room.member` with membership `invite` | [`ClassifiedEvent::Invite`] |
//! | Left    | own `m.room.member` with membership `leave` or `ban` | [`ClassifiedEvent::Left`] |
//! | any     | anything else | [`ClassifiedEvent::Ignored`] |

use std::str::FromStr;

use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::message::{MESSAGE_EVENT_TYPE, MessageType};
use crate::reaction::REACTION_EVENT_TYPE;

/// Event type of membership changes.
pub const MEMBER_EVENT_TYPE: &str = "m.room.member";

/// Event types the client models explicitly. Anything else reaches the core
/// as a generic envelope.
const MODELLED_EVENT_TYPES: &[&str] = &[
    "m.room.message",
    "m.room.member",
    "m.room.name",
    "m.room.topic",
    "m.room.avatar",
    "m.room.canonical_alias",
    "m.room.aliases",
    "m.room.create",
    "m.room.join_rules",
    "m.room.power_levels",
    "m.room.history_visibility",
    "m.room.guest_access",
    "m.room.encryption",
    "m.room.encrypted",
    "m.room.redaction",
    "m.room.tombstone",
    "m.room.pinned_events",
    "m.room.server_acl",
    "m.room.third_party_invite",
    "m.sticker",
    "m.call.invite",
    "m.call.answer",
    "m.call.hangup",
    "m.call.candidates",
];

/// Which part of the sync response an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomSection {
    Joined,
    Invited,
    Left,
}

/// A raw event as delivered by the protocol client.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub room_id: String,
    pub section: RoomSection,
    /// The event JSON.
    pub source: Value,
    /// Whether the event arrived encrypted and was decrypted.
    pub decrypted: bool,
    /// Whether the sending device is verified.
    pub verified: bool,
}

impl SyncEvent {
    pub fn new(room_id: impl Into<String>, section: RoomSection, source: Value) -> Self {
        Self {
            room_id: room_id.into(),
            section,
            source,
            decrypted: false,
            verified: false,
        }
    }

    pub fn event_type(&self) -> Option<&str> {
        self.source.get("type").and_then(Value::as_str)
    }

    pub fn event_id(&self) -> Option<&str> {
        self.source.get("event_id").and_then(Value::as_str)
    }

    pub fn sender(&self) -> Option<&str> {
        self.source.get("sender").and_then(Value::as_str)
    }

    pub fn state_key(&self) -> Option<&str> {
        self.source.get("state_key").and_then(Value::as_str)
    }

    pub fn content(&self) -> Option<&Value> {
        self.source.get("content")
    }

    /// `origin_server_ts`, or 0 when absent.
    pub fn timestamp(&self) -> u64 {
        self.source
            .get("origin_server_ts")
            .and_then(Value::as_u64)
            .unwrap_or_default()
    }

    fn content_str(&self, key: &str) -> Option<&str> {
        self.content()?.get(key)?.as_str()
    }
}

// =============================================================================
// Classified events
// =============================================================================

/// A text message in a joined room.
#[derive(Debug, Clone)]
pub struct TextEvent {
    pub room_id: String,
    pub event_id: String,
    pub sender: String,
    pub body: String,
    pub timestamp: u64,
    pub decrypted: bool,
    pub verified: bool,
}

/// An invitation for the bot.
#[derive(Debug, Clone)]
pub struct InviteEvent {
    pub room_id: String,
    pub inviter: Option<String>,
}

/// A reaction, sniffed from a generic envelope.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub room_id: String,
    pub event_id: Option<String>,
    pub sender: String,
    pub timestamp: u64,
    /// The event being reacted to.
    pub relates_to: String,
    pub key: String,
}

/// Result of [`classify`].
#[derive(Debug, Clone)]
pub enum ClassifiedEvent {
    Text(TextEvent),
    Invite(InviteEvent),
    Reaction(ReactionEvent),
    /// The bot left or was removed from a room.
    Left {
        room_id: String,
    },
    /// A generic envelope that is not a reaction.
    Unknown {
        room_id: String,
        event_type: String,
    },
    /// A modelled event the core does not act on.
    Ignored {
        room_id: String,
        event_type: String,
    },
}

impl ClassifiedEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Invite(_) => "invite",
            Self::Reaction(_) => "reaction",
            Self::Left { .. } => "left",
            Self::Unknown { .. } => "unknown",
            Self::Ignored { .. } => "ignored",
        }
    }
}

fn is_modelled(event_type: &str) -> bool {
    MODELLED_EVENT_TYPES.contains(&event_type)
}

fn ignored(event: &SyncEvent, event_type: &str) -> ClassifiedEvent {
    ClassifiedEvent::Ignored {
        room_id: event.room_id.clone(),
        event_type: event_type.to_string(),
    }
}

/// Whether a membership event concerns the bot. Without a known own id
/// every membership event is taken as the bot's.
fn is_own_membership(event: &SyncEvent, own_user_id: Option<&str>) -> bool {
    match (event.state_key(), own_user_id) {
        (Some(target), Some(own)) => target == own,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Routes a sync event.
///
/// Fails only when an event that would be acted on lacks required fields.
pub fn classify(event: &SyncEvent, own_user_id: Option<&str>) -> CoreResult<ClassifiedEvent> {
    let event_type = event
        .event_type()
        .ok_or_else(|| CoreError::malformed("event has no type"))?;

    match event.section {
        RoomSection::Invited => {
            if event_type == MEMBER_EVENT_TYPE
                && event.content_str("membership") == Some("invite")
                && is_own_membership(event, own_user_id)
            {
                return Ok(ClassifiedEvent::Invite(InviteEvent {
                    room_id: event.room_id.clone(),
                    inviter: event.sender().map(str::to_string),
                }));
            }
            Ok(ignored(event, event_type))
        }
        RoomSection::Left => {
            let membership = event.content_str("membership");
            if event_type == MEMBER_EVENT_TYPE
                && matches!(membership, Some("leave" | "ban"))
                && is_own_membership(event, own_user_id)
            {
                return Ok(ClassifiedEvent::Left {
                    room_id: event.room_id.clone(),
                });
            }
            Ok(ignored(event, event_type))
        }
        RoomSection::Joined => classify_joined(event, event_type),
    }
}

fn classify_joined(event: &SyncEvent, event_type: &str) -> CoreResult<ClassifiedEvent> {
    if event_type == MESSAGE_EVENT_TYPE {
        let msgtype = event.content_str("msgtype").map(MessageType::from_str);
        if !matches!(msgtype, Some(Ok(MessageType::Text))) {
            return Ok(ignored(event, event_type));
        }
        return text_event(event).map(ClassifiedEvent::Text);
    }

    if is_modelled(event_type) {
        return Ok(ignored(event, event_type));
    }

    if event_type == REACTION_EVENT_TYPE {
        return reaction_event(event).map(ClassifiedEvent::Reaction);
    }

    Ok(ClassifiedEvent::Unknown {
        room_id: event.room_id.clone(),
        event_type: event_type.to_string(),
    })
}

fn text_event(event: &SyncEvent) -> CoreResult<TextEvent> {
    let sender = event
        .sender()
        .ok_or_else(|| CoreError::malformed("message has no sender"))?;
    let event_id = event
        .event_id()
        .ok_or_else(|| CoreError::malformed("message has no event id"))?;
    let body = event.content_str("body").unwrap_or_default();

    Ok(TextEvent {
        room_id: event.room_id.clone(),
        event_id: event_id.to_string(),
        sender: sender.to_string(),
        body: body.to_string(),
        timestamp: event.timestamp(),
        decrypted: event.decrypted,
        verified: event.verified,
    })
}

fn reaction_event(event: &SyncEvent) -> CoreResult<ReactionEvent> {
    let sender = event
        .sender()
        .ok_or_else(|| CoreError::malformed("reaction has no sender"))?;
    let relation = event
        .content()
        .and_then(|c| c.get("m.relates_to"))
        .ok_or_else(|| CoreError::malformed("reaction has no m.relates_to"))?;
    let relates_to = relation
        .get("event_id")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::malformed("reaction relation has no event_id"))?;
    let key = relation
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::malformed("reaction relation has no key"))?;

    Ok(ReactionEvent {
        room_id: event.room_id.clone(),
        event_id: event.event_id().map(str::to_string),
        sender: sender.to_string(),
        timestamp: event.timestamp(),
        relates_to: relates_to.to_string(),
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BOT: &str = "@bot:example.org";

    fn joined(source: Value) -> SyncEvent {
        SyncEvent::new("!r:example.org", RoomSection::Joined, source)
    }

    #[test]
    fn text_message_is_text() {
        let event = joined(json!({
            "type": "m.room.message",
            "event_id": "$1",
            "sender": "@alice:example.org",
            "origin_server_ts": 1700,
            "content": { "msgtype": "m.text", "body": "hello" }
        }));
        let ClassifiedEvent::Text(text) = classify(&event, Some(BOT)).unwrap() else {
            panic!("expected text");
        };
        assert_eq!(text.body, "hello");
        assert_eq!(text.sender, "@alice:example.org");
        assert_eq!(text.timestamp, 1700);
    }

    #[test]
    fn other_message_subtypes_are_ignored() {
        for msgtype in ["m.notice", "m.image", "m.something"] {
            let event = joined(json!({
                "type": "m.room.message",
                "event_id": "$1",
                "sender": "@alice:example.org",
                "content": { "msgtype": msgtype, "body": "x" }
            }));
            assert!(matches!(
                classify(&event, Some(BOT)).unwrap(),
                ClassifiedEvent::Ignored { .. }
            ));
        }
    }

    #[test]
    fn text_without_sender_is_malformed() {
        let event = joined(json!({
            "type": "m.room.message",
            "event_id": "$1",
            "content": { "msgtype": "m.text", "body": "x" }
        }));
        assert!(matches!(
            classify(&event, Some(BOT)),
            Err(CoreError::MalformedEvent(_))
        ));
    }

    #[test]
    fn reaction_is_sniffed_from_generic_envelope() {
        let event = joined(json!({
            "type": "m.reaction",
            "event_id": "$r",
            "sender": "@alice:example.org",
            "content": {
                "m.relates_to": { "rel_type": "m.annotation", "event_id": "$orig", "key": "👍" }
            }
        }));
        let ClassifiedEvent::Reaction(reaction) = classify(&event, Some(BOT)).unwrap() else {
            panic!("expected reaction");
        };
        assert_eq!(reaction.relates_to, "$orig");
        assert_eq!(reaction.key, "👍");
    }

    #[test]
    fn other_generic_envelopes_are_unknown() {
        let event = joined(json!({ "type": "org.example.custom", "sender": "@a:b" }));
        assert!(matches!(
            classify(&event, Some(BOT)).unwrap(),
            ClassifiedEvent::Unknown { event_type, .. } if event_type == "org.example.custom"
        ));
    }

    #[test]
    fn modelled_state_events_are_ignored() {
        let event = joined(json!({ "type": "m.room.topic", "state_key": "", "content": {} }));
        assert!(matches!(
            classify(&event, Some(BOT)).unwrap(),
            ClassifiedEvent::Ignored { .. }
        ));
    }

    #[test]
    fn own_invite_is_invite() {
        let event = SyncEvent::new(
            "!new:example.org",
            RoomSection::Invited,
            json!({
                "type": "m.room.member",
                "state_key": BOT,
                "sender": "@alice:example.org",
                "content": { "membership": "invite" }
            }),
        );
        let ClassifiedEvent::Invite(invite) = classify(&event, Some(BOT)).unwrap() else {
            panic!("expected invite");
        };
        assert_eq!(invite.room_id, "!new:example.org");
        assert_eq!(invite.inviter.as_deref(), Some("@alice:example.org"));
    }

    #[test]
    fn invite_state_for_others_is_ignored() {
        let name = SyncEvent::new(
            "!new:example.org",
            RoomSection::Invited,
            json!({ "type": "m.room.name", "state_key": "", "content": { "name": "x" } }),
        );
        assert!(matches!(
            classify(&name, Some(BOT)).unwrap(),
            ClassifiedEvent::Ignored { .. }
        ));

        let other = SyncEvent::new(
            "!new:example.org",
            RoomSection::Invited,
            json!({
                "type": "m.room.member",
                "state_key": "@alice:example.org",
                "content": { "membership": "join" }
            }),
        );
        assert!(matches!(
            classify(&other, Some(BOT)).unwrap(),
            ClassifiedEvent::Ignored { .. }
        ));
    }

    #[test]
    fn own_leave_is_left() {
        let event = SyncEvent::new(
            "!old:example.org",
            RoomSection::Left,
            json!({
                "type": "m.room.member",
                "state_key": BOT,
                "content": { "membership": "leave" }
            }),
        );
        assert!(matches!(
            classify(&event, Some(BOT)).unwrap(),
            ClassifiedEvent::Left { room_id } if room_id == "!old:example.org"
        ));
    }

    #[test]
    fn event_without_type_is_malformed() {
        assert!(classify(&joined(json!({})), Some(BOT)).is_err());
    }
}
