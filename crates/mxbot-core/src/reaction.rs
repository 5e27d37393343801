//! Reactions (annotations) on room events.

use serde_json::{Value, json};

use crate::identity::{Person, Room};

/// Event type of a reaction.
pub const REACTION_EVENT_TYPE: &str = "m.reaction";

/// Relation type used by reactions.
pub const ANNOTATION_REL_TYPE: &str = "m.annotation";

/// What happened to the reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionAction {
    Added,
}

/// The event a reaction points at.
#[derive(Debug, Clone)]
pub struct ReactedTo {
    pub room: Room,
    /// Raw event JSON as returned by the server.
    pub source: Value,
}

impl ReactedTo {
    pub fn event_id(&self) -> Option<&str> {
        self.source.get("event_id").and_then(Value::as_str)
    }
}

/// A reaction added to a room event.
#[derive(Debug, Clone)]
pub struct Reaction {
    /// Who reacted.
    pub reactor: Person,
    /// Author of the reacted-to event.
    pub reactee: Person,
    pub action: ReactionAction,
    /// Server timestamp of the reaction, in milliseconds.
    pub timestamp: u64,
    /// The reaction key, usually an emoji.
    pub key: String,
    pub reacted_to: ReactedTo,
}

/// Content of an annotation pointing at `event_id`.
pub fn annotation_content(event_id: &str, key: &str) -> Value {
    json!({
        "m.relates_to": {
            "rel_type": ANNOTATION_REL_TYPE,
            "event_id": event_id,
            "key": key,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_content_shape() {
        let content = annotation_content("$ev", "👍");
        assert_eq!(content["m.relates_to"]["rel_type"], "m.annotation");
        assert_eq!(content["m.relates_to"]["event_id"], "$ev");
        assert_eq!(content["m.relates_to"]["key"], "👍");
    }
}
