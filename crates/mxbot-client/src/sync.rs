//! Wire model of the `/sync` response.
//!
//! Only the parts the room table and the event stream use are modelled; raw
//! events stay as JSON.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Rooms,
}

#[derive(Debug, Default, Deserialize)]
pub struct Rooms {
    #[serde(default)]
    pub join: HashMap<String, JoinedRoom>,
    #[serde(default)]
    pub invite: HashMap<String, InvitedRoom>,
    #[serde(default)]
    pub leave: HashMap<String, LeftRoom>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub summary: RoomSummary,
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: EventList,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomSummary {
    #[serde(default, rename = "m.joined_member_count")]
    pub joined_member_count: Option<u64>,
    #[serde(default, rename = "m.invited_member_count")]
    pub invited_member_count: Option<u64>,
    #[serde(default, rename = "m.heroes")]
    pub heroes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvitedRoom {
    #[serde(default)]
    pub invite_state: EventList,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeftRoom {
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: EventList,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub events: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_minimal_response() {
        let response: SyncResponse = serde_json::from_value(json!({ "next_batch": "s1" })).unwrap();
        assert_eq!(response.next_batch, "s1");
        assert!(response.rooms.join.is_empty());
    }

    #[test]
    fn parses_summary_counts() {
        let response: SyncResponse = serde_json::from_value(json!({
            "next_batch": "s2",
            "rooms": {
                "join": {
                    "!r:example.org": {
                        "summary": { "m.joined_member_count": 2, "m.invited_member_count": 0 },
                        "timeline": { "events": [{ "type": "m.room.message" }] }
                    }
                }
            }
        }))
        .unwrap();
        let room = &response.rooms.join["!r:example.org"];
        assert_eq!(room.summary.joined_member_count, Some(2));
        assert_eq!(room.timeline.events.len(), 1);
        assert!(room.state.events.is_empty());
    }
}
