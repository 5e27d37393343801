//! The live room table, folded from sync responses.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use mxbot_core::{MemberInfo, Membership, RoomSnapshot};
use serde_json::Value;
use tracing::trace;

use crate::sync::{JoinedRoom, Rooms};

/// Power level state of one room.
#[derive(Debug, Clone, Default)]
struct PowerLevels {
    users: HashMap<String, i64>,
    users_default: i64,
}

impl PowerLevels {
    fn from_content(content: &Value) -> Self {
        let users = content
            .get("users")
            .and_then(Value::as_object)
            .map(|users| {
                users
                    .iter()
                    .filter_map(|(user, level)| Some((user.clone(), level.as_i64()?)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            users,
            users_default: content
                .get("users_default")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
        }
    }

    fn level_of(&self, user_id: &str) -> i64 {
        self.users
            .get(user_id)
            .copied()
            .unwrap_or(self.users_default)
    }
}

/// Joined rooms by id, plus the ids of rooms with a pending invite.
#[derive(Debug, Default)]
pub struct RoomTable {
    joined: BTreeMap<String, Arc<RoomSnapshot>>,
    invited: HashSet<String>,
    power_levels: HashMap<String, PowerLevels>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the room sections of one sync response into the table.
    pub fn apply(&mut self, rooms: &Rooms) {
        for (room_id, room) in &rooms.join {
            self.invited.remove(room_id);
            self.apply_joined(room_id, room);
        }
        for room_id in rooms.invite.keys() {
            if !self.joined.contains_key(room_id) {
                self.invited.insert(room_id.clone());
            }
        }
        for room_id in rooms.leave.keys() {
            self.remove(room_id);
        }
    }

    fn apply_joined(&mut self, room_id: &str, room: &JoinedRoom) {
        let entry = self
            .joined
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(RoomSnapshot::new(room_id)));
        let snapshot = Arc::make_mut(entry);

        if let Some(count) = room.summary.joined_member_count {
            snapshot.joined_count = Some(count);
        }
        if let Some(count) = room.summary.invited_member_count {
            snapshot.invited_count = Some(count);
        }

        let state_events = room
            .state
            .events
            .iter()
            .chain(&room.timeline.events)
            .filter(|event| event.get("state_key").is_some());
        for event in state_events {
            if let Some(levels) = apply_state_event(snapshot, event) {
                self.power_levels.insert(room_id.to_string(), levels);
            }
        }

        if let Some(levels) = self.power_levels.get(room_id) {
            for member in snapshot.members.values_mut() {
                member.power_level = levels.level_of(&member.user_id);
            }
        }
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<RoomSnapshot>> {
        self.joined.get(room_id).cloned()
    }

    /// All joined rooms, ordered by id.
    pub fn snapshots(&self) -> Vec<Arc<RoomSnapshot>> {
        self.joined.values().cloned().collect()
    }

    /// Joined or invited.
    pub fn knows(&self, room_id: &str) -> bool {
        self.joined.contains_key(room_id) || self.invited.contains(room_id)
    }

    pub fn remove(&mut self, room_id: &str) {
        self.joined.remove(room_id);
        self.invited.remove(room_id);
        self.power_levels.remove(room_id);
    }

    pub fn len(&self) -> usize {
        self.joined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }
}

fn content_str<'a>(content: &'a Value, key: &str) -> Option<&'a str> {
    content.get(key)?.as_str().filter(|s| !s.is_empty())
}

/// Applies one state event. Returns new power levels when the event set them.
fn apply_state_event(snapshot: &mut RoomSnapshot, event: &Value) -> Option<PowerLevels> {
    let event_type = event.get("type").and_then(Value::as_str)?;
    let state_key = event.get("state_key").and_then(Value::as_str)?;
    let empty = Value::Null;
    let content = event.get("content").unwrap_or(&empty);
    trace!(room_id = %snapshot.room_id, event_type, "Applying state event");

    match event_type {
        "m.room.name" => snapshot.name = content_str(content, "name").map(str::to_string),
        "m.room.canonical_alias" => {
            snapshot.canonical_alias = content_str(content, "alias").map(str::to_string)
        }
        "m.room.topic" => snapshot.topic = content_str(content, "topic").map(str::to_string),
        "m.room.member" => apply_membership(snapshot, state_key, content),
        "m.room.power_levels" => return Some(PowerLevels::from_content(content)),
        _ => {}
    }
    None
}

fn apply_membership(snapshot: &mut RoomSnapshot, user_id: &str, content: &Value) {
    let membership = match content.get("membership").and_then(Value::as_str) {
        Some("join") => Membership::Join,
        Some("invite") => Membership::Invite,
        _ => {
            snapshot.members.remove(user_id);
            return;
        }
    };

    let member = snapshot
        .members
        .entry(user_id.to_string())
        .or_insert_with(|| MemberInfo::joined(user_id));
    member.membership = membership;
    member.display_name = content_str(content, "displayname").map(str::to_string);
    member.avatar_url = content_str(content, "avatar_url").map(str::to_string);
}
