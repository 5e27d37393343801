//! The protocol client capability surface.
//!
//! The core never speaks HTTP itself. Everything it needs from the Matrix
//! homeserver goes through [`ProtocolClient`], which a concrete client
//! (see the `mxbot-client` crate) implements. The client also owns the live
//! room table; the core only ever holds shared, read-only [`RoomSnapshot`]s
//! taken from it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientResult;
use crate::event::SyncEvent;

// =============================================================================
// Room snapshot
// =============================================================================

/// Membership state of a room member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Join,
    Invite,
}

/// Room-local data about one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: String,
    pub membership: Membership,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub power_level: i64,
    #[serde(default)]
    pub presence: Option<String>,
    #[serde(default)]
    pub currently_active: bool,
    #[serde(default)]
    pub status_msg: Option<String>,
}

impl MemberInfo {
    /// A joined member with no profile data.
    pub fn joined(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            membership: Membership::Join,
            display_name: None,
            avatar_url: None,
            power_level: 0,
            presence: None,
            currently_active: false,
            status_msg: None,
        }
    }

    /// An invited member with no profile data.
    pub fn invited(user_id: impl Into<String>) -> Self {
        Self {
            membership: Membership::Invite,
            ..Self::joined(user_id)
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the power level.
    pub fn with_power_level(mut self, level: i64) -> Self {
        self.power_level = level;
        self
    }
}

/// Point-in-time view of a joined room, owned by the client's room table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub name: Option<String>,
    pub canonical_alias: Option<String>,
    pub topic: Option<String>,
    /// Members keyed by user id.
    pub members: BTreeMap<String, MemberInfo>,
    /// `m.joined_member_count` from the sync summary, when the server sent one.
    pub joined_count: Option<u64>,
    /// `m.invited_member_count` from the sync summary, when the server sent one.
    pub invited_count: Option<u64>,
}

impl RoomSnapshot {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            ..Default::default()
        }
    }

    /// Adds or replaces a member.
    pub fn with_member(mut self, member: MemberInfo) -> Self {
        self.members.insert(member.user_id.clone(), member);
        self
    }

    /// Sets the room name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the canonical alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.canonical_alias = Some(alias.into());
        self
    }

    /// Sets the topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// A group-style room has neither a name nor a canonical alias.
    pub fn is_group(&self) -> bool {
        self.name.is_none() && self.canonical_alias.is_none()
    }

    /// Joined plus invited members.
    ///
    /// Summary counts win over the member list when the server sent them.
    pub fn member_count(&self) -> u64 {
        let count = |membership| {
            self.members
                .values()
                .filter(|m| m.membership == membership)
                .count() as u64
        };
        let joined = self.joined_count.unwrap_or_else(|| count(Membership::Join));
        let invited = self
            .invited_count
            .unwrap_or_else(|| count(Membership::Invite));
        joined + invited
    }

    /// Human readable name: the room name, the alias, the other members, or the id.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(alias) = &self.canonical_alias {
            return alias.clone();
        }
        let names: Vec<String> = self
            .members
            .values()
            .take(3)
            .map(|m| self.disambiguated_name(&m.user_id))
            .collect();
        if names.is_empty() {
            self.room_id.clone()
        } else {
            names.join(", ")
        }
    }

    /// Canonical alias if the room has one, otherwise the id.
    pub fn machine_name(&self) -> &str {
        self.canonical_alias.as_deref().unwrap_or(&self.room_id)
    }

    /// Display name of a member, suffixed with the user id when another
    /// member shares the same display name.
    pub fn disambiguated_name(&self, user_id: &str) -> String {
        let Some(name) = self
            .members
            .get(user_id)
            .and_then(|m| m.display_name.as_deref())
        else {
            return user_id.to_string();
        };

        let shared = self
            .members
            .values()
            .filter(|m| m.display_name.as_deref() == Some(name))
            .count();
        if shared > 1 {
            format!("{name} ({user_id})")
        } else {
            name.to_string()
        }
    }

    /// Power level of a user in this room; 0 when unknown.
    pub fn power_level(&self, user_id: &str) -> i64 {
        self.members.get(user_id).map_or(0, |m| m.power_level)
    }

    pub fn member(&self, user_id: &str) -> Option<&MemberInfo> {
        self.members.get(user_id)
    }
}

// =============================================================================
// Request / response types
// =============================================================================

/// Profile data returned by the homeserver for a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    #[serde(default, rename = "displayname")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Any further profile fields.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Options for one sync round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Long-poll timeout; `None` returns immediately.
    pub timeout: Option<Duration>,
    /// Request the complete room state instead of a delta.
    pub full_state: bool,
}

impl SyncOptions {
    /// The initial full-state sync.
    pub fn initial() -> Self {
        Self {
            timeout: None,
            full_state: true,
        }
    }

    /// A long-poll sync with the given timeout.
    pub fn long_poll(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            full_state: false,
        }
    }
}

/// Result of one sync round trip.
#[derive(Debug, Clone, Default)]
pub struct SyncBatch {
    pub next_batch: String,
    pub events: Vec<SyncEvent>,
}

/// Options for creating a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateRoomOptions {
    pub is_direct: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invite: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
}

impl CreateRoomOptions {
    /// Options for a direct chat with one user.
    pub fn direct(user_id: impl Into<String>) -> Self {
        Self {
            is_direct: true,
            invite: vec![user_id.into()],
            preset: Some("trusted_private_chat".to_string()),
            ..Default::default()
        }
    }
}

/// How the client authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A pre-issued access token.
    AccessToken(String),
    /// Password login.
    Password {
        user: String,
        password: String,
        device_name: String,
    },
}

// =============================================================================
// Capability trait
// =============================================================================

/// Everything the core needs from a Matrix client.
///
/// All network operations are async and run on the event loop. The room
/// table accessors (`room`, `rooms`, `knows_room`) are synchronous reads of
/// the client's live state.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// The authenticated user id, once known.
    fn user_id(&self) -> Option<String>;

    /// Authenticates and returns the user id.
    async fn login(&self, credentials: &Credentials) -> ClientResult<String>;

    /// Confirms the session and returns the user id.
    async fn whoami(&self) -> ClientResult<String>;

    /// Performs one sync round trip and folds it into the room table.
    async fn sync(&self, options: SyncOptions) -> ClientResult<SyncBatch>;

    /// Sends a room event and returns its event id.
    async fn room_send(
        &self,
        room_id: &str,
        event_type: &str,
        content: Value,
    ) -> ClientResult<String>;

    /// Fetches a single event by id.
    async fn room_get_event(&self, room_id: &str, event_id: &str) -> ClientResult<Value>;

    async fn get_profile(&self, user_id: &str) -> ClientResult<ProfileInfo>;

    /// Joins a room by id or alias and returns the room id.
    async fn join(&self, room: &str) -> ClientResult<String>;

    async fn room_leave(&self, room_id: &str) -> ClientResult<()>;

    async fn room_forget(&self, room_id: &str) -> ClientResult<()>;

    async fn room_invite(&self, room_id: &str, user_id: &str) -> ClientResult<()>;

    /// Creates a room and returns its id.
    async fn room_create(&self, options: CreateRoomOptions) -> ClientResult<String>;

    /// Ids of all joined rooms, as reported by the server.
    async fn joined_rooms(&self) -> ClientResult<Vec<String>>;

    /// Uploads media and returns its content URI.
    async fn upload(
        &self,
        data: Vec<u8>,
        content_type: &str,
        filename: &str,
    ) -> ClientResult<String>;

    /// Snapshot of a joined room.
    fn room(&self, room_id: &str) -> Option<Arc<RoomSnapshot>>;

    /// Snapshots of all joined rooms, ordered by room id.
    fn rooms(&self) -> Vec<Arc<RoomSnapshot>>;

    /// Whether the id is in the known-room table.
    fn knows_room(&self, room_id: &str) -> bool {
        self.room(room_id).is_some()
    }
}

/// Shared handle to a protocol client.
pub type BoxedClient = Arc<dyn ProtocolClient>;

#[cfg(test)]
mod tests {
    use super::*;

    fn two_person_room() -> RoomSnapshot {
        RoomSnapshot::new("!dm:example.org")
            .with_member(MemberInfo::joined("@bot:example.org").with_display_name("Bot"))
            .with_member(MemberInfo::joined("@alice:example.org").with_display_name("Alice"))
    }

    #[test]
    fn unnamed_room_is_group_style() {
        let room = two_person_room();
        assert!(room.is_group());
        assert!(!room.clone().with_name("Ops").is_group());
        assert!(!room.with_alias("#ops:example.org").is_group());
    }

    #[test]
    fn member_count_prefers_summary() {
        let mut room = two_person_room();
        assert_eq!(room.member_count(), 2);

        room.joined_count = Some(5);
        room.invited_count = Some(1);
        assert_eq!(room.member_count(), 6);
    }

    #[test]
    fn invited_members_count() {
        let room = RoomSnapshot::new("!new:example.org")
            .with_member(MemberInfo::joined("@bot:example.org"))
            .with_member(MemberInfo::invited("@bob:example.org"));
        assert_eq!(room.member_count(), 2);
    }

    #[test]
    fn disambiguated_name_adds_id_on_clash() {
        let room = two_person_room()
            .with_member(MemberInfo::joined("@alice:other.org").with_display_name("Alice"));
        assert_eq!(
            room.disambiguated_name("@alice:example.org"),
            "Alice (@alice:example.org)"
        );
        assert_eq!(room.disambiguated_name("@bot:example.org"), "Bot");
        assert_eq!(room.disambiguated_name("@ghost:example.org"), "@ghost:example.org");
    }

    #[test]
    fn machine_name_falls_back_to_id() {
        let room = two_person_room();
        assert_eq!(room.machine_name(), "!dm:example.org");
        assert_eq!(
            room.with_alias("#ops:example.org").machine_name(),
            "#ops:example.org"
        );
    }

    #[test]
    fn power_level_defaults_to_zero() {
        let room = two_person_room()
            .with_member(MemberInfo::joined("@admin:example.org").with_power_level(100));
        assert_eq!(room.power_level("@admin:example.org"), 100);
        assert_eq!(room.power_level("@nobody:example.org"), 0);
    }

    #[test]
    fn direct_room_options_invite_the_peer() {
        let options = CreateRoomOptions::direct("@alice:example.org");
        assert!(options.is_direct);
        assert_eq!(options.invite, vec!["@alice:example.org".to_string()]);

        let json = serde_json::to_value(&options).unwrap();
        assert!(json.get("name").is_none());
        assert_eq!(json["preset"], "trusted_private_chat");
    }

    #[test]
    fn profile_keeps_extra_fields() {
        let profile: ProfileInfo = serde_json::from_value(serde_json::json!({
            "displayname": "Alice",
            "address": "alice@example.org"
        }))
        .unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert_eq!(profile.other["address"], "alice@example.org");
    }
}
