//! Identity model: people, rooms, occupants, and the [`Identifier`] variant.
//!
//! Every identity is keyed by its protocol-native id (`@user:server`,
//! `!room:server`) and compares by that id only. Construction never performs
//! I/O; a [`Person`] may carry no profile at all ("stub") and a [`Room`] may
//! carry no snapshot when it is not joined.
//!
//! Room commands (`join`, `leave`, `destroy`, `invite`, `create`) are thin
//! pass-throughs to the [`ProtocolClient`]; a client failure always surfaces
//! as a [`RoomError::Operation`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::client::{CreateRoomOptions, MemberInfo, ProfileInfo, ProtocolClient, RoomSnapshot};
use crate::error::{RoomError, RoomResult};

// =============================================================================
// Person
// =============================================================================

/// Resolved profile of a person.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Auxiliary profile fields.
    pub fields: Map<String, Value>,
}

impl Profile {
    /// Addresses derived from the `address` field, which may be a string or a list.
    pub fn emails(&self) -> Vec<String> {
        match self.fields.get("address") {
            Some(Value::String(address)) => vec![address.clone()],
            Some(Value::Array(addresses)) => addresses
                .iter()
                .filter_map(|a| a.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<ProfileInfo> for Profile {
    fn from(info: ProfileInfo) -> Self {
        Self {
            display_name: info.display_name,
            avatar_url: info.avatar_url,
            fields: info.other,
        }
    }
}

/// A Matrix user.
#[derive(Debug, Clone)]
pub struct Person {
    id: String,
    profile: Option<Profile>,
}

impl Person {
    /// Creates a stub person with no resolved profile.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            profile: None,
        }
    }

    pub fn with_profile(id: impl Into<String>, profile: Profile) -> Self {
        Self {
            id: id.into(),
            profile: Some(profile),
        }
    }

    /// Fetches the profile of `id`.
    ///
    /// A failed lookup is logged and yields a person with an empty profile.
    pub async fn resolve(client: &dyn ProtocolClient, id: &str) -> Self {
        match client.get_profile(id).await {
            Ok(info) => Self::with_profile(id, info.into()),
            Err(e) => {
                warn!(user_id = %id, error = %e, "Failed to fetch profile");
                Self::with_profile(id, Profile::default())
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The localpart of the id: `@alice:example.org` gives `alice`.
    pub fn nick(&self) -> &str {
        let local = self.id.strip_prefix('@').unwrap_or(&self.id);
        local.split_once(':').map_or(local, |(nick, _)| nick)
    }

    pub fn aclattr(&self) -> &str {
        &self.id
    }

    /// The display name, if a profile was resolved and carries one.
    pub fn fullname(&self) -> Option<&str> {
        self.profile.as_ref()?.display_name.as_deref()
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.profile.as_ref()?.avatar_url.as_deref()
    }

    pub fn emails(&self) -> Vec<String> {
        self.profile.as_ref().map(Profile::emails).unwrap_or_default()
    }

    /// The first address, or an empty string.
    pub fn email(&self) -> String {
        self.emails().into_iter().next().unwrap_or_default()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn set_profile(&mut self, profile: Profile) {
        self.profile = Some(profile);
    }

    /// True when no profile has been resolved.
    pub fn is_stub(&self) -> bool {
        self.profile.is_none()
    }
}

impl PartialEq for Person {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Person {}

impl Hash for Person {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

// =============================================================================
// Room
// =============================================================================

/// A Matrix room, optionally backed by a joined-room snapshot.
#[derive(Debug, Clone)]
pub struct Room {
    id: String,
    snapshot: Option<Arc<RoomSnapshot>>,
    known: bool,
}

impl Room {
    /// Looks the id up in the client's room table.
    pub fn new(id: impl Into<String>, client: &dyn ProtocolClient) -> Self {
        let id = id.into();
        let snapshot = client.room(&id);
        let known = snapshot.is_some() || client.knows_room(&id);
        Self { id, snapshot, known }
    }

    /// A room with no snapshot and no link to any client table.
    pub fn detached(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            snapshot: None,
            known: false,
        }
    }

    /// A room that does not exist yet; call [`Room::create`] on it.
    pub fn unnamed() -> Self {
        Self::detached(String::new())
    }

    pub fn from_snapshot(snapshot: Arc<RoomSnapshot>) -> Self {
        Self {
            id: snapshot.room_id.clone(),
            snapshot: Some(snapshot),
            known: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> Option<&Arc<RoomSnapshot>> {
        self.snapshot.as_ref()
    }

    /// A group-style room with exactly two members.
    pub fn is_private(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.is_group() && s.member_count() == 2)
    }

    /// Whether the id was in the client's known-room table at construction.
    pub fn exists(&self) -> bool {
        self.known
    }

    /// Whether a joined-room snapshot is held.
    pub fn joined(&self) -> bool {
        self.snapshot.is_some()
    }

    fn require_snapshot(&self) -> RoomResult<&RoomSnapshot> {
        self.snapshot.as_deref().ok_or_else(|| RoomError::NotJoined {
            room_id: self.id.clone(),
        })
    }

    pub fn topic(&self) -> RoomResult<Option<String>> {
        Ok(self.require_snapshot()?.topic.clone())
    }

    pub fn set_topic(&self, _topic: &str) -> RoomResult<()> {
        Err(RoomError::Unsupported("setting the room topic"))
    }

    /// All members of the room as occupants.
    pub fn occupants(&self) -> RoomResult<Vec<RoomOccupant>> {
        let snapshot = self.require_snapshot()?;
        Ok(snapshot
            .members
            .values()
            .map(|member| RoomOccupant::new(member.clone(), self.clone()))
            .collect())
    }

    /// A single member as an occupant.
    pub fn occupant(&self, user_id: &str) -> RoomResult<Option<RoomOccupant>> {
        let snapshot = self.require_snapshot()?;
        Ok(snapshot
            .member(user_id)
            .map(|member| RoomOccupant::new(member.clone(), self.clone())))
    }

    /// Member user ids.
    pub fn members(&self) -> RoomResult<Vec<String>> {
        Ok(self.require_snapshot()?.members.keys().cloned().collect())
    }

    pub fn display_name(&self) -> String {
        self.snapshot
            .as_ref()
            .map_or_else(|| self.id.clone(), |s| s.display_name())
    }

    pub fn machine_name(&self) -> &str {
        self.snapshot
            .as_ref()
            .map_or(self.id.as_str(), |s| s.machine_name())
    }

    /// Power level of a user here; 0 when not joined or unknown.
    pub fn power_level(&self, user_id: &str) -> i64 {
        self.snapshot.as_ref().map_or(0, |s| s.power_level(user_id))
    }

    fn require_id(&self, action: &'static str) -> RoomResult<()> {
        if self.id.is_empty() {
            return Err(RoomError::operation(action, "", "room has no id"));
        }
        Ok(())
    }

    pub async fn join(&self, client: &dyn ProtocolClient) -> RoomResult<String> {
        self.require_id("join")?;
        debug!(room_id = %self.id, "Joining room");
        client
            .join(&self.id)
            .await
            .map_err(|e| RoomError::operation("join", &self.id, e))
    }

    pub async fn leave(&self, client: &dyn ProtocolClient) -> RoomResult<()> {
        self.require_id("leave")?;
        debug!(room_id = %self.id, "Leaving room");
        client
            .room_leave(&self.id)
            .await
            .map_err(|e| RoomError::operation("leave", &self.id, e))
    }

    /// Forgets the room, leaving it first if still joined.
    pub async fn destroy(&self, client: &dyn ProtocolClient) -> RoomResult<()> {
        self.require_id("destroy")?;
        if self.joined() {
            self.leave(client).await?;
        }
        debug!(room_id = %self.id, "Forgetting room");
        client
            .room_forget(&self.id)
            .await
            .map_err(|e| RoomError::operation("destroy", &self.id, e))
    }

    pub async fn invite(&self, client: &dyn ProtocolClient, user_ids: &[String]) -> RoomResult<()> {
        self.require_id("invite")?;
        for user_id in user_ids {
            debug!(room_id = %self.id, user_id = %user_id, "Inviting user");
            client
                .room_invite(&self.id, user_id)
                .await
                .map_err(|e| RoomError::operation("invite", &self.id, e))?;
        }
        Ok(())
    }

    /// Creates a new room on the server. Fails if this room already has an id.
    pub async fn create(
        &self,
        client: &dyn ProtocolClient,
        options: CreateRoomOptions,
    ) -> RoomResult<Room> {
        if !self.id.is_empty() {
            return Err(RoomError::AlreadyExists {
                room_id: self.id.clone(),
            });
        }
        let room_id = client
            .room_create(options)
            .await
            .map_err(|e| RoomError::operation("create", "", e))?;
        debug!(room_id = %room_id, "Created room");
        Ok(Room::new(room_id, client))
    }
}

impl PartialEq for Room {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Room {}

impl Hash for Room {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.machine_name())
    }
}

// =============================================================================
// RoomOccupant
// =============================================================================

/// A person as observed inside a specific room.
#[derive(Debug, Clone)]
pub struct RoomOccupant {
    person: Person,
    member: MemberInfo,
    room: Room,
}

impl RoomOccupant {
    pub fn new(member: MemberInfo, room: Room) -> Self {
        let profile = Profile {
            display_name: member.display_name.clone(),
            avatar_url: member.avatar_url.clone(),
            fields: Map::new(),
        };
        Self {
            person: Person::with_profile(member.user_id.clone(), profile),
            member,
            room,
        }
    }

    /// Builds an occupant for `user_id` from the room snapshot, falling back
    /// to a bare member record when the snapshot does not list the user.
    pub fn in_room(user_id: &str, room: Room) -> Self {
        let member = room
            .snapshot()
            .and_then(|s| s.member(user_id).cloned())
            .unwrap_or_else(|| MemberInfo::joined(user_id));
        Self::new(member, room)
    }

    pub fn id(&self) -> &str {
        self.person.id()
    }

    pub fn person(&self) -> &Person {
        &self.person
    }

    /// The bare person behind this occupant.
    pub fn real_user(&self) -> Person {
        self.person.clone()
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn disambiguated_name(&self) -> String {
        self.room.snapshot().map_or_else(
            || self.person.id().to_string(),
            |s| s.disambiguated_name(self.person.id()),
        )
    }

    pub fn power_level(&self) -> i64 {
        self.member.power_level
    }

    pub fn presence(&self) -> Option<&str> {
        self.member.presence.as_deref()
    }

    pub fn currently_active(&self) -> bool {
        self.member.currently_active
    }

    pub fn status_message(&self) -> Option<&str> {
        self.member.status_msg.as_deref()
    }
}

impl PartialEq for RoomOccupant {
    fn eq(&self, other: &Self) -> bool {
        self.person == other.person && self.room == other.room
    }
}

impl Eq for RoomOccupant {}

impl fmt::Display for RoomOccupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.disambiguated_name(), self.room)
    }
}

// =============================================================================
// DirectRoom
// =============================================================================

/// A private room presented as the person on the other side of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectRoom {
    pub room: Room,
    pub peer: Person,
}

impl DirectRoom {
    pub fn new(room: Room, peer: Person) -> Self {
        Self { room, peer }
    }
}

impl fmt::Display for DirectRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.peer, self.room.id())
    }
}

// =============================================================================
// Identifier
// =============================================================================

/// Any addressable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Person(Person),
    Occupant(RoomOccupant),
    Room(Room),
    PrivateRoom(DirectRoom),
}

impl Identifier {
    /// The protocol id. For a [`DirectRoom`] this is the room id.
    pub fn id(&self) -> &str {
        match self {
            Self::Person(p) => p.id(),
            Self::Occupant(o) => o.id(),
            Self::Room(r) => r.id(),
            Self::PrivateRoom(d) => d.room.id(),
        }
    }

    /// The person behind this identifier, if any.
    pub fn person(&self) -> Option<&Person> {
        match self {
            Self::Person(p) => Some(p),
            Self::Occupant(o) => Some(o.person()),
            Self::PrivateRoom(d) => Some(&d.peer),
            Self::Room(_) => None,
        }
    }

    /// The room behind this identifier, if any.
    pub fn room(&self) -> Option<&Room> {
        match self {
            Self::Room(r) => Some(r),
            Self::Occupant(o) => Some(o.room()),
            Self::PrivateRoom(d) => Some(&d.room),
            Self::Person(_) => None,
        }
    }

    pub fn is_person(&self) -> bool {
        matches!(self, Self::Person(_))
    }

    pub fn is_occupant(&self) -> bool {
        matches!(self, Self::Occupant(_))
    }

    pub fn is_room(&self) -> bool {
        matches!(self, Self::Room(_) | Self::PrivateRoom(_))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Person(p) => fmt::Display::fmt(p, f),
            Self::Occupant(o) => fmt::Display::fmt(o, f),
            Self::Room(r) => fmt::Display::fmt(r, f),
            Self::PrivateRoom(d) => fmt::Display::fmt(d, f),
        }
    }
}

impl From<Person> for Identifier {
    fn from(person: Person) -> Self {
        Self::Person(person)
    }
}

impl From<RoomOccupant> for Identifier {
    fn from(occupant: RoomOccupant) -> Self {
        Self::Occupant(occupant)
    }
}

impl From<Room> for Identifier {
    fn from(room: Room) -> Self {
        Self::Room(room)
    }
}

impl From<DirectRoom> for Identifier {
    fn from(direct: DirectRoom) -> Self {
        Self::PrivateRoom(direct)
    }
}
