//! Direct-message resolution.
//!
//! Sending to a [`Person`] means finding (or creating) the one private room
//! shared with them, the person's *management room*. Resolution goes
//! cache → scan of joined rooms → room creation, and the whole sequence runs
//! under a single async lock so concurrent sends to the same person can never
//! create two rooms.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{CreateRoomOptions, ProtocolClient};
use crate::error::{CoreError, CoreResult};
use crate::identity::{Person, Room};

/// Finds and caches management rooms.
#[derive(Debug, Default)]
pub struct DirectMessageResolver {
    /// person id -> room id
    cache: Mutex<HashMap<String, String>>,
}

impl DirectMessageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the management room id for `person`, creating the room if needed.
    pub async fn resolve(&self, client: &dyn ProtocolClient, person: &Person) -> CoreResult<String> {
        let mut cache = self.cache.lock().await;

        if let Some(room_id) = cache.get(person.id()) {
            debug!(user_id = %person.id(), room_id = %room_id, "Management room cache hit");
            return Ok(room_id.clone());
        }

        if let Some(room_id) = find_private_room(client, person.id()) {
            debug!(user_id = %person.id(), room_id = %room_id, "Found existing private room");
            cache.insert(person.id().to_string(), room_id.clone());
            return Ok(room_id);
        }

        match client.room_create(CreateRoomOptions::direct(person.id())).await {
            Ok(room_id) => {
                info!(user_id = %person.id(), room_id = %room_id, "Created management room");
                cache.insert(person.id().to_string(), room_id.clone());
                Ok(room_id)
            }
            Err(e) => {
                warn!(user_id = %person.id(), error = %e, "Failed to create management room");
                Err(CoreError::DirectChannel {
                    person: person.id().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// The cached room for a person, if any.
    pub async fn cached(&self, person_id: &str) -> Option<String> {
        self.cache.lock().await.get(person_id).cloned()
    }

    /// Drops every cache entry pointing at `room_id`. Returns how many were dropped.
    pub async fn invalidate_room(&self, room_id: &str) -> usize {
        let mut cache = self.cache.lock().await;
        let before = cache.len();
        cache.retain(|_, cached| cached != room_id);
        let dropped = before - cache.len();
        if dropped > 0 {
            debug!(room_id = %room_id, dropped, "Invalidated management room");
        }
        dropped
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }
}

/// First private joined room (by room id) that has `user_id` as a member.
fn find_private_room(client: &dyn ProtocolClient, user_id: &str) -> Option<String> {
    client
        .rooms()
        .into_iter()
        .filter(|snapshot| snapshot.members.contains_key(user_id))
        .map(Room::from_snapshot)
        .find(Room::is_private)
        .map(|room| room.id().to_string())
}
