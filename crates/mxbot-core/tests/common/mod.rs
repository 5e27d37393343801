//! In-memory protocol client and host used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mxbot_core::{
    ClientError, ClientResult, CreateRoomOptions, Credentials, Host, MemberInfo, Message,
    ProfileInfo, ProtocolClient, Reaction, RoomSnapshot, SyncBatch, SyncOptions,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

pub const BOT: &str = "@bot:example.org";
pub const ALICE: &str = "@alice:example.org";
pub const BOB: &str = "@bob:example.org";

/// An event sent through [`FakeClient::room_send`].
#[derive(Debug, Clone)]
pub struct SentEvent {
    pub room_id: String,
    pub event_type: String,
    pub content: Value,
}

#[derive(Default)]
pub struct FakeClient {
    rooms: Mutex<BTreeMap<String, Arc<RoomSnapshot>>>,
    profiles: Mutex<HashMap<String, ProfileInfo>>,
    events: Mutex<HashMap<String, Value>>,
    syncs: Mutex<VecDeque<SyncBatch>>,
    /// Rooms that only appear once the full-state sync finishes.
    initial_rooms: Mutex<Vec<RoomSnapshot>>,

    pub sent: Mutex<Vec<SentEvent>>,
    pub joins: Mutex<Vec<String>>,
    pub leaves: Mutex<Vec<String>>,
    pub forgets: Mutex<Vec<String>>,
    pub invites: Mutex<Vec<(String, String)>>,
    pub creates: Mutex<Vec<CreateRoomOptions>>,
    pub uploads: Mutex<Vec<(String, String, usize)>>,

    pub profile_lookups: AtomicUsize,
    /// Number of upcoming long-poll syncs that fail.
    pub fail_syncs: AtomicUsize,
    pub fail_auth: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_join: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_profile: AtomicBool,
    /// How long the full-state sync takes, in milliseconds.
    pub initial_sync_delay_ms: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_room(&self, snapshot: RoomSnapshot) {
        self.rooms
            .lock()
            .insert(snapshot.room_id.clone(), Arc::new(snapshot));
    }

    /// Adds a room that the full-state sync will report.
    pub fn add_room_on_initial_sync(&self, snapshot: RoomSnapshot) {
        self.initial_rooms.lock().push(snapshot);
    }

    pub fn add_profile(&self, user_id: &str, display_name: &str) {
        self.profiles.lock().insert(
            user_id.to_string(),
            ProfileInfo {
                display_name: Some(display_name.to_string()),
                ..Default::default()
            },
        );
    }

    pub fn add_event(&self, event_id: &str, source: Value) {
        self.events.lock().insert(event_id.to_string(), source);
    }

    pub fn push_sync(&self, batch: SyncBatch) {
        self.syncs.lock().push_back(batch);
    }

    pub fn sent(&self) -> Vec<SentEvent> {
        self.sent.lock().clone()
    }

    fn next_id(&self, prefix: char) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}fake{n}:example.org")
    }
}

/// A two-member, unnamed room shared by the bot and `peer`.
pub fn private_room(room_id: &str, peer: &str) -> RoomSnapshot {
    RoomSnapshot::new(room_id)
        .with_member(MemberInfo::joined(BOT).with_display_name("Bot"))
        .with_member(MemberInfo::joined(peer))
}

/// An unnamed room with the given members.
pub fn unnamed_room(room_id: &str, members: &[&str]) -> RoomSnapshot {
    members.iter().fold(RoomSnapshot::new(room_id), |room, member| {
        room.with_member(MemberInfo::joined(*member))
    })
}

/// A named room with the given members.
pub fn group_room(room_id: &str, name: &str, members: &[&str]) -> RoomSnapshot {
    members.iter().fold(
        RoomSnapshot::new(room_id).with_name(name),
        |room, member| room.with_member(MemberInfo::joined(*member)),
    )
}

fn forbidden() -> ClientError {
    ClientError::api("M_FORBIDDEN", "denied by test")
}

#[async_trait]
impl ProtocolClient for FakeClient {
    fn user_id(&self) -> Option<String> {
        Some(BOT.to_string())
    }

    async fn login(&self, _credentials: &Credentials) -> ClientResult<String> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(ClientError::api("M_UNKNOWN_TOKEN", "invalid token"));
        }
        Ok(BOT.to_string())
    }

    async fn whoami(&self) -> ClientResult<String> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(ClientError::api("M_UNKNOWN_TOKEN", "invalid token"));
        }
        Ok(BOT.to_string())
    }

    async fn sync(&self, options: SyncOptions) -> ClientResult<SyncBatch> {
        if options.full_state {
            let delay = self.initial_sync_delay_ms.load(Ordering::SeqCst) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let rooms: Vec<_> = self.initial_rooms.lock().drain(..).collect();
            for snapshot in rooms {
                self.add_room(snapshot);
            }
        }
        if !options.full_state
            && self
                .fail_syncs
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(ClientError::Transport("connection reset".into()));
        }
        if let Some(batch) = self.syncs.lock().pop_front() {
            return Ok(batch);
        }
        tokio::time::sleep(options.timeout.unwrap_or(Duration::from_millis(10))).await;
        Ok(SyncBatch::default())
    }

    async fn room_send(&self, room_id: &str, event_type: &str, content: Value) -> ClientResult<String> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(forbidden());
        }
        tokio::task::yield_now().await;
        self.sent.lock().push(SentEvent {
            room_id: room_id.to_string(),
            event_type: event_type.to_string(),
            content,
        });
        Ok(self.next_id('$'))
    }

    async fn room_get_event(&self, _room_id: &str, event_id: &str) -> ClientResult<Value> {
        self.events
            .lock()
            .get(event_id)
            .cloned()
            .ok_or_else(|| ClientError::api("M_NOT_FOUND", "no such event"))
    }

    async fn get_profile(&self, user_id: &str) -> ClientResult<ProfileInfo> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_profile.load(Ordering::SeqCst) {
            return Err(forbidden());
        }
        Ok(self.profiles.lock().get(user_id).cloned().unwrap_or_default())
    }

    async fn join(&self, room: &str) -> ClientResult<String> {
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(forbidden());
        }
        self.joins.lock().push(room.to_string());
        Ok(room.to_string())
    }

    async fn room_leave(&self, room_id: &str) -> ClientResult<()> {
        self.leaves.lock().push(room_id.to_string());
        self.rooms.lock().remove(room_id);
        Ok(())
    }

    async fn room_forget(&self, room_id: &str) -> ClientResult<()> {
        self.forgets.lock().push(room_id.to_string());
        Ok(())
    }

    async fn room_invite(&self, room_id: &str, user_id: &str) -> ClientResult<()> {
        self.invites
            .lock()
            .push((room_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn room_create(&self, options: CreateRoomOptions) -> ClientResult<String> {
        // Let concurrent resolutions pile up behind the resolver lock.
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(forbidden());
        }
        self.creates.lock().push(options);
        Ok(self.next_id('!'))
    }

    async fn joined_rooms(&self) -> ClientResult<Vec<String>> {
        Ok(self.rooms.lock().keys().rev().cloned().collect())
    }

    async fn upload(&self, data: Vec<u8>, content_type: &str, filename: &str) -> ClientResult<String> {
        self.uploads
            .lock()
            .push((filename.to_string(), content_type.to_string(), data.len()));
        Ok("mxc://example.org/fake".to_string())
    }

    fn room(&self, room_id: &str) -> Option<Arc<RoomSnapshot>> {
        self.rooms.lock().get(room_id).cloned()
    }

    fn rooms(&self) -> Vec<Arc<RoomSnapshot>> {
        self.rooms.lock().values().cloned().collect()
    }
}

/// What a [`RecordingHost`] saw.
#[derive(Debug)]
pub enum HostEvent {
    Message(Message),
    Reaction(Reaction),
    Connected,
    Disconnected,
}

/// Host that forwards every callback into a channel.
pub struct RecordingHost {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl RecordingHost {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl Host for RecordingHost {
    fn on_message(&self, message: Message) {
        let _ = self.tx.send(HostEvent::Message(message));
    }

    fn on_reaction(&self, reaction: Reaction) {
        let _ = self.tx.send(HostEvent::Reaction(reaction));
    }

    fn on_connected(&self) {
        let _ = self.tx.send(HostEvent::Connected);
    }

    fn on_disconnected(&self) {
        let _ = self.tx.send(HostEvent::Disconnected);
    }
}

/// Waits for the next host callback, failing the test after a second.
pub async fn next_host_event(rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> HostEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("host callback timed out")
        .expect("host channel closed")
}
