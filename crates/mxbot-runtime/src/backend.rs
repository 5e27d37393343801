//! The Matrix backend: lifecycle orchestration and the blocking facade the
//! host runtime calls into.
//!
//! # Lifecycle
//!
//! ```text
//! serve(host)
//!   └─ Bridge::run (this thread becomes the event loop)
//!        ├─ login + whoami             fatal on failure
//!        ├─ initial full-state sync    history discarded
//!        ├─ queued operations start running
//!        ├─ host.on_connected()
//!        ├─ long poll ──▶ EventDispatcher::dispatch, until shutdown
//!        └─ host.on_disconnected()
//! ```
//!
//! Operations that talk to the homeserver block the calling host thread while
//! a unit runs on the event loop, so they must not be called from inside an
//! async runtime. Host callbacks already run on blocking workers and may call
//! them freely.
//!
//! Identifier parsing and self detection do not go through the loop. They
//! only clone immutable room snapshots and the user id out of the client's
//! `parking_lot` locks. A sync is folded into the room table under a single
//! write lock, so these reads are safe from any thread and never observe a
//! half-applied sync.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mxbot_client::HttpClient;
use mxbot_core::{
    BoxedClient, BoxedHost, Bridge, CoreError, CoreResult, CreateRoomOptions, DirectMessageResolver,
    DirectRoom, EventDispatcher, Identifier, LoopContext, Message, Person, Room, ShutdownHandle,
    SyncOptions, outbound,
};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{MatrixConfig, MxbotConfig, validate_config};
use crate::error::RuntimeResult;

/// Name the backend reports as its mode.
pub const MODE: &str = "matrix";

/// A Matrix backend for one bot account.
pub struct MatrixBackend {
    config: MatrixConfig,
    client: BoxedClient,
    resolver: Arc<DirectMessageResolver>,
    bridge: Bridge,
    shutdown: ShutdownHandle,
    identity: RwLock<Option<Person>>,
}

impl MatrixBackend {
    /// Creates a backend talking HTTP to the configured homeserver.
    pub fn new(config: &MxbotConfig) -> RuntimeResult<Self> {
        validate_config(config)?;
        let client = HttpClient::new(
            config.matrix.homeserver_url(),
            config.matrix.request_timeout(),
        )?;
        info!(homeserver = %client.homeserver(), "Created Matrix backend");
        Ok(Self::with_client(config.matrix.clone(), Arc::new(client)))
    }

    /// Creates a backend over an existing protocol client.
    pub fn with_client(config: MatrixConfig, client: BoxedClient) -> Self {
        Self {
            config,
            client,
            resolver: Arc::new(DirectMessageResolver::new()),
            bridge: Bridge::new(),
            shutdown: ShutdownHandle::new(),
            identity: RwLock::new(None),
        }
    }

    pub fn mode(&self) -> &'static str {
        MODE
    }

    /// The bot's own identity, known once `serve` has logged in.
    pub fn bot_identifier(&self) -> Option<Person> {
        self.identity.read().clone()
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn is_running(&self) -> bool {
        self.bridge.is_running()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stops the long-poll loop; `serve` returns shortly after.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.shutdown();
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Runs the event loop on the calling thread until shutdown.
    ///
    /// Returns the startup error when login or the initial sync fails.
    /// Operations submitted before startup completes wait for the room table
    /// to be populated by the initial sync.
    pub fn serve(&self, host: BoxedHost) -> RuntimeResult<()> {
        let ctx = LoopContext::new(self.client.clone(), self.resolver.clone());
        self.bridge
            .run_staged(ctx, self.start(), |user_id| self.listen(host, user_id))?;
        Ok(())
    }

    /// Login, whoami and the initial full-state sync.
    async fn start(&self) -> CoreResult<String> {
        let user_id = self.connect().await?;

        let initial = self.client.sync(SyncOptions::initial()).await?;
        debug!(
            next_batch = %initial.next_batch,
            discarded = initial.events.len(),
            "Initial sync complete"
        );
        Ok(user_id)
    }

    async fn listen(&self, host: BoxedHost, user_id: String) -> CoreResult<()> {
        let dispatcher = EventDispatcher::new(
            self.client.clone(),
            host.clone(),
            self.resolver.clone(),
            user_id,
        );
        notify_host(&host, |host| host.on_connected()).await;
        info!("Connected, listening for events");

        let timeout = self.config.sync_timeout();
        loop {
            let batch = tokio::select! {
                _ = self.shutdown.wait() => break,
                batch = self.client.sync(SyncOptions::long_poll(timeout)) => batch,
            };

            match batch {
                Ok(batch) => {
                    for event in batch.events {
                        dispatcher.dispatch(event).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Sync failed, retrying after delay");
                    tokio::select! {
                        _ = self.shutdown.wait() => break,
                        _ = tokio::time::sleep(self.config.sync_error_delay()) => {}
                    }
                }
            }
        }

        notify_host(&host, |host| host.on_disconnected()).await;
        info!("Disconnected");
        Ok(())
    }

    /// Logs in when credentials are configured and records the bot identity.
    async fn connect(&self) -> CoreResult<String> {
        if let Some(credentials) = self.config.credentials() {
            self.client
                .login(&credentials)
                .await
                .map_err(|e| CoreError::Authentication(e.to_string()))?;
        }
        let user_id = self
            .client
            .whoami()
            .await
            .map_err(|e| CoreError::Authentication(e.to_string()))?;

        let me = Person::resolve(self.client.as_ref(), &user_id).await;
        info!(
            user_id = %user_id,
            display_name = me.fullname().unwrap_or("<none>"),
            "Logged in"
        );
        *self.identity.write() = Some(me);
        Ok(user_id)
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Sends a message and returns the new event id.
    pub fn send_message(&self, message: &Message) -> CoreResult<String> {
        let message = message.clone();
        self.bridge
            .submit(move |ctx| async move { outbound::send_message(&ctx, &message).await })
    }

    /// Reacts to an inbound message.
    pub fn react(&self, message: &Message, key: &str) -> CoreResult<String> {
        let message = message.clone();
        let key = key.to_string();
        self.bridge
            .submit(move |ctx| async move { outbound::react(&ctx, &message, &key).await })
    }

    pub fn annotate_event(&self, room_id: &str, event_id: &str, key: &str) -> CoreResult<String> {
        let (room_id, event_id, key) = (room_id.to_string(), event_id.to_string(), key.to_string());
        self.bridge.submit(move |ctx| async move {
            outbound::annotate_event(ctx.client.as_ref(), &room_id, &event_id, &key).await
        })
    }

    /// Uploads an image file and posts it to `target`.
    pub fn send_image(&self, target: &Identifier, path: impl AsRef<Path>) -> CoreResult<String> {
        let target = target.clone();
        let path: PathBuf = path.as_ref().to_path_buf();
        self.bridge
            .submit(move |ctx| async move { outbound::send_image(&ctx, &target, &path).await })
    }

    /// Joined, non-private rooms ordered by id.
    pub fn rooms(&self) -> CoreResult<Vec<Room>> {
        self.bridge
            .submit(|ctx| async move { outbound::public_rooms(ctx.client.as_ref()).await })
    }

    /// Accepted and ignored; presence is not published.
    pub fn change_presence(&self, status: &str, message: Option<&str>) {
        debug!(status, message, "Presence change ignored");
    }

    // =========================================================================
    // Room commands
    // =========================================================================

    /// Joins a room by id or alias.
    pub fn join_room(&self, room: &str) -> CoreResult<Room> {
        let room = room.to_string();
        self.bridge.submit(move |ctx| async move {
            let room_id = Room::detached(room).join(ctx.client.as_ref()).await?;
            Ok(Room::new(room_id, ctx.client.as_ref()))
        })
    }

    pub fn leave_room(&self, room_id: &str) -> CoreResult<()> {
        let room_id = room_id.to_string();
        self.bridge.submit(move |ctx| async move {
            Room::detached(&room_id).leave(ctx.client.as_ref()).await?;
            ctx.resolver.invalidate_room(&room_id).await;
            Ok(())
        })
    }

    /// Leaves the room if still joined, then forgets it.
    pub fn destroy_room(&self, room_id: &str) -> CoreResult<()> {
        let room_id = room_id.to_string();
        self.bridge.submit(move |ctx| async move {
            Room::new(&room_id, ctx.client.as_ref())
                .destroy(ctx.client.as_ref())
                .await?;
            ctx.resolver.invalidate_room(&room_id).await;
            Ok(())
        })
    }

    pub fn create_room(&self, options: CreateRoomOptions) -> CoreResult<Room> {
        self.bridge.submit(move |ctx| async move {
            Ok(Room::unnamed().create(ctx.client.as_ref(), options).await?)
        })
    }

    pub fn invite_to_room(&self, room_id: &str, user_ids: &[String]) -> CoreResult<()> {
        let room_id = room_id.to_string();
        let user_ids = user_ids.to_vec();
        self.bridge.submit(move |ctx| async move {
            Room::detached(room_id)
                .invite(ctx.client.as_ref(), &user_ids)
                .await?;
            Ok(())
        })
    }

    // =========================================================================
    // Identifiers and messages
    // =========================================================================

    /// Parses a user id, room id or room alias.
    ///
    /// Rooms are looked up in the client's room table; an unknown room id or
    /// alias gives `None`. Reads a snapshot without entering the event loop.
    pub fn build_identifier(&self, text: &str) -> Option<Identifier> {
        let text = text.trim();
        match text.chars().next()? {
            '@' => Some(Person::new(text).into()),
            '!' => self
                .client
                .knows_room(text)
                .then(|| Room::new(text, self.client.as_ref()).into()),
            '#' => self
                .client
                .rooms()
                .into_iter()
                .find(|snapshot| snapshot.canonical_alias.as_deref() == Some(text))
                .map(|snapshot| Room::from_snapshot(snapshot).into()),
            _ => None,
        }
    }

    pub fn query_room(&self, text: &str) -> Option<Room> {
        match self.build_identifier(text)? {
            Identifier::Room(room) => Some(room),
            _ => None,
        }
    }

    pub fn build_message(&self, text: &str) -> Message {
        Message::new(text)
    }

    /// Builds a reply to `message`.
    ///
    /// A reply to a direct message goes back through the same private room.
    /// A private reply to a room message goes to the sender as a person.
    pub fn build_reply(&self, message: &Message, text: &str, private: bool) -> Message {
        let mut reply = self.build_message(text);
        reply.frm = self.bot_identifier().map(Identifier::from);

        let sender = message.frm.as_ref().and_then(Identifier::person).cloned();
        reply.to = if message.is_direct() {
            match (message.to.as_ref().and_then(Identifier::room), sender) {
                (Some(room), Some(peer)) => Some(DirectRoom::new(room.clone(), peer).into()),
                _ => message.to.clone(),
            }
        } else if private {
            sender.map(Identifier::from)
        } else {
            message.to.clone()
        };
        reply
    }

    /// Whether the bot itself sent `message`.
    ///
    /// Uses the identity recorded at login, falling back to the client's user id.
    pub fn is_from_self(&self, message: &Message) -> bool {
        let Some(sender) = message.frm.as_ref().and_then(Identifier::person) else {
            return false;
        };
        let own_id = self
            .identity
            .read()
            .as_ref()
            .map(|me| me.id().to_string())
            .or_else(|| self.client.user_id());
        own_id.as_deref() == Some(sender.id())
    }
}

/// Runs a host callback on a blocking worker and waits for it.
async fn notify_host(host: &BoxedHost, callback: fn(&BoxedHost)) {
    let host = host.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || callback(&host)).await {
        error!(error = %e, "Host callback panicked");
    }
}
