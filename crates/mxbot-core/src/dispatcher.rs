//! Inbound event dispatch.
//!
//! [`EventDispatcher`] runs on the event loop. For each [`SyncEvent`] it
//! classifies the event, runs the matching handler, and hands the result to
//! the [`Host`](crate::host::Host) on a blocking worker thread. Every handler
//! returns a [`CoreResult`]; [`EventDispatcher::dispatch`] is the boundary
//! where failures are logged and contained, so one bad event never stops the
//! long-poll loop.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, error, info, trace, warn};

use crate::client::BoxedClient;
use crate::error::CoreResult;
use crate::event::{ClassifiedEvent, InviteEvent, ReactionEvent, SyncEvent, TextEvent, classify};
use crate::host::BoxedHost;
use crate::identity::{Identifier, Person, Room, RoomOccupant};
use crate::message::Message;
use crate::reaction::{ReactedTo, Reaction, ReactionAction};
use crate::resolver::DirectMessageResolver;

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handed to the host.
    Delivered,
    /// Acted on without involving the host.
    Handled,
    /// Nothing to do, or the handler failed.
    Dropped,
}

/// Classifies inbound events and routes them to handlers.
pub struct EventDispatcher {
    client: BoxedClient,
    host: BoxedHost,
    resolver: Arc<DirectMessageResolver>,
    own_user_id: String,
}

impl EventDispatcher {
    pub fn new(
        client: BoxedClient,
        host: BoxedHost,
        resolver: Arc<DirectMessageResolver>,
        own_user_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            host,
            resolver,
            own_user_id: own_user_id.into(),
        }
    }

    /// Dispatches one event. Never fails; handler errors are logged here.
    pub async fn dispatch(&self, event: SyncEvent) -> Outcome {
        match self.route(&event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    room_id = %event.room_id,
                    event_type = event.event_type().unwrap_or("<none>"),
                    error = %e,
                    source = %event.source,
                    "Failed to handle event"
                );
                Outcome::Dropped
            }
        }
    }

    async fn route(&self, event: &SyncEvent) -> CoreResult<Outcome> {
        let classified = classify(event, Some(&self.own_user_id))?;
        trace!(room_id = %event.room_id, kind = classified.kind(), "Classified event");

        match classified {
            ClassifiedEvent::Text(text) => {
                let message = self.handle_text(text).await?;
                self.deliver_message(message);
                Ok(Outcome::Delivered)
            }
            ClassifiedEvent::Invite(invite) => {
                self.handle_invite(invite).await?;
                Ok(Outcome::Handled)
            }
            ClassifiedEvent::Reaction(reaction) => match self.handle_reaction(reaction).await? {
                Some(reaction) => {
                    self.deliver_reaction(reaction);
                    Ok(Outcome::Delivered)
                }
                None => Ok(Outcome::Dropped),
            },
            ClassifiedEvent::Left { room_id } => {
                self.resolver.invalidate_room(&room_id).await;
                Ok(Outcome::Handled)
            }
            ClassifiedEvent::Unknown { room_id, event_type } => {
                debug!(room_id = %room_id, event_type = %event_type, "Unhandled event type");
                Ok(Outcome::Dropped)
            }
            ClassifiedEvent::Ignored { room_id, event_type } => {
                trace!(room_id = %room_id, event_type = %event_type, "Ignoring event");
                Ok(Outcome::Dropped)
            }
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Builds the host message for a text event.
    ///
    /// In a private room the sender becomes a [`Person`] with a fetched
    /// profile; elsewhere a [`RoomOccupant`] read from the room snapshot.
    pub async fn handle_text(&self, event: TextEvent) -> CoreResult<Message> {
        let room = Room::new(&event.room_id, self.client.as_ref());

        let frm: Identifier = if room.is_private() {
            Person::resolve(self.client.as_ref(), &event.sender)
                .await
                .into()
        } else {
            RoomOccupant::in_room(&event.sender, room.clone()).into()
        };

        let mut extras = Map::new();
        extras.insert("event_id".into(), json!(event.event_id));
        extras.insert("sender".into(), json!(event.sender));
        extras.insert("timestamp".into(), json!(event.timestamp));
        extras.insert("decrypted".into(), json!(event.decrypted));
        extras.insert("verified".into(), json!(event.verified));

        let mut message = Message::new(event.body).with_from(frm).with_to(room);
        message.extras = extras;
        Ok(message)
    }

    /// Joins the room the bot was invited to.
    pub async fn handle_invite(&self, event: InviteEvent) -> CoreResult<()> {
        info!(
            room_id = %event.room_id,
            inviter = event.inviter.as_deref().unwrap_or("<unknown>"),
            "Invited to room, joining"
        );
        Room::detached(&event.room_id)
            .join(self.client.as_ref())
            .await?;
        Ok(())
    }

    /// Builds a [`Reaction`], or `None` when the reaction should be dropped.
    pub async fn handle_reaction(&self, event: ReactionEvent) -> CoreResult<Option<Reaction>> {
        if event.sender == self.own_user_id {
            trace!(room_id = %event.room_id, "Ignoring own reaction");
            return Ok(None);
        }

        let reactor = Person::resolve(self.client.as_ref(), &event.sender).await;
        let source = self
            .client
            .room_get_event(&event.room_id, &event.relates_to)
            .await?;

        let Some(author) = source.get("sender").and_then(Value::as_str) else {
            warn!(
                room_id = %event.room_id,
                event_id = %event.relates_to,
                response = %source,
                "Reacted-to event has an unexpected shape"
            );
            return Ok(None);
        };
        let reactee = Person::resolve(self.client.as_ref(), author).await;

        Ok(Some(Reaction {
            reactor,
            reactee,
            action: ReactionAction::Added,
            timestamp: event.timestamp,
            key: event.key,
            reacted_to: ReactedTo {
                room: Room::new(&event.room_id, self.client.as_ref()),
                source,
            },
        }))
    }

    // =========================================================================
    // Host delivery
    // =========================================================================

    fn deliver_message(&self, message: Message) {
        let host = self.host.clone();
        let task = tokio::task::spawn_blocking(move || host.on_message(message));
        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(error = %e, "Host message callback failed");
            }
        });
    }

    fn deliver_reaction(&self, reaction: Reaction) {
        let host = self.host.clone();
        let task = tokio::task::spawn_blocking(move || host.on_reaction(reaction));
        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(error = %e, "Host reaction callback failed");
            }
        });
    }
}
