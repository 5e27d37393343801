//! Outbound operations, run as units on the event loop.

use std::path::Path;

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::bridge::LoopContext;
use crate::client::ProtocolClient;
use crate::error::{CoreError, CoreResult};
use crate::identity::{Identifier, Room};
use crate::message::{MESSAGE_EVENT_TYPE, Message, MessageType};
use crate::reaction::{REACTION_EVENT_TYPE, annotation_content};

/// Resolves the room a message to `target` goes to.
///
/// A bare person is reached through their management room; every other
/// identifier names its room directly.
pub async fn resolve_target(ctx: &LoopContext, target: &Identifier) -> CoreResult<String> {
    match target {
        Identifier::Person(person) => ctx.resolver.resolve(ctx.client.as_ref(), person).await,
        Identifier::Occupant(occupant) => Ok(occupant.room().id().to_string()),
        Identifier::Room(room) => Ok(room.id().to_string()),
        Identifier::PrivateRoom(direct) => Ok(direct.room.id().to_string()),
    }
}

/// Sends a message and returns the new event id.
pub async fn send_message(ctx: &LoopContext, message: &Message) -> CoreResult<String> {
    let target = message
        .to
        .as_ref()
        .ok_or_else(|| CoreError::UnresolvableTarget("message has no recipient".into()))?;
    let room_id = resolve_target(ctx, target).await?;
    let content = message.to_content();

    debug!(room_id = %room_id, msgtype = %message.msgtype, "Sending message");
    let event_id = ctx
        .client
        .room_send(&room_id, MESSAGE_EVENT_TYPE, content)
        .await?;
    Ok(event_id)
}

/// Reacts to an inbound message with `key`.
pub async fn react(ctx: &LoopContext, message: &Message, key: &str) -> CoreResult<String> {
    let event_id = message.event_id().ok_or(CoreError::MissingEventId)?;
    let room_id = message
        .to
        .as_ref()
        .and_then(Identifier::room)
        .map(|room| room.id().to_string())
        .ok_or_else(|| CoreError::UnresolvableTarget("message was not sent to a room".into()))?;
    annotate_event(ctx.client.as_ref(), &room_id, event_id, key).await
}

/// Sends an annotation on an arbitrary event.
pub async fn annotate_event(
    client: &dyn ProtocolClient,
    room_id: &str,
    event_id: &str,
    key: &str,
) -> CoreResult<String> {
    debug!(room_id = %room_id, event_id = %event_id, key = %key, "Sending reaction");
    let reaction_id = client
        .room_send(room_id, REACTION_EVENT_TYPE, annotation_content(event_id, key))
        .await?;
    Ok(reaction_id)
}

/// Uploads an image file and posts it to `target`.
pub async fn send_image(ctx: &LoopContext, target: &Identifier, path: &Path) -> CoreResult<String> {
    let mimetype = image_mime_type(path)?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| CoreError::media(format!("{} has no file name", path.display())))?
        .to_string();
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| CoreError::media(format!("failed to read {}: {e}", path.display())))?;
    let size = data.len();

    let room_id = resolve_target(ctx, target).await?;
    let url = ctx.client.upload(data, mimetype, &filename).await?;
    info!(room_id = %room_id, url = %url, size, "Uploaded image");

    let content = image_content(&filename, &url, mimetype, size);
    let event_id = ctx
        .client
        .room_send(&room_id, MESSAGE_EVENT_TYPE, content)
        .await?;
    Ok(event_id)
}

/// Joined rooms that are not private, ordered by room id.
pub async fn public_rooms(client: &dyn ProtocolClient) -> CoreResult<Vec<Room>> {
    let ids = client.joined_rooms().await?;
    let mut rooms: Vec<Room> = ids
        .into_iter()
        .map(|id| Room::new(id, client))
        .filter(|room| !room.is_private())
        .collect();
    rooms.sort_by(|a, b| a.id().cmp(b.id()));
    Ok(rooms)
}

fn image_content(filename: &str, url: &str, mimetype: &str, size: usize) -> Value {
    json!({
        "body": filename,
        "msgtype": MessageType::Image.as_str(),
        "url": url,
        "info": {
            "size": size,
            "mimetype": mimetype,
        },
    })
}

/// Image MIME type from the file extension.
pub fn image_mime_type(path: &Path) -> CoreResult<&'static str> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mimetype = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        _ => {
            return Err(CoreError::media(format!(
                "{} is not a recognised image type",
                path.display()
            )));
        }
    };
    Ok(mimetype)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(image_mime_type(Path::new("a/cat.PNG")).unwrap(), "image/png");
        assert_eq!(image_mime_type(Path::new("dog.jpeg")).unwrap(), "image/jpeg");
        assert!(image_mime_type(Path::new("notes.txt")).is_err());
        assert!(image_mime_type(Path::new("noext")).is_err());
    }

    #[test]
    fn image_content_shape() {
        let content = image_content("cat.png", "mxc://example.org/abc", "image/png", 42);
        assert_eq!(content["msgtype"], "m.image");
        assert_eq!(content["body"], "cat.png");
        assert_eq!(content["url"], "mxc://example.org/abc");
        assert_eq!(content["info"]["size"], 42);
        assert_eq!(content["info"]["mimetype"], "image/png");
    }
}
