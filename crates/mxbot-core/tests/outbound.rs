mod common;

use std::io::Write;
use std::sync::Arc;

use common::*;
use mxbot_core::{
    CoreError, DirectMessageResolver, DirectRoom, Identifier, LoopContext, Message, Person, Room,
    RoomOccupant, outbound,
};
use serde_json::json;

fn context(client: &Arc<FakeClient>) -> LoopContext {
    LoopContext::new(client.clone(), Arc::new(DirectMessageResolver::new()))
}

#[tokio::test]
async fn message_to_a_person_goes_to_the_management_room() {
    let client = FakeClient::new();
    client.add_room(private_room("!dm:example.org", ALICE));
    let ctx = context(&client);

    let message = Message::new("hello").with_to(Person::new(ALICE));
    outbound::send_message(&ctx, &message).await.unwrap();

    let sent = client.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].room_id, "!dm:example.org");
    assert_eq!(sent[0].event_type, "m.room.message");
    assert_eq!(sent[0].content["formatted_body"], "<p>hello</p>");
}

#[tokio::test]
async fn occupant_and_direct_room_targets_use_their_room() {
    let client = FakeClient::new();
    client.add_room(group_room("!ops:example.org", "Ops", &[BOT, ALICE]));
    let ctx = context(&client);

    let room = Room::new("!ops:example.org", &*client);
    let occupant = RoomOccupant::in_room(ALICE, room);
    let direct = DirectRoom::new(Room::detached("!dm:example.org"), Person::new(ALICE));

    assert_eq!(
        outbound::resolve_target(&ctx, &Identifier::from(occupant)).await.unwrap(),
        "!ops:example.org"
    );
    assert_eq!(
        outbound::resolve_target(&ctx, &Identifier::from(direct)).await.unwrap(),
        "!dm:example.org"
    );
    assert!(client.creates.lock().is_empty());
}

#[tokio::test]
async fn custom_content_is_merged() {
    let client = FakeClient::new();
    let ctx = context(&client);

    let mut message = Message::new("*hi*").with_to(Room::detached("!r:example.org"));
    message.set_custom("org.example.tag", Some(json!("x")));
    outbound::send_message(&ctx, &message).await.unwrap();

    let content = &client.sent()[0].content;
    assert_eq!(content["org.example.tag"], "x");
    assert_eq!(content["formatted_body"], "<p><em>hi</em></p>");
}

#[tokio::test]
async fn message_without_recipient_fails() {
    let client = FakeClient::new();
    let err = outbound::send_message(&context(&client), &Message::new("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnresolvableTarget(_)));
}

#[tokio::test]
async fn react_requires_an_event_id() {
    let client = FakeClient::new();
    let ctx = context(&client);

    let outbound_only = Message::new("hi").with_to(Room::detached("!r:example.org"));
    assert!(matches!(
        outbound::react(&ctx, &outbound_only, "👍").await,
        Err(CoreError::MissingEventId)
    ));

    let mut inbound = outbound_only.clone();
    inbound.extras.insert("event_id".into(), json!("$orig"));
    outbound::react(&ctx, &inbound, "👍").await.unwrap();

    let sent = client.sent();
    assert_eq!(sent[0].event_type, "m.reaction");
    assert_eq!(sent[0].room_id, "!r:example.org");
    assert_eq!(sent[0].content["m.relates_to"]["event_id"], "$orig");
    assert_eq!(sent[0].content["m.relates_to"]["key"], "👍");
}

#[tokio::test]
async fn image_is_uploaded_then_posted() {
    let client = FakeClient::new();
    let ctx = context(&client);

    let path = std::env::temp_dir().join(format!("mxbot-outbound-{}.png", std::process::id()));
    std::fs::File::create(&path)
        .and_then(|mut f| f.write_all(&[0x89, b'P', b'N', b'G']))
        .unwrap();

    let target = Identifier::from(Room::detached("!r:example.org"));
    outbound::send_image(&ctx, &target, &path).await.unwrap();
    std::fs::remove_file(&path).ok();

    let uploads = client.uploads.lock().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, "image/png");
    assert_eq!(uploads[0].2, 4);

    let sent = client.sent();
    assert_eq!(sent[0].content["msgtype"], "m.image");
    assert_eq!(sent[0].content["url"], "mxc://example.org/fake");
    assert_eq!(sent[0].content["info"]["size"], 4);
}

#[tokio::test]
async fn non_image_file_is_rejected() {
    let client = FakeClient::new();
    let target = Identifier::from(Room::detached("!r:example.org"));
    let err = outbound::send_image(&context(&client), &target, std::path::Path::new("notes.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Media(_)));
    assert!(client.uploads.lock().is_empty());
}

#[tokio::test]
async fn public_rooms_are_sorted_and_exclude_private_ones() {
    let client = FakeClient::new();
    client.add_room(group_room("!b:example.org", "B", &[BOT, ALICE]));
    client.add_room(private_room("!dm:example.org", ALICE));
    client.add_room(group_room("!a:example.org", "A", &[BOT]));

    let rooms = outbound::public_rooms(&*client).await.unwrap();
    let ids: Vec<_> = rooms.iter().map(Room::id).collect();
    assert_eq!(ids, vec!["!a:example.org", "!b:example.org"]);
}
