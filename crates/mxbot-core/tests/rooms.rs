mod common;

use std::sync::atomic::Ordering;

use common::*;
use mxbot_core::{CreateRoomOptions, Room, RoomError};

#[tokio::test]
async fn room_reflects_the_client_table() {
    let client = FakeClient::new();
    client.add_room(private_room("!dm:example.org", ALICE));

    let known = Room::new("!dm:example.org", &*client);
    assert!(known.exists());
    assert!(known.joined());
    assert!(known.is_private());
    assert_eq!(known.members().unwrap().len(), 2);

    let unknown = Room::new("!nope:example.org", &*client);
    assert!(!unknown.exists());
    assert!(!unknown.joined());
    assert!(matches!(unknown.topic(), Err(RoomError::NotJoined { .. })));
}

#[tokio::test]
async fn join_failure_is_a_typed_error() {
    let client = FakeClient::new();
    client.fail_join.store(true, Ordering::SeqCst);

    let err = Room::detached("!r:example.org")
        .join(&*client)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RoomError::Operation { action: "join", ref room_id, .. } if room_id == "!r:example.org"
    ));
}

#[tokio::test]
async fn destroy_leaves_then_forgets() {
    let client = FakeClient::new();
    client.add_room(group_room("!ops:example.org", "Ops", &[BOT, ALICE]));

    Room::new("!ops:example.org", &*client)
        .destroy(&*client)
        .await
        .unwrap();
    assert_eq!(*client.leaves.lock(), vec!["!ops:example.org".to_string()]);
    assert_eq!(*client.forgets.lock(), vec!["!ops:example.org".to_string()]);
}

#[tokio::test]
async fn destroy_of_unjoined_room_only_forgets() {
    let client = FakeClient::new();

    Room::detached("!old:example.org")
        .destroy(&*client)
        .await
        .unwrap();
    assert!(client.leaves.lock().is_empty());
    assert_eq!(client.forgets.lock().len(), 1);
}

#[tokio::test]
async fn invite_sends_one_invite_per_user() {
    let client = FakeClient::new();
    let room = Room::detached("!ops:example.org");

    room.invite(&*client, &[ALICE.to_string(), BOB.to_string()])
        .await
        .unwrap();
    assert_eq!(client.invites.lock().len(), 2);
}

#[tokio::test]
async fn create_needs_an_unnamed_room() {
    let client = FakeClient::new();

    let err = Room::detached("!taken:example.org")
        .create(&*client, CreateRoomOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyExists { .. }));
    assert!(client.creates.lock().is_empty());

    let created = Room::unnamed()
        .create(&*client, CreateRoomOptions::default())
        .await
        .unwrap();
    assert!(!created.id().is_empty());
    assert_eq!(client.creates.lock().len(), 1);
}

#[tokio::test]
async fn commands_on_unnamed_room_fail() {
    let client = FakeClient::new();
    assert!(matches!(
        Room::unnamed().leave(&*client).await,
        Err(RoomError::Operation { action: "leave", .. })
    ));
}
