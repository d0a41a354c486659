//! Direct-channel create/re-create semantics (spec §4.7, §9).

mod common;

use chatfan::bus::user_channel;
use chatfan::error::ValidationError;
use chatfan::handlers;
use serde_json::json;

#[tokio::test]
async fn creating_a_direct_channel_twice_is_rejected() {
    let matrix = common::build_matrix().await;
    let alice = common::seed_user(&matrix, "alice", 0).await;
    let bob = common::seed_user(&matrix, "bob", 0).await;
    let mut conn = common::new_conn("conn-alice", alice, "alice", 0);

    let mut alice_self = common::subscribe(&matrix, &[&user_channel(alice)]).await;
    let create = json!({ "action": "createDirectChannel", "userId": bob });
    handlers::dispatch_inbound(&matrix, &mut conn, &create).await.unwrap();
    let (_, added) = common::next_frame(alice_self.as_mut()).await;
    assert_eq!(added["action"], "addDirectChannel");

    let err = handlers::dispatch_inbound(&matrix, &mut conn, &create)
        .await
        .expect_err("recreating the same pair's direct room must fail");
    assert!(matches!(err, ValidationError::DirectRoomExists));
}

#[tokio::test]
async fn deleted_direct_channel_can_be_recreated() {
    let matrix = common::build_matrix().await;
    let alice = common::seed_user(&matrix, "alice", 0).await;
    let bob = common::seed_user(&matrix, "bob", 0).await;
    let mut conn = common::new_conn("conn-alice", alice, "alice", 0);

    // Consume room id 1 (the default `server.all_room_id`) so the direct
    // room created below gets a deletable id.
    matrix.db.rooms().create_room(Some("all"), false).await.unwrap();

    let create = json!({ "action": "createDirectChannel", "userId": bob });
    handlers::dispatch_inbound(&matrix, &mut conn, &create).await.unwrap();

    let rooms = matrix.db.rooms().fetch_rooms_with_users(alice).await.unwrap();
    let room_id = rooms[0].room_id;
    conn.subscribed.insert(chatfan::bus::room_channel(room_id));
    let delete = json!({ "action": "deleteRoom", "roomId": room_id });
    handlers::dispatch_inbound(&matrix, &mut conn, &delete).await.unwrap();
    assert!(matrix.db.rooms().is_disabled(room_id).await.unwrap());

    handlers::dispatch_inbound(&matrix, &mut conn, &create)
        .await
        .expect("recreating a disabled direct room should succeed");
    assert!(!matrix.db.rooms().is_disabled(room_id).await.unwrap());
}
