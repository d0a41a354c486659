//! Room Lifecycle and Presence scenarios (spec §8 S2, S3, S6).

mod common;

use chatfan::bus::{Subscriber, room_channel, user_channel};
use chatfan::error::ValidationError;
use chatfan::handlers;
use serde_json::json;

#[tokio::test]
async fn create_room_then_invite_fans_out_to_everyone() {
    let matrix = common::build_matrix().await;
    let alice = common::seed_user(&matrix, "alice", 0).await;
    let bob = common::seed_user(&matrix, "bob", 0).await;
    let mut alice_conn = common::new_conn("conn-alice", alice, "alice", 0);

    let mut alice_self = common::subscribe(&matrix, &[&user_channel(alice)]).await;
    let create = json!({ "action": "createRoomChannel", "name": "general" });
    handlers::dispatch_inbound(&matrix, &mut alice_conn, &create).await.unwrap();

    let (_, add_room) = common::next_frame(alice_self.as_mut()).await;
    assert_eq!(add_room["action"], "addRoom");
    assert_eq!(add_room["name"], "general");
    let room_id = add_room["roomId"].as_i64().unwrap();
    assert_eq!(add_room["users"], json!([alice]));

    // Post-process: the creator's own connection subscribes + joins presence.
    handlers::dispatch_post_process(&matrix, &mut alice_conn, &mut NoopSubscriber, &add_room).await;
    assert!(alice_conn.subscribed.contains(&room_channel(room_id)));

    let mut bob_self = common::subscribe(&matrix, &[&user_channel(bob)]).await;
    let mut room_sub = common::subscribe(&matrix, &[&room_channel(room_id)]).await;
    let invite = json!({ "action": "inviteUser", "roomId": room_id, "userId": bob });
    handlers::dispatch_inbound(&matrix, &mut alice_conn, &invite).await.unwrap();

    let (_, bob_invite) = common::next_frame(bob_self.as_mut()).await;
    assert_eq!(bob_invite["action"], "inviteUser");
    assert_eq!(bob_invite["roomId"], room_id);

    let (_, room_broadcast) = common::next_frame(room_sub.as_mut()).await;
    assert_eq!(room_broadcast["action"], "addUserToAll");
    assert_eq!(room_broadcast["userId"], bob);
}

#[tokio::test]
async fn second_tab_presence_is_refresh_only_not_a_second_broadcast() {
    let matrix = common::build_matrix().await;
    let alice = common::seed_user(&matrix, "alice", 0).await;
    let room_id = matrix.db.rooms().create_room(Some("lobby"), false).await.unwrap();
    matrix.db.rooms().create_membership(room_id, alice).await.unwrap();
    let channel = room_channel(room_id);

    let mut conn_a = common::new_conn("conn-a", alice, "alice", 0);
    let mut room_sub = common::subscribe(&matrix, &[&channel]).await;
    chatfan::presence::join_and_announce(&matrix, &mut conn_a, &channel).await.unwrap();

    let (_, login) = common::next_frame(room_sub.as_mut()).await;
    assert_eq!(login["action"], "addOnlineUser");

    let mut conn_b = common::new_conn("conn-b", alice, "alice", 0);
    let mut self_sub = common::subscribe(&matrix, &[&user_channel(alice)]).await;
    chatfan::presence::join_and_announce(&matrix, &mut conn_b, &channel).await.unwrap();

    let (_, refresh) = common::next_frame(self_sub.as_mut()).await;
    assert_eq!(refresh["action"], "setOnlineUsers");

    // No second room-wide broadcast for the second tab.
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(50), room_sub.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn deleting_the_default_room_is_rejected_with_no_write() {
    let matrix = common::build_matrix().await;
    let alice = common::seed_user(&matrix, "alice", 0).await;
    // Fresh `:memory:` db: the first room created gets id 1, matching the
    // default `server.all_room_id` (spec §6).
    let room_id = matrix.db.rooms().create_room(Some("all"), false).await.unwrap();
    assert_eq!(room_id, matrix.config.server.all_room_id);
    matrix.db.rooms().create_membership(room_id, alice).await.unwrap();

    let mut conn = common::new_conn("conn-alice", alice, "alice", 0);
    conn.subscribed.insert(room_channel(room_id));

    let frame = json!({ "action": "deleteRoom", "roomId": room_id });
    let err = handlers::dispatch_inbound(&matrix, &mut conn, &frame).await.expect_err("must be rejected");
    assert!(matches!(err, ValidationError::CannotDeleteDefaultRoom));
}

struct NoopSubscriber;

#[async_trait::async_trait]
impl Subscriber for NoopSubscriber {
    async fn subscribe(&mut self, channels: &[String]) -> Result<(), chatfan::error::BusError> {
        let _ = channels;
        Ok(())
    }
    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), chatfan::error::BusError> {
        let _ = channels;
        Ok(())
    }
    async fn recv(&mut self) -> Option<(String, String)> {
        None
    }
}
