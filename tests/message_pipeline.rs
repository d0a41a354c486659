//! Message Pipeline scenarios (spec §8 S1, S4, S5).

mod common;

use chatfan::bus::{room_channel, user_channel};
use chatfan::error::ValidationError;
use chatfan::handlers;
use serde_json::json;

#[tokio::test]
async fn direct_message_reaches_both_parties() {
    let matrix = common::build_matrix().await;
    let alice = common::seed_user(&matrix, "alice", 0).await;
    let bob = common::seed_user(&matrix, "bob", 0).await;

    let mut alice_conn = common::new_conn("conn-alice", alice, "alice", 0);
    let mut bob_sub = common::subscribe(&matrix, &[&user_channel(bob)]).await;
    let mut alice_sub = common::subscribe(&matrix, &[&user_channel(alice)]).await;

    let frame = json!({
        "action": "sendMessage",
        "content": "hi",
        "channel": user_channel(bob),
    });
    handlers::dispatch_inbound(&matrix, &mut alice_conn, &frame)
        .await
        .expect("send should succeed");

    let (_, bob_frame) = common::next_frame(bob_sub.as_mut()).await;
    assert_eq!(bob_frame["action"], "printMessage");
    assert_eq!(bob_frame["userId"], alice);
    assert_eq!(bob_frame["content"], "hi");
    assert_eq!(bob_frame["receiverId"], bob);
    assert_eq!(bob_frame["receiverName"], "bob");

    let (_, alice_frame) = common::next_frame(alice_sub.as_mut()).await;
    assert_eq!(alice_frame["action"], "printMessage");
    assert_eq!(alice_frame["content"], "hi");
}

#[tokio::test]
async fn sending_to_unsubscribed_room_is_access_denied_with_no_write() {
    let matrix = common::build_matrix().await;
    let alice = common::seed_user(&matrix, "alice", 0).await;
    let mut alice_conn = common::new_conn("conn-alice", alice, "alice", 0);

    let frame = json!({
        "action": "sendMessage",
        "content": "hi",
        "channel": room_channel(99),
    });
    let err = handlers::dispatch_inbound(&matrix, &mut alice_conn, &frame)
        .await
        .expect_err("should be rejected");
    assert!(matches!(err, ValidationError::AccessDenied(_)));
    assert_eq!(err.to_growl()["action"], "growl");

    let history = matrix
        .db
        .messages()
        .fetch_before(None, 10, alice)
        .await
        .expect("history query");
    assert!(history.is_empty());
}

#[tokio::test]
async fn get_messages_returns_descending_page_below_header_id() {
    let matrix = common::build_matrix().await;
    let alice = common::seed_user(&matrix, "alice", 0).await;
    let room_id = matrix.db.rooms().create_room(Some("general"), false).await.unwrap();
    matrix.db.rooms().create_membership(room_id, alice).await.unwrap();
    let mut conn = common::new_conn("conn-alice", alice, "alice", 0);
    conn.subscribed.insert(room_channel(room_id));

    let mut ids = Vec::new();
    for i in 0..5 {
        let frame = json!({
            "action": "sendMessage",
            "content": format!("msg-{i}"),
            "channel": room_channel(room_id),
        });
        handlers::dispatch_inbound(&matrix, &mut conn, &frame).await.unwrap();
    }
    let all = matrix.db.messages().fetch_before(None, 10, alice).await.unwrap();
    for m in &all {
        ids.push(m.id);
    }
    let header_id = *ids.iter().max().unwrap();

    let mut sub = common::subscribe(&matrix, &[&user_channel(alice)]).await;
    let frame = json!({ "action": "messages", "headerId": header_id, "count": 3 });
    handlers::dispatch_inbound(&matrix, &mut conn, &frame).await.unwrap();

    let (_, reply) = common::next_frame(sub.as_mut()).await;
    assert_eq!(reply["action"], "messages");
    let content = reply["content"].as_array().unwrap();
    assert_eq!(content.len(), 3);
    let returned_ids: Vec<i64> = content.iter().map(|m| m["id"].as_i64().unwrap()).collect();
    assert!(returned_ids.windows(2).all(|w| w[0] > w[1]));
    assert!(returned_ids.iter().all(|id| *id < header_id));
}
