//! Message Pipeline (spec §4.8) and the two other request-shaped actions
//! the Message Router owns: `GET_MESSAGES` history lookup and `CALL`
//! signaling passthrough.

use crate::error::ValidationError;
use crate::protocol::outbound;
use crate::state::{ConnectionState, Matrix};
use serde_json::{Value, json};

fn str_field<'a>(frame: &'a Value, name: &str) -> Option<&'a str> {
    frame.get(name).and_then(Value::as_str)
}

fn i64_field(frame: &Value, name: &str) -> Option<i64> {
    frame.get(name).and_then(Value::as_i64)
}

/// `GET_MESSAGES {headerId?, count=10}` (spec §4.6, §4.3, §8 property 4).
pub async fn handle_get_messages(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    frame: &Value,
) -> Result<(), ValidationError> {
    let header_id = i64_field(frame, "headerId");
    let count = i64_field(frame, "count").unwrap_or(10);

    let rows = matrix
        .db
        .messages()
        .fetch_before(header_id, count, conn.user_id)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?;

    let content: Vec<Value> = rows
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "userId": m.sender_id,
                "content": m.content,
                "time": m.created_at_ms,
                "receiverId": m.receiver_id,
                "roomId": m.room_id,
            })
        })
        .collect();

    let frame = json!({ "action": outbound::GET_MESSAGES, "content": content });
    let self_channel = crate::bus::user_channel(conn.user_id);
    matrix
        .bus
        .publish(&self_channel, &crate::protocol::encode(&frame, false))
        .await
        .ok();
    Ok(())
}

/// `SEND_MESSAGE {content, channel, receiverId?, image?}` (spec §4.8).
pub async fn handle_send_message(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    frame: &Value,
) -> Result<(), ValidationError> {
    let content = str_field(frame, "content").ok_or(ValidationError::EmptyPayload)?;
    let channel = str_field(frame, "channel").ok_or(ValidationError::EmptyPayload)?;
    let image = str_field(frame, "image");

    let (kind, target_id_str) = channel.split_at(1);
    let target_id: i64 = target_id_str
        .parse()
        .map_err(|_| ValidationError::AccessDenied(channel.to_string()))?;

    let (receiver_id, room_id) = match kind {
        "u" => (Some(target_id), None),
        "r" => {
            if !conn.subscribed.contains(channel) {
                return Err(ValidationError::AccessDenied(channel.to_string()));
            }
            (None, Some(target_id))
        }
        _ => return Err(ValidationError::AccessDenied(channel.to_string())),
    };

    let row = matrix
        .db
        .messages()
        .insert(conn.user_id, receiver_id, room_id, content)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?;

    crate::metrics::MESSAGES_SENT.inc();

    let mut out = json!({
        "action": outbound::PRINT_MESSAGE,
        "userId": row.sender_id,
        "content": row.content,
        "time": row.created_at_ms,
        "id": row.id,
        "channel": channel,
    });
    if let Some(image) = image {
        out["image"] = json!(image);
    }

    let payload = crate::protocol::encode(&out, false);

    if let Some(room_id) = room_id {
        let _ = room_id; // already encoded in `channel`
        matrix.bus.publish(channel, &payload).await.ok();
        return Ok(());
    }

    // Direct message: attach receiver identity for the recipient's UI.
    if let Some(receiver_id) = receiver_id {
        let mut out = out.clone();
        out["receiverId"] = json!(receiver_id);
        if let Ok(receiver) = matrix.db.users().get(receiver_id).await {
            out["receiverName"] = json!(receiver.username);
        }
        let payload = crate::protocol::encode(&out, false);

        let self_channel = crate::bus::user_channel(conn.user_id);
        matrix.bus.publish(&self_channel, &payload).await.ok();

        if receiver_id != conn.user_id {
            let receiver_channel = crate::bus::user_channel(receiver_id);
            matrix.bus.publish(&receiver_channel, &payload).await.ok();
        }
    }

    Ok(())
}

/// `CALL {receiverId, content, type}` — published, never persisted.
pub async fn handle_call(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    frame: &Value,
) -> Result<(), ValidationError> {
    let receiver_id = i64_field(frame, "receiverId").ok_or(ValidationError::EmptyPayload)?;
    let content = frame.get("content").cloned().unwrap_or(Value::Null);
    let call_type = str_field(frame, "type").unwrap_or("offer");

    let out = json!({
        "action": outbound::CALL,
        "userId": conn.user_id,
        "content": content,
        "type": call_type,
    });

    let channel = crate::bus::user_channel(receiver_id);
    matrix
        .bus
        .publish(&channel, &crate::protocol::encode(&out, false))
        .await
        .ok();
    Ok(())
}
