//! Room Lifecycle (spec §4.7): create/delete/invite for public and direct
//! rooms, plus the post-process half of each action that runs when the
//! marked frame loops back off the bus.

use crate::bus::{Subscriber, room_channel, user_channel};
use crate::error::ValidationError;
use crate::presence;
use crate::protocol::{self, outbound};
use crate::state::{ConnectionState, Matrix};
use serde_json::{Value, json};

const MAX_ROOM_NAME_LEN: usize = 16;

fn str_field<'a>(frame: &'a Value, name: &str) -> Option<&'a str> {
    frame.get(name).and_then(Value::as_str)
}

fn i64_field(frame: &Value, name: &str) -> Option<i64> {
    frame.get(name).and_then(Value::as_i64)
}

/// `CREATE_ROOM_CHANNEL {name}`.
pub async fn handle_create_room_channel(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    frame: &Value,
) -> Result<(), ValidationError> {
    let name = str_field(frame, "name").unwrap_or("");
    if name.is_empty() || name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(ValidationError::RoomNameTooLong { max: MAX_ROOM_NAME_LEN });
    }

    let room_id = matrix
        .db
        .rooms()
        .create_room(Some(name), false)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?;
    matrix
        .db
        .rooms()
        .create_membership(room_id, conn.user_id)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?;
    crate::metrics::ROOMS_CREATED.inc();

    let out = json!({
        "action": outbound::ADD_ROOM,
        "roomId": room_id,
        "name": name,
        "users": [conn.user_id],
    });
    let self_channel = user_channel(conn.user_id);
    matrix
        .bus
        .publish(&self_channel, &protocol::encode(&out, true))
        .await
        .ok();
    Ok(())
}

pub async fn post_create_room_channel(
    conn: &mut ConnectionState,
    subscriber: &mut dyn Subscriber,
    matrix: &Matrix,
    frame: &Value,
) -> Result<(), crate::error::BusError> {
    let Some(room_id) = i64_field(frame, "roomId") else {
        return Ok(());
    };
    subscribe_and_join(conn, subscriber, matrix, room_id).await
}

/// `CREATE_DIRECT_CHANNEL {userId}` (spec §4.7, §8 property 6).
pub async fn handle_create_direct_channel(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    frame: &Value,
) -> Result<(), ValidationError> {
    let other = i64_field(frame, "userId").ok_or(ValidationError::EmptyPayload)?;
    let self_id = conn.user_id;

    let room_id = match matrix
        .db
        .rooms()
        .find_direct_room(self_id, other)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?
    {
        Some(lookup) if !lookup.disabled => return Err(ValidationError::DirectRoomExists),
        Some(lookup) => {
            matrix
                .db
                .rooms()
                .undisable(lookup.room_id)
                .await
                .map_err(|e| ValidationError::NotFound(e.to_string()))?;
            lookup.room_id
        }
        None => {
            let room_id = matrix
                .db
                .rooms()
                .create_room(None, true)
                .await
                .map_err(|e| ValidationError::NotFound(e.to_string()))?;
            matrix
                .db
                .rooms()
                .create_membership(room_id, self_id)
                .await
                .map_err(|e| ValidationError::NotFound(e.to_string()))?;
            if other != self_id {
                matrix
                    .db
                    .rooms()
                    .create_membership(room_id, other)
                    .await
                    .map_err(|e| ValidationError::NotFound(e.to_string()))?;
            }
            crate::metrics::ROOMS_CREATED.inc();
            room_id
        }
    };

    let out = json!({ "action": outbound::ADD_DIRECT_CHANNEL, "roomId": room_id, "name": Value::Null });
    let payload = protocol::encode(&out, true);
    let self_channel = user_channel(self_id);
    matrix.bus.publish(&self_channel, &payload).await.ok();
    if other != self_id {
        let other_channel = user_channel(other);
        matrix.bus.publish(&other_channel, &payload).await.ok();
    }
    Ok(())
}

pub async fn post_create_direct_channel(
    conn: &mut ConnectionState,
    subscriber: &mut dyn Subscriber,
    matrix: &Matrix,
    frame: &Value,
) -> Result<(), crate::error::BusError> {
    let Some(room_id) = i64_field(frame, "roomId") else {
        return Ok(());
    };
    subscribe_and_join(conn, subscriber, matrix, room_id).await
}

/// `INVITE_USER {roomId, userId}`.
pub async fn handle_invite_user(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    frame: &Value,
) -> Result<(), ValidationError> {
    let room_id = i64_field(frame, "roomId").ok_or(ValidationError::EmptyPayload)?;
    let invited_id = i64_field(frame, "userId").ok_or(ValidationError::EmptyPayload)?;
    let channel = room_channel(room_id);

    if !conn.subscribed.contains(&channel) {
        return Err(ValidationError::AccessDenied(channel));
    }
    if matrix
        .db
        .rooms()
        .is_direct(room_id)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?
    {
        return Err(ValidationError::CannotInviteToDirectRoom);
    }

    matrix
        .db
        .rooms()
        .create_membership(room_id, invited_id)
        .await
        .map_err(|e| match e {
            crate::db::DbError::AlreadyMember => ValidationError::AlreadyMember,
            other => ValidationError::NotFound(other.to_string()),
        })?;

    let invited = matrix
        .db
        .users()
        .get(invited_id)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?;

    let broadcast = json!({
        "action": outbound::ADD_USER_TO_ALL,
        "channel": channel,
        "userId": invited_id,
        "name": invited.username,
        "sex": matrix.config.gender_label(invited.sex),
    });
    matrix
        .bus
        .publish(&channel, &protocol::encode(&broadcast, false))
        .await
        .ok();

    let room_name = matrix
        .db
        .rooms()
        .name(room_id)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?;
    let invite = json!({
        "action": outbound::INVITE_USER,
        "roomId": room_id,
        "name": room_name,
        "content": { "roomId": room_id, "name": room_name },
    });
    let invited_channel = user_channel(invited_id);
    matrix
        .bus
        .publish(&invited_channel, &protocol::encode(&invite, true))
        .await
        .ok();
    Ok(())
}

pub async fn post_invite_user(
    conn: &mut ConnectionState,
    subscriber: &mut dyn Subscriber,
    matrix: &Matrix,
    frame: &Value,
) -> Result<(), crate::error::BusError> {
    let Some(room_id) = i64_field(frame, "roomId") else {
        return Ok(());
    };
    subscribe_and_join(conn, subscriber, matrix, room_id).await
}

/// `DELETE_ROOM {roomId}`.
pub async fn handle_delete_room(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    frame: &Value,
) -> Result<(), ValidationError> {
    let room_id = i64_field(frame, "roomId").ok_or(ValidationError::EmptyPayload)?;
    let channel = room_channel(room_id);

    if !conn.subscribed.contains(&channel) {
        return Err(ValidationError::AccessDenied(channel));
    }
    if room_id == matrix.config.server.all_room_id {
        return Err(ValidationError::CannotDeleteDefaultRoom);
    }
    if matrix
        .db
        .rooms()
        .is_disabled(room_id)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?
    {
        return Err(ValidationError::RoomAlreadyDeleted);
    }

    let is_direct = matrix
        .db
        .rooms()
        .is_direct(room_id)
        .await
        .map_err(|e| ValidationError::NotFound(e.to_string()))?;

    if is_direct {
        matrix
            .db
            .rooms()
            .disable(room_id)
            .await
            .map_err(|e| ValidationError::NotFound(e.to_string()))?;
    } else {
        matrix
            .db
            .rooms()
            .delete_member(room_id, conn.user_id)
            .await
            .map_err(|e| ValidationError::NotFound(e.to_string()))?;
        presence::leave_and_announce(matrix, conn, &channel)
            .await
            .ok();
    }

    let out = json!({ "action": outbound::DELETE_ROOM, "roomId": room_id });
    matrix
        .bus
        .publish(&channel, &protocol::encode(&out, true))
        .await
        .ok();
    Ok(())
}

pub async fn post_delete_room(
    conn: &mut ConnectionState,
    subscriber: &mut dyn Subscriber,
    matrix: &Matrix,
    frame: &Value,
) -> Result<(), crate::error::BusError> {
    let Some(room_id) = i64_field(frame, "roomId") else {
        return Ok(());
    };
    let channel = room_channel(room_id);
    subscriber.unsubscribe(&[channel.clone()]).await?;
    conn.subscribed.remove(&channel);
    matrix.bus.hdel(&channel, &conn.connection_id).await?;
    Ok(())
}

async fn subscribe_and_join(
    conn: &mut ConnectionState,
    subscriber: &mut dyn Subscriber,
    matrix: &Matrix,
    room_id: i64,
) -> Result<(), crate::error::BusError> {
    let channel = room_channel(room_id);
    subscriber.subscribe(&[channel.clone()]).await?;
    conn.subscribed.insert(channel.clone());
    presence::join_and_announce(matrix, conn, &channel).await
}
