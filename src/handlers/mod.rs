//! Message Router (spec §4.6): two tables, pre-process (inbound client
//! action → handler) and post-process (action on a looped-back marked
//! frame → local bookkeeping handler). Modeled as an explicit dispatch
//! function per table rather than the teacher's `Box<dyn Handler>` registry
//! (`src/handlers/core/registry.rs`) — the action set here is small and
//! closed, so a match is the direct, faithful translation of that registry
//! idiom onto a fixed table.

mod messages;
mod rooms;

use crate::bus::Subscriber;
use crate::error::ValidationError;
use crate::protocol::{inbound, outbound};
use crate::state::{ConnectionState, Matrix};
use serde_json::Value;
use tracing::warn;

/// Dispatch one inbound client frame. Any `Err` is converted to a `growl`
/// by the caller (spec §4.9) and never closes the socket.
pub async fn dispatch_inbound(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    frame: &Value,
) -> Result<(), ValidationError> {
    let action = frame
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ValidationError::EmptyPayload)?;

    match action {
        inbound::GET_MESSAGES => messages::handle_get_messages(matrix, conn, frame).await,
        inbound::SEND_MESSAGE => messages::handle_send_message(matrix, conn, frame).await,
        inbound::CALL => messages::handle_call(matrix, conn, frame).await,
        inbound::CREATE_ROOM_CHANNEL => rooms::handle_create_room_channel(matrix, conn, frame).await,
        inbound::CREATE_DIRECT_CHANNEL => rooms::handle_create_direct_channel(matrix, conn, frame).await,
        inbound::INVITE_USER => rooms::handle_invite_user(matrix, conn, frame).await,
        inbound::DELETE_ROOM => rooms::handle_delete_room(matrix, conn, frame).await,
        other => Err(ValidationError::UnknownAction(other.to_string())),
    }
}

/// Dispatch a looped-back marked ("parsable") frame's post-process hook.
/// Failures here are logged, not surfaced — the frame has already been
/// forwarded to the client regardless (spec §9 "forwards payload and
/// dispatches a local state-mutation handler").
pub async fn dispatch_post_process(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    subscriber: &mut dyn Subscriber,
    frame: &Value,
) {
    let Some(action) = frame.get("action").and_then(Value::as_str) else {
        return;
    };

    let result = match action {
        outbound::ADD_ROOM => rooms::post_create_room_channel(conn, subscriber, matrix, frame).await,
        outbound::ADD_DIRECT_CHANNEL => rooms::post_create_direct_channel(conn, subscriber, matrix, frame).await,
        outbound::INVITE_USER => rooms::post_invite_user(conn, subscriber, matrix, frame).await,
        outbound::DELETE_ROOM => rooms::post_delete_room(conn, subscriber, matrix, frame).await,
        _ => Ok(()),
    };

    if let Err(e) = result {
        warn!(action, error = %e, "post-process handler failed");
    }
}
