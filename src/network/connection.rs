//! Connection Supervisor event loop (spec §4.9): one task per socket,
//! multiplexing the client's WebSocket stream against its bus `Subscriber`
//! link via `tokio::select!`, mirroring the teacher's per-connection
//! actor loop (`network/connection.rs`).

use crate::bus::{room_channel, user_channel};
use crate::handlers;
use crate::ip_enrichment;
use crate::metrics;
use crate::presence;
use crate::protocol::{self, outbound};
use crate::state::{ConnectionState, Matrix};
use crate::telemetry::ActionTraceContext;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

/// Drive one accepted connection from `setRooms` to teardown. Never
/// returns an error: every failure is logged and ends the loop.
pub async fn run(socket: WebSocket, matrix: std::sync::Arc<Matrix>, user_id: i64, client_ip: String) {
    let (mut sink, mut stream) = socket.split();

    let user = match matrix.db.users().get(user_id).await {
        Ok(u) => u,
        Err(e) => {
            warn!(user_id, error = %e, "failed to load user for new connection");
            return;
        }
    };

    let connection_id = Uuid::new_v4().to_string();
    let mut conn = ConnectionState::new(connection_id, user_id, user.username, user.sex, client_ip.clone());

    let mut subscriber = match matrix.bus.open_subscriber().await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to open bus subscriber");
            return;
        }
    };

    let self_channel = user_channel(user_id);
    if let Err(e) = subscriber.subscribe(&[self_channel.clone()]).await {
        warn!(error = %e, "failed to subscribe to self channel");
        return;
    }

    let rooms = match matrix.db.rooms().fetch_rooms_with_users(user_id).await {
        Ok(r) => r,
        Err(e) => {
            warn!(user_id, error = %e, "failed to load rooms for new connection");
            return;
        }
    };

    let set_rooms = json!({
        "action": outbound::SET_ROOMS,
        "rooms": rooms
            .iter()
            .map(|r| json!({
                "roomId": r.room_id,
                "name": r.room_name,
                "users": r.users.iter().map(|(id, name, sex)| json!({
                    "userId": id,
                    "name": name,
                    "sex": matrix.config.gender_label(*sex),
                })).collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
    });
    if send_frame(&mut sink, &set_rooms).await.is_err() {
        return;
    }

    metrics::CONNECTIONS_ACTIVE.inc();

    for room in &rooms {
        let channel = room_channel(room.room_id);
        if let Err(e) = subscriber.subscribe(&[channel.clone()]).await {
            warn!(room_id = room.room_id, error = %e, "failed to subscribe to room channel");
            continue;
        }
        conn.subscribed.insert(channel.clone());
        if let Err(e) = presence::join_and_announce(&matrix, &mut conn, &channel).await {
            warn!(room_id = room.room_id, error = %e, "presence join failed");
        }
    }

    {
        let matrix = matrix.clone();
        let ip = client_ip.clone();
        tokio::spawn(async move {
            ip_enrichment::enrich(&matrix, user_id, &ip).await;
        });
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_frame(&matrix, &mut conn, &mut sink, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            delivery = subscriber.recv() => {
                match delivery {
                    Some((_channel, payload)) => {
                        if !handle_bus_frame(&matrix, &mut conn, &mut *subscriber, &mut sink, &payload).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    teardown(&matrix, &mut conn, &mut *subscriber).await;
    metrics::CONNECTIONS_ACTIVE.dec();
}

async fn handle_client_frame(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    sink: &mut (impl SinkExt<Message> + Unpin),
    text: &str,
) -> bool {
    let Ok(frame) = serde_json::from_str::<serde_json::Value>(text) else {
        return true;
    };

    let action = frame.get("action").and_then(serde_json::Value::as_str).unwrap_or("unknown").to_string();
    let _span = ActionTraceContext::new()
        .with_action(action.clone())
        .with_user_id(conn.user_id)
        .with_connection_id(conn.connection_id.clone())
        .into_span()
        .entered();

    if let Err(e) = handlers::dispatch_inbound(matrix, conn, &frame).await {
        metrics::record_growl(e.error_code());
        let _ = send_frame(sink, &e.to_growl()).await;
    }
    true
}

async fn handle_bus_frame(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    subscriber: &mut dyn crate::bus::Subscriber,
    sink: &mut (impl SinkExt<Message> + Unpin),
    payload: &str,
) -> bool {
    let Some(decoded) = protocol::decode(payload) else {
        warn!("dropping undecodable bus payload");
        return true;
    };

    if send_frame(sink, &decoded.frame).await.is_err() {
        return false;
    }

    if decoded.parsable {
        handlers::dispatch_post_process(matrix, conn, subscriber, &decoded.frame).await;
    }
    true
}

async fn send_frame(sink: &mut (impl SinkExt<Message> + Unpin), frame: &serde_json::Value) -> Result<(), ()> {
    sink.send(Message::Text(frame.to_string())).await.map_err(|_| ())
}

/// Unsubscribe and clear presence for every room this socket joined
/// (spec §4.9 "teardown").
async fn teardown(matrix: &Matrix, conn: &mut ConnectionState, subscriber: &mut dyn crate::bus::Subscriber) {
    let channels: Vec<String> = conn.subscribed.iter().cloned().collect();
    for channel in channels {
        if let Err(e) = presence::leave_and_announce(matrix, conn, &channel).await {
            warn!(channel, error = %e, "presence leave failed during teardown");
        }
        let _ = subscriber.unsubscribe(&[channel.clone()]).await;
        conn.subscribed.remove(&channel);
    }
    let _ = subscriber.unsubscribe(&[user_channel(conn.user_id)]).await;
}
