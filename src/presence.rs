//! Presence Tracker (spec §4.4): one bus hash per room, fields = connection
//! ids, values = user ids. Treated as a grow-set keyed by connection id
//! (spec §9 "Presence as CRDT") — writes are idempotent, deletes are by
//! stable key, online-user derivation is a set-projection over values.

use crate::bus::{Bus, user_channel};
use crate::error::BusError;
use crate::protocol::{self, outbound};
use crate::state::{ConnectionState, Matrix};
use serde_json::json;
use std::collections::HashSet;

/// Outcome of a presence join: either a room-wide `LOGIN` broadcast
/// carrying the full online list, or a private refresh for this socket
/// only (multi-tab case — spec §4.4, §8 property 3).
pub enum JoinOutcome {
    Login { online_user_ids: Vec<i64> },
    RefreshOnly { online_user_ids: Vec<i64> },
}

/// Outcome of a presence leave: either a `LOGOUT` broadcast (this was the
/// user's last live connection in the room) or silence.
pub enum LeaveOutcome {
    Logout { online_user_ids: Vec<i64> },
    Silent,
}

fn distinct_user_ids(hash: &std::collections::HashMap<String, String>) -> Vec<i64> {
    hash.values()
        .filter_map(|v| v.parse::<i64>().ok())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}

/// Join `room_channel` as `connection_id` on behalf of `user_id`.
pub async fn join(
    bus: &dyn Bus,
    room_channel: &str,
    connection_id: &str,
    user_id: i64,
) -> Result<JoinOutcome, crate::error::BusError> {
    let before = bus.hgetall(room_channel).await?;
    let already_online = before.values().any(|v| v.parse::<i64>() == Ok(user_id));

    bus.hset(room_channel, connection_id, &user_id.to_string()).await?;
    let after = bus.hgetall(room_channel).await?;
    let online_user_ids = distinct_user_ids(&after);

    if already_online {
        Ok(JoinOutcome::RefreshOnly { online_user_ids })
    } else {
        Ok(JoinOutcome::Login { online_user_ids })
    }
}

/// Leave `room_channel` as `connection_id`, on behalf of `user_id`.
pub async fn leave(
    bus: &dyn Bus,
    room_channel: &str,
    connection_id: &str,
    user_id: i64,
) -> Result<LeaveOutcome, crate::error::BusError> {
    bus.hdel(room_channel, connection_id).await?;
    let remaining = bus.hgetall(room_channel).await?;
    let still_online = remaining.values().any(|v| v.parse::<i64>() == Ok(user_id));

    if still_online {
        Ok(LeaveOutcome::Silent)
    } else {
        Ok(LeaveOutcome::Logout {
            online_user_ids: distinct_user_ids(&remaining),
        })
    }
}

/// Join `room_channel` and publish whatever the outcome requires: a room
/// broadcast on first login, or a private refresh on every later tab.
pub async fn join_and_announce(
    matrix: &Matrix,
    conn: &mut ConnectionState,
    room_channel: &str,
) -> Result<(), BusError> {
    let outcome = join(matrix.bus.as_ref(), room_channel, &conn.connection_id, conn.user_id).await?;
    match outcome {
        JoinOutcome::Login { online_user_ids } => {
            crate::metrics::LOGINS.inc();
            let frame = json!({
                "action": outbound::LOGIN,
                "content": online_user_ids,
                "channel": room_channel,
            });
            matrix
                .bus
                .publish(room_channel, &protocol::encode(&frame, false))
                .await?;
        }
        JoinOutcome::RefreshOnly { online_user_ids } => {
            let frame = json!({
                "action": outbound::REFRESH_USER,
                "content": online_user_ids,
                "channel": room_channel,
            });
            let self_channel = user_channel(conn.user_id);
            matrix
                .bus
                .publish(&self_channel, &protocol::encode(&frame, false))
                .await?;
        }
    }
    Ok(())
}

/// Leave `room_channel` and publish a `LOGOUT` broadcast iff this was the
/// user's last live connection in the room.
pub async fn leave_and_announce(
    matrix: &Matrix,
    conn: &ConnectionState,
    room_channel: &str,
) -> Result<(), BusError> {
    let outcome = leave(matrix.bus.as_ref(), room_channel, &conn.connection_id, conn.user_id).await?;
    if let LeaveOutcome::Logout { online_user_ids } = outcome {
        crate::metrics::LOGOUTS.inc();
        let frame = json!({
            "action": outbound::LOGOUT,
            "content": online_user_ids,
            "channel": room_channel,
        });
        matrix
            .bus
            .publish(room_channel, &protocol::encode(&frame, false))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    #[tokio::test]
    async fn second_tab_is_refresh_only() {
        let bus = InMemoryBus::new();
        let outcome = join(&bus, "r5", "conn-a", 2).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Login { .. }));

        let outcome = join(&bus, "r5", "conn-b", 2).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::RefreshOnly { .. }));
    }

    #[tokio::test]
    async fn logout_only_on_last_tab() {
        let bus = InMemoryBus::new();
        join(&bus, "r5", "conn-a", 2).await.unwrap();
        join(&bus, "r5", "conn-b", 2).await.unwrap();

        let outcome = leave(&bus, "r5", "conn-a", 2).await.unwrap();
        assert!(matches!(outcome, LeaveOutcome::Silent));

        let outcome = leave(&bus, "r5", "conn-b", 2).await.unwrap();
        assert!(matches!(outcome, LeaveOutcome::Logout { .. }));
    }
}
