//! Codec (spec §4.1): frame (de)serialization to JSON, and the `parsable`
//! server-side prefix discipline that tells a bus listener whether a frame
//! must only be forwarded, or forwarded *and* re-processed locally.

use serde_json::Value;

/// The sentinel byte a marked ("parsable") frame is prefixed with before
/// going out over the bus (spec §4.1, §9 "sentinel-prefix trick").
pub const PARSABLE_PREFIX: u8 = b'p';

/// Serialize a frame for the bus. When `parsable` is set, every receiving
/// Connection Supervisor — including the publisher's own — re-processes
/// the frame through its post-process table after forwarding it.
pub fn encode(frame: &Value, parsable: bool) -> String {
    let json = frame.to_string();
    if parsable {
        let mut out = String::with_capacity(json.len() + 1);
        out.push(PARSABLE_PREFIX as char);
        out.push_str(&json);
        out
    } else {
        json
    }
}

/// The result of decoding a bus payload: the JSON frame to forward to the
/// client, plus whether the post-process table should also run.
pub struct Decoded {
    pub frame: Value,
    pub parsable: bool,
}

/// Decode a bus payload. Unprefixed payloads are plain-forwarded with no
/// post-hook; a payload starting with [`PARSABLE_PREFIX`] has it stripped
/// and is marked for post-processing.
pub fn decode(payload: &str) -> Option<Decoded> {
    let (body, parsable) = match payload.as_bytes().first() {
        Some(&b) if b == PARSABLE_PREFIX => (&payload[1..], true),
        _ => (payload, false),
    };
    serde_json::from_str(body).ok().map(|frame| Decoded { frame, parsable })
}

/// The inbound action names the Message Router dispatches on (spec §4.6).
pub mod inbound {
    pub const GET_MESSAGES: &str = "messages";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const CALL: &str = "call";
    pub const CREATE_DIRECT_CHANNEL: &str = "createDirectChannel";
    pub const CREATE_ROOM_CHANNEL: &str = "createRoomChannel";
    pub const INVITE_USER: &str = "inviteUser";
    pub const DELETE_ROOM: &str = "deleteRoom";
}

/// The outbound/bus action names frames carry (spec §8 literal scenarios).
pub mod outbound {
    pub const LOGIN: &str = "addOnlineUser";
    pub const LOGOUT: &str = "removeOnlineUser";
    pub const REFRESH_USER: &str = "setOnlineUsers";
    pub const PRINT_MESSAGE: &str = "printMessage";
    pub const CALL: &str = "call";
    pub const SET_ROOMS: &str = "setRooms";
    pub const GROWL: &str = "growl";
    pub const GET_MESSAGES: &str = "messages";
    pub const ADD_ROOM: &str = "addRoom";
    pub const ADD_DIRECT_CHANNEL: &str = "addDirectChannel";
    pub const DELETE_ROOM: &str = "deleteRoom";
    pub const INVITE_USER: &str = "inviteUser";
    pub const ADD_USER_TO_ALL: &str = "addUserToAll";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unmarked_round_trip() {
        let frame = json!({"action": "printMessage", "content": "hi"});
        let wire = encode(&frame, false);
        assert!(!wire.starts_with('p'));
        let decoded = decode(&wire).unwrap();
        assert!(!decoded.parsable);
        assert_eq!(decoded.frame, frame);
    }

    #[test]
    fn marked_round_trip() {
        let frame = json!({"action": "addRoom", "roomId": 5});
        let wire = encode(&frame, true);
        assert!(wire.starts_with('p'));
        let decoded = decode(&wire).unwrap();
        assert!(decoded.parsable);
        assert_eq!(decoded.frame, frame);
    }
}
