//! Unified error handling for the chat fan-out engine.
//!
//! Mirrors the teacher's split: a `thiserror` enum per layer, each with an
//! `error_code()` for metrics labeling and a reply-construction method that
//! turns an error into a client-visible frame (or `None` when the error has
//! no business reaching the browser).

use serde_json::{Value, json};
use thiserror::Error;

/// Errors raised while validating and routing an inbound client action.
///
/// These never disconnect the client — per the shared-bus design, a bad
/// action always yields a `growl` frame back to the sender and processing
/// continues.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("access denied for channel {0}")]
    AccessDenied(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("empty payload")]
    EmptyPayload,

    #[error("room name too long (max {max} characters)")]
    RoomNameTooLong { max: usize },

    #[error("user is already in channel")]
    AlreadyMember,

    #[error("cannot delete the default room")]
    CannotDeleteDefaultRoom,

    #[error("room is already deleted")]
    RoomAlreadyDeleted,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("direct channel already exists")]
    DirectRoomExists,

    #[error("cannot invite to a direct channel")]
    CannotInviteToDirectRoom,
}

impl ValidationError {
    /// Static error code for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AccessDenied(_) => "access_denied",
            Self::UnknownAction(_) => "unknown_action",
            Self::EmptyPayload => "empty_payload",
            Self::RoomNameTooLong { .. } => "room_name_too_long",
            Self::AlreadyMember => "already_member",
            Self::CannotDeleteDefaultRoom => "cannot_delete_default_room",
            Self::RoomAlreadyDeleted => "room_already_deleted",
            Self::NotFound(_) => "not_found",
            Self::DirectRoomExists => "direct_room_exists",
            Self::CannotInviteToDirectRoom => "cannot_invite_to_direct_room",
        }
    }

    /// Render as a `growl` frame body, the only client-visible shape an
    /// action-layer error ever takes.
    pub fn to_growl(&self) -> Value {
        json!({ "action": "growl", "content": self.to_string() })
    }
}

/// Errors surfaced by the Session Authenticator / upgrade handshake.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing session cookie")]
    MissingCookie,

    #[error("unknown or expired session")]
    UnknownSession,

    #[error("origin not allowed: {0}")]
    OriginRejected(String),
}

impl AuthError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingCookie => "missing_cookie",
            Self::UnknownSession => "unknown_session",
            Self::OriginRejected(_) => "origin_rejected",
        }
    }
}

/// Errors surfaced by the shared bus adapter (Redis in production, an
/// in-memory stand-in in tests).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connection error: {0}")]
    Connection(String),

    #[error("bus publish failed: {0}")]
    Publish(String),

    #[error("bus operation failed: {0}")]
    Other(String),
}

impl BusError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "bus_connection",
            Self::Publish(_) => "bus_publish",
            Self::Other(_) => "bus_other",
        }
    }
}

// DbError lives in db/mod.rs, next to sqlx, the same way the teacher keeps
// its database error variants next to the pool that produces them.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_codes() {
        assert_eq!(ValidationError::EmptyPayload.error_code(), "empty_payload");
        assert_eq!(
            ValidationError::AccessDenied("r1".into()).error_code(),
            "access_denied"
        );
    }

    #[test]
    fn validation_error_growl_shape() {
        let growl = ValidationError::AccessDenied("r1".into()).to_growl();
        assert_eq!(growl["action"], "growl");
        assert!(growl["content"].as_str().unwrap().contains("r1"));
    }

    #[test]
    fn bus_error_codes() {
        assert_eq!(
            BusError::Connection("refused".into()).error_code(),
            "bus_connection"
        );
    }
}
