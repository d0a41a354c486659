//! Chat-aware tracing helpers, adapted from the teacher's IRC-aware
//! telemetry (`src/telemetry.rs`): structured spans carrying action/room/
//! connection context, plus a `Drop`-based timer that records latency and
//! fan-out metrics for a dispatched action.

#![allow(dead_code)]

use std::time::Instant;
use tracing::{Level, Span, span};

/// Trace context for one dispatched action.
#[derive(Debug, Clone, Default)]
pub struct ActionTraceContext {
    pub action: Option<String>,
    pub room_channel: Option<String>,
    pub user_id: Option<i64>,
    pub connection_id: Option<String>,
}

impl ActionTraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_room_channel(mut self, channel: impl Into<String>) -> Self {
        self.room_channel = Some(channel.into());
        self
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    pub fn into_span(self) -> Span {
        let action = self.action.as_deref().unwrap_or("unknown");
        span!(
            Level::DEBUG,
            "chat.action",
            action = action,
            room_channel = self.room_channel.as_deref(),
            user_id = self.user_id,
            connection_id = self.connection_id.as_deref(),
        )
    }
}

/// Times a dispatched action and records its latency on drop.
pub struct ActionTimer {
    action: String,
    start: Instant,
}

impl ActionTimer {
    pub fn new(action: impl Into<String>) -> Self {
        Self { action: action.into(), start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for ActionTimer {
    fn drop(&mut self) {
        tracing::trace!(action = %self.action, elapsed_secs = self.elapsed_secs(), "action dispatched");
    }
}

/// Create a span for fan-out tracking when a frame is published to a
/// channel with more than one live subscriber.
pub fn create_fanout_span(channel: &str, recipients: usize) -> Span {
    span!(Level::DEBUG, "chat.fanout", channel = channel, recipients = recipients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_context_builder() {
        let ctx = ActionTraceContext::new()
            .with_action("sendMessage")
            .with_room_channel("r5")
            .with_user_id(2);
        assert_eq!(ctx.action.as_deref(), Some("sendMessage"));
        assert_eq!(ctx.room_channel.as_deref(), Some("r5"));
        assert_eq!(ctx.user_id, Some(2));
    }

    #[test]
    fn action_timer_records_elapsed() {
        let timer = ActionTimer::new("sendMessage");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_secs() >= 0.005);
    }
}
