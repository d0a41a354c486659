//! Bus Adapter (spec §4.2): publish/subscribe and hash-map ops against the
//! shared bus. Modeled as a pluggable trait the same way the teacher models
//! `HistoryProvider` (`src/history/mod.rs`) — one production backend, one
//! trivial backend for tests that need no external service.

mod memory;
mod redis_bus;

pub use memory::InMemoryBus;
pub use redis_bus::RedisBus;

use crate::error::BusError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Per-connection subscriber link (spec §4.2: "Each connection owns an
/// independent subscriber link"). Delivers `(channel, payload)` pairs in
/// arrival order per channel; no ordering guarantee across channels.
#[async_trait]
pub trait Subscriber: Send {
    async fn subscribe(&mut self, channels: &[String]) -> Result<(), BusError>;
    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), BusError>;
    async fn recv(&mut self) -> Option<(String, String)>;
}

/// The shared bus: one process-wide publisher link plus hash-map
/// operations for the presence tracker, and a factory for per-connection
/// subscriber links.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), BusError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<(), BusError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BusError>;
    async fn open_subscriber(&self) -> Result<Box<dyn Subscriber>, BusError>;
}

/// `u<userId>` per-user fan-in channel (spec GLOSSARY).
pub fn user_channel(user_id: i64) -> String {
    format!("u{user_id}")
}

/// `r<roomId>` per-room fan-out channel (spec GLOSSARY). The presence hash
/// for a room shares this exact key.
pub fn room_channel(room_id: i64) -> String {
    format!("r{room_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_naming() {
        assert_eq!(user_channel(7), "u7");
        assert_eq!(room_channel(42), "r42");
    }
}
