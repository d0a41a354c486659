//! Shared test fixtures: an in-memory `Matrix` (InMemoryBus + `:memory:`
//! SQLite) plus small helpers for seeding users and reading back frames
//! published to a channel, mirroring the test-tooling note in SPEC_FULL.md
//! §8.

#![allow(dead_code)]

use chatfan::auth::InMemorySessionStore;
use chatfan::bus::{Bus, InMemoryBus, Subscriber};
use chatfan::config::Config;
use chatfan::db::Database;
use chatfan::state::{ConnectionState, Matrix};
use serde_json::Value;
use std::sync::Arc;

pub async fn build_matrix() -> Matrix {
    let db = Database::new(":memory:").await.expect("in-memory db");
    let bus: Arc<dyn Bus> = Arc::new(InMemoryBus::new());
    let config = Arc::new(Config::default());
    let session_store = Arc::new(InMemorySessionStore::new());
    Matrix::new(db, bus, config, session_store)
}

pub async fn seed_user(matrix: &Matrix, username: &str, sex: i64) -> i64 {
    matrix.db.users().create(username, sex).await.expect("seed user")
}

pub fn new_conn(connection_id: &str, user_id: i64, display_name: &str, sex: i64) -> ConnectionState {
    ConnectionState::new(connection_id.to_string(), user_id, display_name.to_string(), sex, "127.0.0.1".to_string())
}

/// Open a subscriber already listening on `channels`. Must be created
/// before the action under test runs, or the frame is missed — pub/sub
/// has no backlog.
pub async fn subscribe(matrix: &Matrix, channels: &[&str]) -> Box<dyn Subscriber> {
    let mut subscriber = matrix.bus.open_subscriber().await.expect("subscriber");
    let channels: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
    subscriber.subscribe(&channels).await.expect("subscribe");
    subscriber
}

/// Pull the next decoded frame off `subscriber`, stripping the `parsable`
/// sentinel prefix if present. Panics if nothing arrives within 200ms.
pub async fn next_frame(subscriber: &mut dyn Subscriber) -> (String, Value) {
    let (channel, payload) = tokio::time::timeout(std::time::Duration::from_millis(200), subscriber.recv())
        .await
        .expect("frame did not arrive")
        .expect("bus closed");
    (channel, chatfan::protocol::decode(&payload).expect("decodable frame").frame)
}
