//! In-process stand-in for the shared bus, used by the integration test
//! suite and by any single-node deployment that has no `redis_url`
//! configured. Mirrors the teacher's `NoOpProvider` (`src/history/noop.rs`)
//! in spirit: same trait, zero external dependencies.

use super::{Bus, Subscriber};
use crate::error::BusError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Default)]
pub struct InMemoryBus {
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
    hashes: Arc<DashMap<String, DashMap<String, String>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        // No subscribers yet is not an error — matches a real pub/sub bus.
        let _ = self.sender_for(channel).send(payload.to_string());
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), BusError> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), BusError> {
        if let Some(map) = self.hashes.get(key) {
            map.remove(field);
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BusError> {
        Ok(match self.hashes.get(key) {
            Some(map) => map.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
            None => HashMap::new(),
        })
    }

    async fn open_subscriber(&self) -> Result<Box<dyn Subscriber>, BusError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Ok(Box::new(InMemorySubscriber {
            bus: self.clone(),
            out_tx: tx,
            out_rx: rx,
            tasks: HashMap::new(),
        }))
    }
}

struct InMemorySubscriber {
    bus: InMemoryBus,
    out_tx: mpsc::Sender<(String, String)>,
    out_rx: mpsc::Receiver<(String, String)>,
    tasks: HashMap<String, JoinHandle<()>>,
}

#[async_trait]
impl Subscriber for InMemorySubscriber {
    async fn subscribe(&mut self, channels: &[String]) -> Result<(), BusError> {
        for channel in channels {
            if self.tasks.contains_key(channel) {
                continue;
            }
            let mut rx = self.bus.sender_for(channel).subscribe();
            let out_tx = self.out_tx.clone();
            let channel_name = channel.clone();
            let handle = tokio::spawn(async move {
                while let Ok(payload) = rx.recv().await {
                    if out_tx.send((channel_name.clone(), payload)).await.is_err() {
                        break;
                    }
                }
            });
            self.tasks.insert(channel.clone(), handle);
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), BusError> {
        for channel in channels {
            if let Some(handle) = self.tasks.remove(channel) {
                handle.abort();
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<(String, String)> {
        self.out_rx.recv().await
    }
}

impl Drop for InMemorySubscriber {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = InMemoryBus::new();
        let mut sub = bus.open_subscriber().await.unwrap();
        sub.subscribe(&["r1".to_string()]).await.unwrap();
        bus.publish("r1", "hello").await.unwrap();
        let (channel, payload) = sub.recv().await.unwrap();
        assert_eq!(channel, "r1");
        assert_eq!(payload, "hello");
    }

    #[tokio::test]
    async fn hash_ops_round_trip() {
        let bus = InMemoryBus::new();
        bus.hset("r1", "conn-a", "2").await.unwrap();
        bus.hset("r1", "conn-b", "3").await.unwrap();
        let all = bus.hgetall("r1").await.unwrap();
        assert_eq!(all.len(), 2);
        bus.hdel("r1", "conn-a").await.unwrap();
        let all = bus.hgetall("r1").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = InMemoryBus::new();
        let mut sub = bus.open_subscriber().await.unwrap();
        sub.subscribe(&["r1".to_string()]).await.unwrap();
        sub.unsubscribe(&["r1".to_string()]).await.unwrap();
        bus.publish("r1", "late").await.unwrap();
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv())
                .await
                .is_err()
        );
    }
}
