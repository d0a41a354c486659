//! Prometheus metrics (SPEC_FULL §4.11), mirroring the teacher's
//! `lazy_static!` registry + `gather_metrics()` pattern (`src/metrics.rs`).

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref CONNECTIONS_ACTIVE: IntGauge =
        IntGauge::new("chat_connections_active", "Open client connections").unwrap();

    pub static ref MESSAGES_SENT: IntCounter =
        IntCounter::new("chat_messages_sent_total", "Messages persisted and published").unwrap();

    pub static ref MESSAGES_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("chat_messages_rejected_total", "Messages rejected by reason"),
        &["reason"],
    )
    .unwrap();

    pub static ref ROOMS_CREATED: IntCounter =
        IntCounter::new("chat_rooms_created_total", "Rooms created (public + direct)").unwrap();

    pub static ref LOGINS: IntCounter =
        IntCounter::new("chat_logins_total", "Presence LOGIN broadcasts").unwrap();

    pub static ref LOGOUTS: IntCounter =
        IntCounter::new("chat_logouts_total", "Presence LOGOUT broadcasts").unwrap();

    pub static ref GROWLS: IntCounter =
        IntCounter::new("chat_growls_total", "Validation errors surfaced as growl frames").unwrap();
}

/// Register every metric. Must be called once at startup before any
/// metric is recorded.
pub fn init() {
    REGISTRY.register(Box::new(CONNECTIONS_ACTIVE.clone())).unwrap();
    REGISTRY.register(Box::new(MESSAGES_SENT.clone())).unwrap();
    REGISTRY.register(Box::new(MESSAGES_REJECTED.clone())).unwrap();
    REGISTRY.register(Box::new(ROOMS_CREATED.clone())).unwrap();
    REGISTRY.register(Box::new(LOGINS.clone())).unwrap();
    REGISTRY.register(Box::new(LOGOUTS.clone())).unwrap();
    REGISTRY.register(Box::new(GROWLS.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

pub fn record_growl(error_code: &str) {
    GROWLS.inc();
    MESSAGES_REJECTED.with_label_values(&[error_code]).inc();
}
