//! Shared server state, mirroring the teacher's `Matrix` (`src/state/mod.rs`,
//! `src/state/matrix.rs`): one cheaply-cloneable handle threaded through
//! every connection task, bundling the collaborators components need.

use crate::auth::SessionStore;
use crate::bus::Bus;
use crate::config::Config;
use crate::db::Database;
use std::sync::Arc;

/// Shared, cheaply-cloneable server state.
#[derive(Clone)]
pub struct Matrix {
    pub db: Database,
    pub bus: Arc<dyn Bus>,
    pub config: Arc<Config>,
    pub session_store: Arc<dyn SessionStore>,
}

impl Matrix {
    pub fn new(
        db: Database,
        bus: Arc<dyn Bus>,
        config: Arc<Config>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        Self { db, bus, config, session_store }
    }
}

/// Volatile, per-socket connection state (spec §3 "Connection state").
pub struct ConnectionState {
    /// Process-unique id, used as the presence hash field key.
    pub connection_id: String,
    pub user_id: i64,
    pub display_name: String,
    pub sex: i64,
    pub client_ip: String,
    /// Channels this socket is currently subscribed to on the bus.
    pub subscribed: std::collections::HashSet<String>,
}

impl ConnectionState {
    pub fn new(connection_id: String, user_id: i64, display_name: String, sex: i64, client_ip: String) -> Self {
        Self {
            connection_id,
            user_id,
            display_name,
            sex,
            client_ip,
            subscribed: std::collections::HashSet::new(),
        }
    }
}
