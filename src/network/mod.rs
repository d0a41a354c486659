//! Connection Supervisor (spec §4.9): the WebSocket upgrade gateway plus
//! the per-socket event loop it hands connections off to, mirroring the
//! teacher's `network/gateway.rs` + `network/connection.rs` split.

mod connection;
mod gateway;

pub use gateway::{GatewayState, router};
