//! WebSocket upgrade handshake (spec §4.5, §6): origin check against the
//! `Host` header, then session-cookie resolution. Either failure rejects
//! the upgrade with `403 Forbidden` before a socket is ever opened.

use crate::auth::{self};
use crate::network::connection;
use crate::state::Matrix;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

pub type GatewayState = Arc<Matrix>;

pub fn router(matrix: GatewayState) -> Router {
    Router::new()
        .route(&matrix.config.listen.path.clone(), get(upgrade))
        .with_state(matrix)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn upgrade(
    State(matrix): State<GatewayState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let origin = header_str(&headers, "origin");
    let host = header_str(&headers, "host");
    if !auth::origin_allowed(origin, host) {
        warn!(?origin, ?host, "rejected upgrade: origin not allowed");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let cookie_name = &matrix.config.server.session_cookie_name;
    let session_id = header_str(&headers, "cookie").and_then(|raw| auth::parse_cookie(raw, cookie_name));
    let Some(session_id) = session_id else {
        warn!("rejected upgrade: missing session cookie");
        return (StatusCode::FORBIDDEN, "missing session cookie").into_response();
    };

    let Some(user_id) = matrix.session_store.resolve(&session_id).await else {
        warn!("rejected upgrade: unknown or expired session");
        return (StatusCode::FORBIDDEN, "unknown or expired session").into_response();
    };

    let client_ip = remote.ip().to_string();
    ws.on_upgrade(move |socket| connection::run(socket, matrix, user_id, client_ip))
}
