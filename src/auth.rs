//! Session Authenticator (spec §4.5): resolves a session cookie to a user
//! id on connect. Modeled as a trait so the engine can be exercised without
//! the out-of-scope HTTP login surface (spec §1 "session establishment" is
//! an external collaborator) — mirrors the teacher's pluggable-provider
//! split in `src/history/mod.rs`.

use async_trait::async_trait;
use dashmap::DashMap;

/// Resolves an opaque session id to the authenticated user id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn resolve(&self, session_id: &str) -> Option<i64>;
}

/// In-memory session store: the real deployment's session establishment
/// lives behind the HTTP login surface (out of scope, spec §1); this is
/// what backs it for tests and for a single-node deployment sharing process
/// memory with that surface.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, i64>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: impl Into<String>, user_id: i64) {
        self.sessions.insert(session_id.into(), user_id);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn resolve(&self, session_id: &str) -> Option<i64> {
        self.sessions.get(session_id).map(|v| *v)
    }
}

/// Checks the upgrade request's `Origin` header against its `Host` header
/// (spec §6: "accepts any origin whose host, without port, case-insensitive,
/// matches the Host header host"). Per spec §9 open questions, an empty
/// origin or missing Host defaults to rejection.
pub fn origin_allowed(origin: Option<&str>, host_header: Option<&str>) -> bool {
    let (Some(origin), Some(host_header)) = (origin, host_header) else {
        return false;
    };

    let origin_host = strip_scheme_and_port(origin);
    let host_only = host_header.split(':').next().unwrap_or(host_header);

    origin_host.eq_ignore_ascii_case(host_only)
}

fn strip_scheme_and_port(origin: &str) -> &str {
    let without_scheme = origin.split("://").next_back().unwrap_or(origin);
    without_scheme.split(':').next().unwrap_or(without_scheme)
}

/// Pull `name`'s value out of a raw `Cookie` header (spec §4.5).
pub fn parse_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_session() {
        let store = InMemorySessionStore::new();
        store.insert("abc", 2);
        assert_eq!(store.resolve("abc").await, Some(2));
        assert_eq!(store.resolve("missing").await, None);
    }

    #[test]
    fn origin_matching_ignores_scheme_and_port() {
        assert!(origin_allowed(Some("https://chat.example.com:443"), Some("chat.example.com:8080")));
        assert!(!origin_allowed(Some("https://evil.example.com"), Some("chat.example.com")));
    }

    #[test]
    fn missing_origin_or_host_is_rejected() {
        assert!(!origin_allowed(None, Some("chat.example.com")));
        assert!(!origin_allowed(Some("https://chat.example.com"), None));
    }
}
