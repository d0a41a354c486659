//! Store Gateway: typed, retry-on-stale-connection access to persistent
//! entities (users, rooms, memberships, messages, IP records).
//!
//! Mirrors the teacher's `Database` + per-entity repository split, but adds
//! the one piece the teacher's SQLite pool never needed: an explicit
//! "retry once on a stale connection" policy (spec §4.3/§9), implemented as
//! a classifier over `sqlx::Error` rather than scattered try/catch.

mod ip;
mod messages;
mod rooms;
mod users;

pub use ip::IpRepository;
pub use messages::{MessageRepository, MessageRow};
pub use rooms::{RoomRepository, RoomWithUsers};
pub use users::{User, UserRepository};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("user not found: {0}")]
    UserNotFound(i64),
    #[error("room not found: {0}")]
    RoomNotFound(i64),
    #[error("already a member")]
    AlreadyMember,
}

fn is_retryable(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut
    )
}

/// Database handle with a connection pool that can be transparently
/// reopened on a stale-connection error. Cloning shares the same pool
/// behind a lock so concurrent callers observe one reconnection, not one
/// each (spec §5: "reopening must be synchronized").
#[derive(Clone)]
pub struct Database {
    pool: Arc<RwLock<SqlitePool>>,
    path: String,
}

impl Database {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = Self::connect(path).await?;
        Self::run_migrations(&pool).await?;
        info!(path = %path, "database connected");
        Ok(Self {
            pool: Arc::new(RwLock::new(pool)),
            path: path.to_string(),
        })
    }

    async fn connect(path: &str) -> Result<SqlitePool, DbError> {
        let options = if path == ":memory:" {
            SqliteConnectOptions::new()
                .filename("file::memory:")
                .shared_cache(true)
                .create_if_missing(true)
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                warn!(path = %parent.display(), error = %e, "failed to create database directory");
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };

        Ok(SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .idle_timeout(Some(Self::IDLE_TIMEOUT))
            .test_before_acquire(true)
            .connect_with(options)
            .await?)
    }

    /// Drop and reopen the underlying pool. Called once by `with_retry`
    /// after a stale-connection error; writers block behind the same lock
    /// readers wait on, so only one reconnection ever happens per failure.
    async fn reconnect(&self) -> Result<(), DbError> {
        let mut guard = self.pool.write().await;
        warn!(path = %self.path, "reconnecting database pool after stale-connection error");
        *guard = Self::connect(&self.path).await?;
        Ok(())
    }

    async fn current_pool(&self) -> SqlitePool {
        self.pool.read().await.clone()
    }

    /// Run `op` against the current pool; on a retryable error, reconnect
    /// once and retry. Any other error propagates immediately.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, DbError>
    where
        F: Fn(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let pool = self.current_pool().await;
        match op(pool).await {
            Ok(v) => Ok(v),
            Err(e) if is_retryable(&e) => {
                self.reconnect().await?;
                let pool = self.current_pool().await;
                Ok(op(pool).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
            )
            .bind(table)
            .fetch_one(pool)
            .await
            .unwrap_or(false)
        }

        let core_tables = [
            "users",
            "rooms",
            "room_members",
            "messages",
            "ip_addresses",
            "user_joined_info",
        ];
        let mut core_ok = true;
        for t in core_tables {
            if !table_exists(pool, t).await {
                core_ok = false;
                break;
            }
        }

        if !core_ok {
            Self::run_migration_file(pool, include_str!("../../migrations/001_init.sql")).await;
            info!("database migrations applied (001_init)");
        } else {
            info!("database already initialized");
        }

        Ok(())
    }

    async fn run_migration_file(pool: &SqlitePool, migration: &str) {
        for statement in migration.split(';') {
            let mut sql_lines: Vec<&str> = Vec::new();
            for line in statement.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with("--") {
                    continue;
                }
                sql_lines.push(line);
            }
            if sql_lines.is_empty() {
                continue;
            }
            let sql = sql_lines.join("\n");
            if let Err(e) = sqlx::query(&sql).execute(pool).await {
                let err_str = e.to_string();
                if !err_str.contains("already exists") {
                    warn!(sql = %sql, error = %e, "migration statement failed");
                }
            }
        }
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(self)
    }

    pub fn rooms(&self) -> RoomRepository<'_> {
        RoomRepository::new(self)
    }

    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(self)
    }

    pub fn ip(&self) -> IpRepository<'_> {
        IpRepository::new(self)
    }
}
