use super::{Database, DbError};
use chrono::Utc;

/// A persisted message row, enough to build either a `printMessage` or a
/// `messages` history frame.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: Option<i64>,
    pub room_id: Option<i64>,
    pub content: String,
    pub created_at_ms: i64,
}

pub struct MessageRepository<'a> {
    db: &'a Database,
}

impl<'a> MessageRepository<'a> {
    pub(super) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a message. Exactly one of `receiver_id`/`room_id` must be set
    /// (spec §3 invariant) — enforced by the caller, the Message Pipeline.
    pub async fn insert(
        &self,
        sender_id: i64,
        receiver_id: Option<i64>,
        room_id: Option<i64>,
        content: &str,
    ) -> Result<MessageRow, DbError> {
        let created_at_ms = Utc::now().timestamp_millis();
        let content = content.to_string();
        let content_for_insert = content.clone();
        let id = self
            .db
            .with_retry(move |pool| {
                let content = content_for_insert.clone();
                async move {
                    let rec = sqlx::query(
                        "INSERT INTO messages (sender_id, receiver_id, room_id, content, created_at_ms) \
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(sender_id)
                    .bind(receiver_id)
                    .bind(room_id)
                    .bind(&content)
                    .bind(created_at_ms)
                    .execute(&pool)
                    .await?;
                    Ok(rec.last_insert_rowid())
                }
            })
            .await?;

        Ok(MessageRow {
            id,
            sender_id,
            receiver_id,
            room_id,
            content,
            created_at_ms,
        })
    }

    /// Fetch up to `limit` messages visible to `visible_to`, optionally
    /// bounded by a strict `id < header_id` (spec §4.3, §8 property 4).
    pub async fn fetch_before(
        &self,
        header_id: Option<i64>,
        limit: i64,
        visible_to: i64,
    ) -> Result<Vec<MessageRow>, DbError> {
        self.db
            .with_retry(move |pool| async move {
                match header_id {
                    Some(header_id) => {
                        sqlx::query_as::<_, MessageRow>(
                            "SELECT id, sender_id, receiver_id, room_id, content, created_at_ms \
                             FROM messages \
                             WHERE (receiver_id IS NULL OR sender_id = ? OR receiver_id = ?) \
                               AND id < ? \
                             ORDER BY id DESC LIMIT ?",
                        )
                        .bind(visible_to)
                        .bind(visible_to)
                        .bind(header_id)
                        .bind(limit)
                        .fetch_all(&pool)
                        .await
                    }
                    None => {
                        sqlx::query_as::<_, MessageRow>(
                            "SELECT id, sender_id, receiver_id, room_id, content, created_at_ms \
                             FROM messages \
                             WHERE (receiver_id IS NULL OR sender_id = ? OR receiver_id = ?) \
                             ORDER BY id DESC LIMIT ?",
                        )
                        .bind(visible_to)
                        .bind(visible_to)
                        .bind(limit)
                        .fetch_all(&pool)
                        .await
                    }
                }
            })
            .await
    }
}
