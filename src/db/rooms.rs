use super::{Database, DbError};
use std::collections::BTreeMap;

/// One room the user belongs to, with every other member's profile —
/// the shape the Connection Supervisor needs to build the `setRooms` frame
/// (spec §4.9).
#[derive(Debug, Clone)]
pub struct RoomWithUsers {
    pub room_id: i64,
    pub room_name: Option<String>,
    pub users: Vec<(i64, String, i64)>,
}

/// `(room_id, disabled)` pair returned by the direct-room lookup query
/// (spec §4.3, §4.7 "create direct room").
pub struct DirectRoomLookup {
    pub room_id: i64,
    pub disabled: bool,
}

pub struct RoomRepository<'a> {
    db: &'a Database,
}

impl<'a> RoomRepository<'a> {
    pub(super) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a public room (name set) or a direct room (name = None).
    pub async fn create_room(&self, name: Option<&str>, is_direct: bool) -> Result<i64, DbError> {
        self.db
            .with_retry(move |pool| async move {
                let rec = sqlx::query(
                    "INSERT INTO rooms (name, is_direct, disabled) VALUES (?, ?, 0)",
                )
                .bind(name)
                .bind(is_direct)
                .execute(&pool)
                .await?;
                Ok(rec.last_insert_rowid())
            })
            .await
    }

    /// The dedicated join used by "create direct room" (spec §4.7): finds
    /// an existing direct room between exactly this pair of users.
    pub async fn find_direct_room(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<Option<DirectRoomLookup>, DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query_as::<_, (i64, bool)>(
                    "SELECT r.id, r.disabled FROM rooms r \
                     JOIN room_members m1 ON m1.room_id = r.id AND m1.user_id = ? \
                     JOIN room_members m2 ON m2.room_id = r.id AND m2.user_id = ? \
                     WHERE r.is_direct = 1 \
                     LIMIT 1",
                )
                .bind(user_a)
                .bind(user_b)
                .fetch_optional(&pool)
                .await
            })
            .await
            .map(|opt| {
                opt.map(|(room_id, disabled)| DirectRoomLookup { room_id, disabled })
            })
    }

    pub async fn undisable(&self, room_id: i64) -> Result<(), DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query("UPDATE rooms SET disabled = 0 WHERE id = ?")
                    .bind(room_id)
                    .execute(&pool)
                    .await
            })
            .await?;
        Ok(())
    }

    pub async fn disable(&self, room_id: i64) -> Result<(), DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query("UPDATE rooms SET disabled = 1 WHERE id = ?")
                    .bind(room_id)
                    .execute(&pool)
                    .await
            })
            .await?;
        Ok(())
    }

    pub async fn is_disabled(&self, room_id: i64) -> Result<bool, DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query_scalar::<_, bool>("SELECT disabled FROM rooms WHERE id = ?")
                    .bind(room_id)
                    .fetch_one(&pool)
                    .await
            })
            .await
    }

    pub async fn is_direct(&self, room_id: i64) -> Result<bool, DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query_scalar::<_, bool>("SELECT is_direct FROM rooms WHERE id = ?")
                    .bind(room_id)
                    .fetch_one(&pool)
                    .await
            })
            .await
    }

    pub async fn name(&self, room_id: i64) -> Result<Option<String>, DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query_scalar::<_, Option<String>>("SELECT name FROM rooms WHERE id = ?")
                    .bind(room_id)
                    .fetch_one(&pool)
                    .await
            })
            .await
    }

    /// Insert a membership row; maps the unique-constraint violation to
    /// `DbError::AlreadyMember` (spec §3: "Adding an existing pair fails
    /// with a uniqueness violation").
    pub async fn create_membership(&self, room_id: i64, user_id: i64) -> Result<(), DbError> {
        let result = self
            .db
            .with_retry(move |pool| async move {
                sqlx::query("INSERT INTO room_members (room_id, user_id) VALUES (?, ?)")
                    .bind(room_id)
                    .bind(user_id)
                    .execute(&pool)
                    .await
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(DbError::Sqlx(sqlx::Error::Database(db_err)))
                if db_err.message().contains("UNIQUE constraint failed") =>
            {
                Err(DbError::AlreadyMember)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn is_member(&self, room_id: i64, user_id: i64) -> Result<bool, DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM room_members WHERE room_id = ? AND user_id = ?)",
                )
                .bind(room_id)
                .bind(user_id)
                .fetch_one(&pool)
                .await
            })
            .await
    }

    pub async fn delete_member(&self, room_id: i64, user_id: i64) -> Result<(), DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query("DELETE FROM room_members WHERE room_id = ? AND user_id = ?")
                    .bind(room_id)
                    .bind(user_id)
                    .execute(&pool)
                    .await
            })
            .await?;
        Ok(())
    }

    pub async fn members_of(&self, room_id: i64) -> Result<Vec<i64>, DbError> {
        self.db
            .with_retry(move |pool| async move {
                sqlx::query_scalar::<_, i64>(
                    "SELECT user_id FROM room_members WHERE room_id = ?",
                )
                .bind(room_id)
                .fetch_all(&pool)
                .await
            })
            .await
    }

    /// The "rooms of user with member details" query hook named in spec §6
    /// (`USER_ROOMS_QUERY`), grouped by room.
    pub async fn fetch_rooms_with_users(&self, user_id: i64) -> Result<Vec<RoomWithUsers>, DbError> {
        let rows = self
            .db
            .with_retry(move |pool| async move {
                sqlx::query_as::<_, (i64, Option<String>, i64, String, i64)>(
                    "SELECT r.id, r.name, u.id, u.username, u.sex \
                     FROM room_members mine \
                     JOIN rooms r ON r.id = mine.room_id AND r.disabled = 0 \
                     JOIN room_members others ON others.room_id = r.id \
                     JOIN users u ON u.id = others.user_id \
                     WHERE mine.user_id = ?",
                )
                .bind(user_id)
                .fetch_all(&pool)
                .await
            })
            .await?;

        let mut grouped: BTreeMap<i64, RoomWithUsers> = BTreeMap::new();
        for (room_id, room_name, member_id, member_name, member_sex) in rows {
            grouped
                .entry(room_id)
                .or_insert_with(|| RoomWithUsers {
                    room_id,
                    room_name: room_name.clone(),
                    users: Vec::new(),
                })
                .users
                .push((member_id, member_name, member_sex));
        }
        Ok(grouped.into_values().collect())
    }
}
