use super::{Database, DbError};

/// A chat user. Sex is stored as a small index into the configured
/// `[genders]` label table (spec §6 `GENDERS`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub sex: i64,
}

pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub(super) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a user row. Account creation itself lives behind the
    /// out-of-scope HTTP signup surface (spec §1); this is what that
    /// surface (and test fixtures) write through.
    pub async fn create(&self, username: &str, sex: i64) -> Result<i64, DbError> {
        let username = username.to_string();
        self.db
            .with_retry(move |pool| {
                let username = username.clone();
                async move {
                    let rec = sqlx::query("INSERT INTO users (username, sex) VALUES (?, ?)")
                        .bind(username)
                        .bind(sex)
                        .execute(&pool)
                        .await?;
                    Ok(rec.last_insert_rowid())
                }
            })
            .await
    }

    pub async fn get(&self, user_id: i64) -> Result<User, DbError> {
        self.db
            .with_retry(|pool| async move {
                sqlx::query_as::<_, User>("SELECT id, username, sex FROM users WHERE id = ?")
                    .bind(user_id)
                    .fetch_one(&pool)
                    .await
            })
            .await
            .map_err(|e| match e {
                DbError::Sqlx(sqlx::Error::RowNotFound) => DbError::UserNotFound(user_id),
                other => other,
            })
    }
}
