//! Refresh session storage.
//!
//! Each row backs one renewable login. The secret is embedded in the refresh
//! token; a row is usable while `revoked = 0`. Rows are only ever updated to
//! flip `revoked`, and are kept after revocation.

use base64::Engine;
use sqlx::sqlite::SqlitePool;

/// Number of random bytes in a session secret.
const SECRET_BYTES: usize = 64;

/// A refresh session record.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub id: i64,
    pub secret: String,
    pub user_id: i64,
    pub revoked: bool,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    secret: String,
    user_id: i64,
    revoked: i32,
    created_at: String,
}

impl From<SessionRow> for RefreshSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            secret: row.secret,
            user_id: row.user_id,
            revoked: row.revoked != 0,
            created_at: row.created_at,
        }
    }
}

/// Generate a fresh URL-safe session secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Store for refresh sessions.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new, unrevoked session.
    pub async fn create(&self, secret: &str, user_id: i64) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO refresh_sessions (secret, user_id) VALUES (?, ?)")
            .bind(secret)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a session by its secret, revoked or not.
    pub async fn get_by_secret(&self, secret: &str) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, secret, user_id, revoked, created_at FROM refresh_sessions WHERE secret = ?",
        )
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshSession::from))
    }

    /// Revoke a session. Returns false if it was unknown or already revoked.
    pub async fn revoke(&self, secret: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE refresh_sessions SET revoked = 1 WHERE secret = ? AND revoked = 0")
                .bind(secret)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Retire `old_secret` and open `new_secret` for the same user in one
    /// transaction.
    ///
    /// The transaction starts with a conditional update so that, of several
    /// concurrent callers presenting the same secret, only the first to take
    /// the write lock sees the row as unrevoked. Returns the owning user ID,
    /// or `None` if the old session was unknown or already revoked.
    pub async fn rotate(
        &self,
        old_secret: &str,
        new_secret: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(i64,)> = sqlx::query_as(
            "UPDATE refresh_sessions SET revoked = 1 WHERE secret = ? AND revoked = 0 RETURNING user_id",
        )
        .bind(old_secret)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id,)) = claimed else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("INSERT INTO refresh_sessions (secret, user_id) VALUES (?, ?)")
            .bind(new_secret)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(user_id))
    }

    /// List all sessions for a user, newest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<RefreshSession>, sqlx::Error> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT id, secret, user_id, revoked, created_at FROM refresh_sessions WHERE user_id = ? ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RefreshSession::from).collect())
    }
}
