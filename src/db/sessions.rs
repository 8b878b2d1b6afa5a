//! Server-side session rows. The cookie only carries a signed reference; the
//! row stores the owner (if logged in) and pending flash messages.

use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::session::Message;

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub token_hash: String,
    pub user_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

pub async fn create(
    pool: &PgPool,
    token_hash: &str,
    user_id: Option<Uuid>,
    flash: &[Message],
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sessions (token_hash, user_id, flash, expires_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(Json(flash))
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Live (unexpired) session by token hash.
pub async fn find(pool: &PgPool, token_hash: &str) -> Result<Option<SessionRow>, sqlx::Error> {
    sqlx::query_as::<_, SessionRow>(
        "SELECT token_hash, user_id, expires_at FROM sessions
         WHERE token_hash = $1 AND expires_at > now()",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, token_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn push_flash(pool: &PgPool, token_hash: &str, message: &Message) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sessions SET flash = flash || $1 WHERE token_hash = $2")
        .bind(Json(vec![message]))
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}

/// Return pending messages and clear them in the same statement.
pub async fn take_flash(pool: &PgPool, token_hash: &str) -> Result<Vec<Message>, sqlx::Error> {
    let row: Option<(Json<Vec<Message>>,)> = sqlx::query_as(
        r#"
        WITH old AS (
            SELECT token_hash, flash FROM sessions WHERE token_hash = $1 FOR UPDATE
        )
        UPDATE sessions s
        SET flash = '[]'::jsonb
        FROM old
        WHERE s.token_hash = old.token_hash
        RETURNING old.flash
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(Json(messages),)| messages).unwrap_or_default())
}

pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
