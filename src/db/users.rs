//! Users and their profiles.

use sqlx::PgPool;
use uuid::Uuid;

use super::models::{NewUser, Profile, User, UserStats};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, is_staff, date_joined, last_login";

pub async fn create(pool: &PgPool, new_user: &NewUser) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email, password_hash, is_staff)
         VALUES ($1, $2, $3, $4)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(&new_user.password_hash)
    .bind(new_user.is_staff)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Usernames are case-sensitive, as in the signup form.
pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn username_exists(pool: &PgPool, username: &str) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

pub async fn all(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY date_joined, username"
    ))
    .fetch_all(pool)
    .await
}

pub async fn touch_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetch the user's profile, creating an empty one first if needed.
/// Returns the profile and whether it was created by this call.
pub async fn get_or_create_profile(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<(Profile, bool), sqlx::Error> {
    let inserted = sqlx::query_as::<_, Profile>(
        "INSERT INTO profiles (user_id) VALUES ($1)
         ON CONFLICT (user_id) DO NOTHING
         RETURNING user_id, profile_picture, bio, location, website",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    if let Some(profile) = inserted {
        return Ok((profile, true));
    }

    let profile = sqlx::query_as::<_, Profile>(
        "SELECT user_id, profile_picture, bio, location, website FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok((profile, false))
}

pub async fn update_profile(pool: &PgPool, profile: &Profile) -> Result<Profile, sqlx::Error> {
    sqlx::query_as::<_, Profile>(
        "UPDATE profiles
         SET profile_picture = $1, bio = $2, location = $3, website = $4
         WHERE user_id = $5
         RETURNING user_id, profile_picture, bio, location, website",
    )
    .bind(&profile.profile_picture)
    .bind(&profile.bio)
    .bind(&profile.location)
    .bind(&profile.website)
    .bind(profile.user_id)
    .fetch_one(pool)
    .await
}

pub async fn stats(pool: &PgPool, user_id: Uuid) -> Result<UserStats, sqlx::Error> {
    sqlx::query_as::<_, UserStats>(
        r#"
        SELECT
            COUNT(*) AS total_posts,
            COUNT(*) FILTER (WHERE p.status = 'published') AS published_posts,
            COALESCE(SUM(p.views), 0)::BIGINT AS total_views,
            (SELECT COUNT(*) FROM post_likes pl
                JOIN posts lp ON lp.id = pl.post_id
                WHERE lp.author_id = $1) AS total_likes,
            (SELECT COUNT(*) FROM comments c WHERE c.author_id = $1) AS total_comments
        FROM posts p
        WHERE p.author_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}
