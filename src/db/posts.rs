//! Posts, their tag links and likes.

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{publish_stamp, LikeState, Post, PostCard, PostDraft};

const POST_COLUMNS: &str = "id, title, slug, author_id, category_id, content, excerpt, \
     featured_image, status, created_at, updated_at, published_at, views";

/// Card projection shared by every listing; callers append WHERE/ORDER/LIMIT.
const CARD_SELECT: &str = r#"
    SELECT p.id, p.title, p.slug, p.author_id, p.category_id, p.content, p.excerpt,
           p.featured_image, p.status, p.created_at, p.updated_at, p.published_at, p.views,
           u.username AS author_username,
           c.name AS category_name,
           c.slug AS category_slug,
           (SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.id) AS like_count,
           (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN categories c ON c.id = p.category_id
"#;

/// Title, content or any tag name contains `$1` (an ILIKE pattern or NULL).
/// EXISTS keeps a post with several matching tags from appearing twice.
const SEARCH_FILTER: &str = r#"
    ($1::TEXT IS NULL
        OR p.title ILIKE $1
        OR p.content ILIKE $1
        OR EXISTS (
            SELECT 1 FROM post_tags pt
            JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id = p.id AND t.name ILIKE $1
        ))
"#;

const NEWEST_FIRST: &str = "ORDER BY p.published_at DESC, p.created_at DESC, p.id DESC";

/// Case-insensitive substring pattern with LIKE wildcards escaped.
pub fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn search_param(search: Option<&str>) -> Option<String> {
    search.filter(|s| !s.is_empty()).map(like_pattern)
}

pub async fn count_published(pool: &PgPool, search: Option<&str>) -> Result<i64, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM posts p WHERE p.status = 'published' AND {SEARCH_FILTER}"
    ))
    .bind(search_param(search))
    .fetch_one(pool)
    .await?;
    Ok(total)
}

pub async fn list_published(
    pool: &PgPool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostCard>, sqlx::Error> {
    sqlx::query_as::<_, PostCard>(&format!(
        "{CARD_SELECT} WHERE p.status = 'published' AND {SEARCH_FILTER}
         {NEWEST_FIRST} LIMIT $2 OFFSET $3"
    ))
    .bind(search_param(search))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_in_category(pool: &PgPool, category_id: i64) -> Result<i64, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM posts WHERE category_id = $1 AND status = 'published'",
    )
    .bind(category_id)
    .fetch_one(pool)
    .await?;
    Ok(total)
}

pub async fn list_in_category(
    pool: &PgPool,
    category_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostCard>, sqlx::Error> {
    sqlx::query_as::<_, PostCard>(&format!(
        "{CARD_SELECT} WHERE p.category_id = $1 AND p.status = 'published'
         {NEWEST_FIRST} LIMIT $2 OFFSET $3"
    ))
    .bind(category_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Drafts included.
pub async fn count_by_author(pool: &PgPool, author_id: Uuid) -> Result<i64, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Drafts included.
pub async fn list_by_author(
    pool: &PgPool,
    author_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostCard>, sqlx::Error> {
    sqlx::query_as::<_, PostCard>(&format!(
        "{CARD_SELECT} WHERE p.author_id = $1 {NEWEST_FIRST} LIMIT $2 OFFSET $3"
    ))
    .bind(author_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = $1"))
        .bind(slug)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_title(pool: &PgPool, title: &str) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE title = $1 ORDER BY id LIMIT 1"
    ))
    .bind(title)
    .fetch_optional(pool)
    .await
}

pub async fn card_by_slug(pool: &PgPool, slug: &str) -> Result<Option<PostCard>, sqlx::Error> {
    sqlx::query_as::<_, PostCard>(&format!("{CARD_SELECT} WHERE p.slug = $1"))
        .bind(slug)
        .fetch_optional(pool)
        .await
}

/// Other published posts in the same category; uncategorised posts relate to
/// other uncategorised posts.
pub async fn related(pool: &PgPool, post: &Post, limit: i64) -> Result<Vec<PostCard>, sqlx::Error> {
    sqlx::query_as::<_, PostCard>(&format!(
        "{CARD_SELECT} WHERE p.category_id IS NOT DISTINCT FROM $1
           AND p.status = 'published' AND p.id <> $2
         {NEWEST_FIRST} LIMIT $3"
    ))
    .bind(post.category_id)
    .bind(post.id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Most viewed published posts.
pub async fn trending(pool: &PgPool, limit: i64) -> Result<Vec<PostCard>, sqlx::Error> {
    sqlx::query_as::<_, PostCard>(&format!(
        "{CARD_SELECT} WHERE p.status = 'published'
         ORDER BY p.views DESC, p.published_at DESC, p.id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Most liked published posts.
pub async fn popular(pool: &PgPool, limit: i64) -> Result<Vec<PostCard>, sqlx::Error> {
    sqlx::query_as::<_, PostCard>(&format!(
        "{CARD_SELECT} WHERE p.status = 'published'
         ORDER BY like_count DESC, p.published_at DESC, p.id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Bump the view counter in place and return the new value.
pub async fn increment_views(pool: &PgPool, id: i64) -> Result<i32, sqlx::Error> {
    let (views,): (i32,) =
        sqlx::query_as("UPDATE posts SET views = views + 1 WHERE id = $1 RETURNING views")
            .bind(id)
            .fetch_one(pool)
            .await?;
    Ok(views)
}

/// Overwrite the view counter (seed data).
pub async fn set_views(pool: &PgPool, id: i64, views: i32) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE posts SET views = $1 WHERE id = $2")
        .bind(views)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn slug_exists(
    pool: &PgPool,
    slug: &str,
    excluding: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1 AND id IS DISTINCT FROM $2)",
    )
    .bind(slug)
    .bind(excluding)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn replace_tags(
    tx: &mut Transaction<'_, Postgres>,
    post_id: i64,
    tag_ids: &[i64],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut **tx)
        .await?;

    if !tag_ids.is_empty() {
        sqlx::query(
            "INSERT INTO post_tags (post_id, tag_id)
             SELECT $1, UNNEST($2::BIGINT[])
             ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(tag_ids)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

pub async fn create(pool: &PgPool, author_id: Uuid, draft: &PostDraft) -> Result<Post, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let post = sqlx::query_as::<_, Post>(&format!(
        r#"
        INSERT INTO posts (
            title, slug, author_id, category_id, content, excerpt,
            featured_image, status, published_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {POST_COLUMNS}
        "#
    ))
    .bind(&draft.title)
    .bind(&draft.slug)
    .bind(author_id)
    .bind(draft.category_id)
    .bind(&draft.content)
    .bind(&draft.excerpt)
    .bind(&draft.featured_image)
    .bind(draft.status.as_str())
    .bind(publish_stamp(draft.status, None, Utc::now()))
    .fetch_one(&mut *tx)
    .await?;

    replace_tags(&mut tx, post.id, &draft.tag_ids).await?;

    tx.commit().await?;

    Ok(post)
}

/// Overwrite the editable fields. `published_at` is only filled when still
/// empty, so a stamp never moves once set.
pub async fn update(pool: &PgPool, id: i64, draft: &PostDraft) -> Result<Post, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let post = sqlx::query_as::<_, Post>(&format!(
        r#"
        UPDATE posts
        SET title = $1,
            slug = $2,
            category_id = $3,
            content = $4,
            excerpt = $5,
            featured_image = $6,
            status = $7,
            published_at = COALESCE(published_at, $8),
            updated_at = now()
        WHERE id = $9
        RETURNING {POST_COLUMNS}
        "#
    ))
    .bind(&draft.title)
    .bind(&draft.slug)
    .bind(draft.category_id)
    .bind(&draft.content)
    .bind(&draft.excerpt)
    .bind(&draft.featured_image)
    .bind(draft.status.as_str())
    .bind(publish_stamp(draft.status, None, Utc::now()))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    replace_tags(&mut tx, post.id, &draft.tag_ids).await?;

    tx.commit().await?;

    Ok(post)
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn tag_ids(pool: &PgPool, post_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT tag_id FROM post_tags WHERE post_id = $1 ORDER BY tag_id")
            .bind(post_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn like_count(pool: &PgPool, post_id: i64) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
        .bind(post_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn is_liked_by(pool: &PgPool, post_id: i64, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let (liked,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM post_likes WHERE post_id = $1 AND user_id = $2)",
    )
    .bind(post_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(liked)
}

pub async fn add_like(pool: &PgPool, post_id: i64, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(post_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove the user's like if present, otherwise add it.
pub async fn toggle_like(pool: &PgPool, post_id: i64, user_id: Uuid) -> Result<LikeState, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
        > 0;

    if !removed {
        sqlx::query(
            "INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    let (total_likes,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;

    Ok(LikeState {
        liked: !removed,
        total_likes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewUser, PostStatus, User};
    use crate::db::{comments, taxonomy, users};

    #[test]
    fn test_like_pattern_wraps_plain_text() {
        assert_eq!(like_pattern("rust"), "%rust%");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_empty_search_means_no_filter() {
        assert_eq!(search_param(None), None);
        assert_eq!(search_param(Some("")), None);
        assert_eq!(search_param(Some("tips")), Some("%tips%".to_string()));
    }

    async fn insert_user(pool: &PgPool, tag: &str) -> User {
        let name = format!("{tag}_{}", &Uuid::new_v4().simple().to_string()[..8]);
        users::create(
            pool,
            &NewUser {
                username: name.clone(),
                email: format!("{name}@example.com"),
                password_hash: "x".to_string(),
                is_staff: false,
            },
        )
        .await
        .unwrap()
    }

    fn draft(title: &str, tag_ids: Vec<i64>, status: PostStatus) -> PostDraft {
        PostDraft {
            title: title.to_string(),
            slug: format!("test-{}", Uuid::new_v4().simple()),
            category_id: None,
            tag_ids,
            content: "<p>body</p>".to_string(),
            excerpt: String::new(),
            featured_image: None,
            status,
        }
    }

    /// Runs only when DATABASE_URL points at a disposable database.
    #[tokio::test]
    async fn test_post_store_against_database() {
        if std::env::var("DATABASE_URL").is_err() {
            return;
        }
        let pool = crate::db::connect(&crate::db::DbConfig::default())
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let author = insert_user(&pool, "author").await;
        let reader = insert_user(&pool, "reader").await;

        // A tag-only match with two matching tags is listed once.
        let marker = format!("zz{}", &Uuid::new_v4().simple().to_string()[..10]);
        let (first, _) = taxonomy::ensure_tag(&pool, &format!("{marker} one"), &format!("{marker}-one"))
            .await
            .unwrap();
        let (second, _) = taxonomy::ensure_tag(&pool, &format!("{marker} two"), &format!("{marker}-two"))
            .await
            .unwrap();
        let tagged = create(
            &pool,
            author.id,
            &draft("Tagged", vec![first.id, second.id], PostStatus::Published),
        )
        .await
        .unwrap();
        assert_eq!(count_published(&pool, Some(&marker)).await.unwrap(), 1);
        let found = list_published(&pool, Some(&marker), 10, 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].post.id, tagged.id);
        assert_eq!(tag_ids(&pool, tagged.id).await.unwrap().len(), 2);

        // Toggling twice restores the like count.
        let before = like_count(&pool, tagged.id).await.unwrap();
        let on = toggle_like(&pool, tagged.id, reader.id).await.unwrap();
        assert!(on.liked);
        assert_eq!(on.total_likes, before + 1);
        assert!(is_liked_by(&pool, tagged.id, reader.id).await.unwrap());
        let off = toggle_like(&pool, tagged.id, reader.id).await.unwrap();
        assert!(!off.liked);
        assert_eq!(off.total_likes, before);

        // Drafts get no stamp; the first publish stamps once.
        let mut edit = draft("Draft", Vec::new(), PostStatus::Draft);
        let created = create(&pool, author.id, &edit).await.unwrap();
        assert!(created.published_at.is_none());
        edit.status = PostStatus::Published;
        let published = update(&pool, created.id, &edit).await.unwrap();
        let stamp = published.published_at.unwrap();
        edit.title = "Draft, edited".to_string();
        let edited = update(&pool, created.id, &edit).await.unwrap();
        assert_eq!(edited.published_at, Some(stamp));

        assert_eq!(increment_views(&pool, created.id).await.unwrap(), 1);
        assert!(slug_exists(&pool, &edit.slug, None).await.unwrap());
        assert!(!slug_exists(&pool, &edit.slug, Some(created.id)).await.unwrap());

        assert!(edited.is_authored_by(&author));
        assert!(!edited.is_authored_by(&reader));
        let comment = comments::create(&pool, tagged.id, reader.id, "Nice")
            .await
            .unwrap();
        assert!(comment.is_authored_by(&reader));
        assert!(!comment.is_authored_by(&author));

        // Deleting a post takes its comments and likes with it.
        assert!(delete(&pool, tagged.id).await.unwrap());
        assert!(comments::find(&pool, comment.id).await.unwrap().is_none());
        assert!(delete(&pool, created.id).await.unwrap());
        assert!(!delete(&pool, created.id).await.unwrap());
    }
}
