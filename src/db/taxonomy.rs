//! Categories and tags.

use sqlx::PgPool;

use super::models::{Category, CategoryWithCount, Tag};

pub async fn all_categories(pool: &PgPool) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        "SELECT id, name, slug, description, created_at FROM categories ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

/// Every category with its number of published posts.
pub async fn categories_with_counts(pool: &PgPool) -> Result<Vec<CategoryWithCount>, sqlx::Error> {
    sqlx::query_as::<_, CategoryWithCount>(
        r#"
        SELECT c.id, c.name, c.slug, c.description, c.created_at,
               COUNT(p.id) AS post_count
        FROM categories c
        LEFT JOIN posts p ON p.category_id = c.id AND p.status = 'published'
        GROUP BY c.id
        ORDER BY c.name
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn category_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        "SELECT id, name, slug, description, created_at FROM categories WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
}

pub async fn category_exists(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

/// Get-or-create by name; the slug is only used on insert.
pub async fn ensure_category(
    pool: &PgPool,
    name: &str,
    slug: &str,
    description: &str,
) -> Result<(Category, bool), sqlx::Error> {
    let inserted = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name, slug, description) VALUES ($1, $2, $3)
         ON CONFLICT (name) DO NOTHING
         RETURNING id, name, slug, description, created_at",
    )
    .bind(name)
    .bind(slug)
    .bind(description)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(category) => Ok((category, true)),
        None => {
            let category = sqlx::query_as::<_, Category>(
                "SELECT id, name, slug, description, created_at FROM categories WHERE name = $1",
            )
            .bind(name)
            .fetch_one(pool)
            .await?;
            Ok((category, false))
        }
    }
}

pub async fn all_tags(pool: &PgPool) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>("SELECT id, name, slug FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
}

/// Of `ids`, the ones that name an existing tag.
pub async fn existing_tag_ids(pool: &PgPool, ids: &[i64]) -> Result<Vec<i64>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn tags_for_post(pool: &PgPool, post_id: i64) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>(
        "SELECT t.id, t.name, t.slug FROM tags t
         JOIN post_tags pt ON pt.tag_id = t.id
         WHERE pt.post_id = $1
         ORDER BY t.name",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
}

pub async fn ensure_tag(pool: &PgPool, name: &str, slug: &str) -> Result<(Tag, bool), sqlx::Error> {
    let inserted = sqlx::query_as::<_, Tag>(
        "INSERT INTO tags (name, slug) VALUES ($1, $2)
         ON CONFLICT (name) DO NOTHING
         RETURNING id, name, slug",
    )
    .bind(name)
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(tag) => Ok((tag, true)),
        None => {
            let tag = sqlx::query_as::<_, Tag>("SELECT id, name, slug FROM tags WHERE name = $1")
                .bind(name)
                .fetch_one(pool)
                .await?;
            Ok((tag, false))
        }
    }
}
