//! Database models - row structs for the blog tables plus the small pure rules
//! that belong to them (reading time, publish stamping).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Average reading speed used for the reading-time estimate.
pub const WORDS_PER_MINUTE: usize = 200;

/// Minutes needed to read `content`: `max(1, ceil(words / 200))`.
pub fn reading_time(content: &str) -> u32 {
    let words = content.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

/// Value `published_at` must hold after a save with `status`.
///
/// An existing stamp always wins; a published save without one is stamped `now`.
pub fn publish_stamp(
    status: PostStatus,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match (current, status) {
        (Some(stamp), _) => Some(stamp),
        (None, PostStatus::Published) => Some(now),
        (None, PostStatus::Draft) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub const ALL: [PostStatus; 2] = [PostStatus::Draft, PostStatus::Published];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostStatus::Draft => "Draft",
            PostStatus::Published => "Published",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// New user for insertion (password already hashed)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_staff: bool,
}

/// Profile extension of a user, one-to-one
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub location: String,
    pub website: String,
}

/// Aggregates shown on the profile page
#[derive(Debug, Clone, Default, FromRow, Serialize)]
pub struct UserStats {
    pub total_posts: i64,
    pub published_posts: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_comments: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Category with its number of published posts
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CategoryWithCount {
    #[sqlx(flatten)]
    pub category: Category,
    pub post_count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Blog post row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub author_id: Uuid,
    pub category_id: Option<i64>,
    pub content: String,
    pub excerpt: String,
    pub featured_image: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub views: i32,
}

impl Post {
    pub fn status(&self) -> PostStatus {
        PostStatus::parse(&self.status).unwrap_or_default()
    }

    pub fn is_published(&self) -> bool {
        self.status() == PostStatus::Published
    }

    pub fn reading_time(&self) -> u32 {
        reading_time(&self.content)
    }

    pub fn is_authored_by(&self, user: &User) -> bool {
        self.author_id == user.id
    }
}

/// Post joined with what list and detail pages show next to it
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PostCard {
    #[sqlx(flatten)]
    pub post: Post,
    pub author_username: String,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
}

/// Post fields written by the post form
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub slug: String,
    pub category_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub content: String,
    pub excerpt: String,
    pub featured_image: Option<String>,
    pub status: PostStatus,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub parent_id: Option<i64>,
}

impl Comment {
    pub fn is_authored_by(&self, user: &User) -> bool {
        self.author_id == user.id
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CommentWithAuthor {
    #[sqlx(flatten)]
    pub comment: Comment,
    pub author_username: String,
}

/// Result of a like toggle, serialized as the JSON body of the like endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub total_likes: i64,
}
