//! Seed a development database with users, categories, tags and a handful
//! of published posts. Safe to run repeatedly: everything is get-or-create.

use bloghub::db::{
    self,
    models::{Category, NewUser, PostDraft, PostStatus, Tag, User},
    posts, taxonomy, users, DbConfig,
};
use bloghub::forms::slugify;
use bloghub::{logging, passwords};
use sqlx::PgPool;

type SeedResult<T> = Result<T, Box<dyn std::error::Error>>;

struct SeedUser {
    username: &'static str,
    email: &'static str,
    password: &'static str,
    is_staff: bool,
}

const USERS: &[SeedUser] = &[
    SeedUser {
        username: "admin",
        email: "admin@bloghub.com",
        password: "admin123",
        is_staff: true,
    },
    SeedUser {
        username: "john_doe",
        email: "john@example.com",
        password: "pass123",
        is_staff: false,
    },
    SeedUser {
        username: "jane_smith",
        email: "jane@example.com",
        password: "pass123",
        is_staff: false,
    },
    SeedUser {
        username: "mike_wilson",
        email: "mike@example.com",
        password: "pass123",
        is_staff: false,
    },
];

const CATEGORIES: &[(&str, &str)] = &[
    ("Technology", "Latest tech trends, gadgets, and innovations"),
    ("Lifestyle", "Health, fitness, and daily living tips"),
    ("Travel", "Explore the world and travel guides"),
    ("Food & Cooking", "Recipes, restaurants, and culinary adventures"),
    ("Business", "Entrepreneurship, startups, and business insights"),
    ("Education", "Learning resources and educational content"),
    ("Entertainment", "Movies, music, games, and pop culture"),
    ("Sports", "Sports news, analysis, and updates"),
];

const TAGS: &[&str] = &[
    "Python",
    "Django",
    "JavaScript",
    "React",
    "AI",
    "Machine Learning",
    "Web Development",
    "Mobile Apps",
    "Cloud Computing",
    "DevOps",
    "Health",
    "Fitness",
    "Nutrition",
    "Yoga",
    "Meditation",
    "Travel Tips",
    "Adventure",
    "Photography",
    "Culture",
    "Recipes",
    "Cooking Tips",
    "Restaurants",
    "Food Review",
    "Startup",
    "Marketing",
    "Finance",
    "Leadership",
    "Tutorial",
    "Tips & Tricks",
    "How-to",
    "Guide",
];

struct SeedPost {
    title: &'static str,
    excerpt: &'static str,
    content: &'static str,
    category: &'static str,
    tags: &'static [&'static str],
    author: &'static str,
    views: i32,
}

const POSTS: &[SeedPost] = &[
    SeedPost {
        title: "Getting Started with Django: A Complete Guide",
        excerpt: "Learn how to build web applications with Django, from project setup to deployment.",
        content: "<p>Django is a high-level web framework that encourages rapid development and clean design.</p>\
                  <h2>Why Django?</h2>\
                  <p>It ships with an ORM, an admin site, authentication and a template engine, so a new project \
                  can focus on its own features from day one.</p>\
                  <h2>Your first project</h2>\
                  <p>Create a virtual environment, install the framework and start a project. From there, add an \
                  app, define models and wire up a few views.</p>",
        category: "Technology",
        tags: &["Python", "Django", "Web Development", "Tutorial"],
        author: "admin",
        views: 245,
    },
    SeedPost {
        title: "10 Healthy Habits for a Better Life",
        excerpt: "Small daily changes that add up to a healthier, happier you.",
        content: "<p>Good health rarely comes from a single big decision. It grows out of small routines kept every day.</p>\
                  <ul><li>Drink water before coffee</li><li>Walk after meals</li><li>Sleep at the same time each night</li>\
                  <li>Cook at home more often</li><li>Take short breaks from screens</li></ul>\
                  <p>Pick two of these and keep them for a month before adding more.</p>",
        category: "Lifestyle",
        tags: &["Health", "Fitness", "Nutrition", "Tips & Tricks"],
        author: "john_doe",
        views: 189,
    },
    SeedPost {
        title: "Hidden Gems of Southeast Asia",
        excerpt: "Quiet beaches, mountain villages and street food far from the usual tourist trail.",
        content: "<p>Southeast Asia is full of places most itineraries skip.</p>\
                  <h2>Where to go</h2>\
                  <p>Try the limestone valleys of northern Vietnam, the islands off southern Thailand and the \
                  coffee highlands of Laos.</p>\
                  <h2>Before you leave</h2>\
                  <p>Travel light, carry some cash for rural areas and learn a few words of the local language.</p>",
        category: "Travel",
        tags: &["Travel Tips", "Adventure", "Photography", "Culture"],
        author: "jane_smith",
        views: 312,
    },
    SeedPost {
        title: "The Art of Making Perfect Italian Pasta",
        excerpt: "Fresh pasta from scratch with nothing more than flour, eggs and patience.",
        content: "<p>Fresh pasta needs only flour and eggs, but technique makes the difference.</p>\
                  <h2>The dough</h2>\
                  <p>Use one egg per hundred grams of flour. Knead for ten minutes until smooth, then rest it for \
                  half an hour.</p>\
                  <h2>Cooking</h2>\
                  <p>Salt the water generously and cook fresh pasta for two or three minutes only.</p>",
        category: "Food & Cooking",
        tags: &["Recipes", "Cooking Tips", "Restaurants", "Food Review"],
        author: "mike_wilson",
        views: 156,
    },
    SeedPost {
        title: "Startup Lessons: From Idea to Launch",
        excerpt: "What building a product from zero teaches about customers, focus and money.",
        content: "<p>Most startups fail because they build something nobody wants.</p>\
                  <h2>Talk to customers early</h2>\
                  <p>Before writing code, find ten people with the problem and ask how they solve it today.</p>\
                  <h2>Watch the runway</h2>\
                  <p>Know how many months of cash remain and revisit the plan every time that number changes.</p>",
        category: "Business",
        tags: &["Startup", "Marketing", "Finance", "Leadership"],
        author: "admin",
        views: 278,
    },
];

async fn ensure_user(pool: &PgPool, seed: &SeedUser) -> SeedResult<User> {
    if let Some(user) = users::find_by_username(pool, seed.username).await? {
        println!("  = user {} already exists", seed.username);
        return Ok(user);
    }

    let password_hash = passwords::hash_password(seed.password.to_string()).await?;
    let user = users::create(
        pool,
        &NewUser {
            username: seed.username.to_string(),
            email: seed.email.to_string(),
            password_hash,
            is_staff: seed.is_staff,
        },
    )
    .await?;
    users::get_or_create_profile(pool, user.id).await?;
    println!("  + user {}", user.username);
    Ok(user)
}

async fn ensure_post(
    pool: &PgPool,
    seed: &SeedPost,
    authors: &[User],
    categories: &[Category],
    tags: &[Tag],
) -> SeedResult<bool> {
    if posts::find_by_title(pool, seed.title).await?.is_some() {
        println!("  = post \"{}\" already exists", seed.title);
        return Ok(false);
    }

    let author = authors
        .iter()
        .find(|u| u.username == seed.author)
        .ok_or_else(|| format!("unknown seed author {}", seed.author))?;
    let category_id = categories
        .iter()
        .find(|c| c.name == seed.category)
        .map(|c| c.id);
    let tag_ids = tags
        .iter()
        .filter(|t| seed.tags.contains(&t.name.as_str()))
        .map(|t| t.id)
        .collect();

    let base = slugify(seed.title);
    let mut slug = base.clone();
    let mut n = 2;
    while posts::slug_exists(pool, &slug, None).await? {
        slug = format!("{base}-{n}");
        n += 1;
    }

    let post = posts::create(
        pool,
        author.id,
        &PostDraft {
            title: seed.title.to_string(),
            slug,
            category_id,
            tag_ids,
            content: seed.content.to_string(),
            excerpt: seed.excerpt.to_string(),
            featured_image: None,
            status: PostStatus::Published,
        },
    )
    .await?;
    posts::set_views(pool, post.id, seed.views).await?;

    for liker in authors.iter().take(2) {
        posts::add_like(pool, post.id, liker.id).await?;
    }

    println!("  + post \"{}\"", post.title);
    Ok(true)
}

#[tokio::main]
async fn main() -> SeedResult<()> {
    dotenvy::dotenv().ok();
    logging::init_cli();

    let pool = db::connect(&DbConfig::default()).await?;
    db::run_migrations(&pool).await?;

    println!("Creating users...");
    let mut authors = Vec::with_capacity(USERS.len());
    for seed in USERS {
        authors.push(ensure_user(&pool, seed).await?);
    }

    println!("Creating categories...");
    let mut categories = Vec::with_capacity(CATEGORIES.len());
    for (name, description) in CATEGORIES {
        let (category, created) =
            taxonomy::ensure_category(&pool, name, &slugify(name), description).await?;
        if created {
            println!("  + category {}", category.name);
        }
        categories.push(category);
    }

    println!("Creating tags...");
    let mut tags = Vec::with_capacity(TAGS.len());
    for name in TAGS {
        let (tag, created) = taxonomy::ensure_tag(&pool, name, &slugify(name)).await?;
        if created {
            println!("  + tag {}", tag.name);
        }
        tags.push(tag);
    }

    println!("Creating posts...");
    let mut created_posts = 0;
    for seed in POSTS {
        if ensure_post(&pool, seed, &authors, &categories, &tags).await? {
            created_posts += 1;
        }
    }

    println!();
    println!("Sample data ready:");
    println!("  users:      {}", authors.len());
    println!("  categories: {}", categories.len());
    println!("  tags:       {}", tags.len());
    println!("  new posts:  {}", created_posts);
    println!();
    println!("Log in as admin / admin123, or any sample user with pass123.");

    Ok(())
}
