//! Router-level ownership checks against a real database.
//!
//! Lives in its own test binary because it registers the global pool, which
//! the in-crate tests expect to be absent. Returns early unless DATABASE_URL
//! is set.

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use tower::ServiceExt;
use uuid::Uuid;

use bloghub::db::{
    self,
    models::{NewUser, PostDraft, PostStatus, User},
    posts, users,
};
use bloghub::passwords;

const PASSWORD: &str = "correct-horse-42";
const BOUNDARY: &str = "bloghub-test-boundary";

async fn insert_user(pool: &sqlx::PgPool, tag: &str) -> User {
    let username = format!("{tag}_{}", &Uuid::new_v4().simple().to_string()[..8]);
    users::create(
        pool,
        &NewUser {
            username: username.clone(),
            email: format!("{username}@example.com"),
            password_hash: passwords::hash_password(PASSWORD.to_string()).await.unwrap(),
            is_staff: false,
        },
    )
    .await
    .unwrap()
}

async fn send(req: Request<Body>) -> Response<Body> {
    bloghub::create_app().oneshot(req).await.unwrap()
}

fn location(res: &Response<Body>) -> String {
    res.headers()[header::LOCATION].to_str().unwrap().to_string()
}

/// `name=value` of the session cookie set by a login response.
async fn log_in(user: &User) -> String {
    let res = send(
        Request::post("/accounts/login/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "username={}&password={}",
                user.username, PASSWORD
            )))
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/");
    let set_cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn multipart_body(fields: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

#[tokio::test]
async fn test_only_the_author_can_change_a_post() {
    if std::env::var("DATABASE_URL").is_err() {
        return;
    }
    let pool = db::init_pool(None).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let author = insert_user(&pool, "owner").await;
    let intruder = insert_user(&pool, "intruder").await;
    let slug = format!("owned-{}", Uuid::new_v4().simple());
    let post = posts::create(
        &pool,
        author.id,
        &PostDraft {
            title: "Orig".to_string(),
            slug: slug.clone(),
            category_id: None,
            tag_ids: Vec::new(),
            content: "<p>Original body</p>".to_string(),
            excerpt: String::new(),
            featured_image: None,
            status: PostStatus::Published,
        },
    )
    .await
    .unwrap();

    let cookie = log_in(&intruder).await;
    let post_path = format!("/post/{slug}/");

    let res = send(
        Request::post(format!("/post/{slug}/edit/"))
            .header(header::COOKIE, &cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(&[
                ("title", "Hijacked"),
                ("slug", &slug),
                ("content", "<p>Replaced</p>"),
                ("status", "published"),
            ])))
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), post_path);

    let res = send(
        Request::post(format!("/post/{slug}/delete/"))
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), post_path);

    let unchanged = posts::find_by_slug(&pool, &slug).await.unwrap().unwrap();
    assert_eq!(unchanged.id, post.id);
    assert_eq!(unchanged.title, "Orig");
    assert_eq!(unchanged.content, "<p>Original body</p>");

    // A slug that is not a valid header value still redirects cleanly.
    let res = send(
        Request::get("/post/a%0Ab/comment/")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/post/a%0Ab/");

    // Control characters in `next` never reach the Location header.
    let res = send(
        Request::post("/accounts/login/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "username={}&password={}&next=%2F%09%2Fevil.example",
                author.username, PASSWORD
            )))
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/");

    assert!(posts::delete(&pool, post.id).await.unwrap());
    for user in [&author, &intruder] {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(pool.as_ref())
            .await
            .unwrap();
    }
}
