//! BlogHub - a server-rendered blogging site on axum and PostgreSQL

pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod logging;
pub mod pagination;
pub mod passwords;
pub mod routes;
pub mod session;
pub mod uploads;
pub mod views;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer, services::ServeDir,
    trace::TraceLayer,
};

use crate::config::CONFIG;
use crate::error::AppError;
use crate::routes::{accounts, blog, health};

async fn not_found() -> AppError {
    AppError::NotFound
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    Router::new()
        .route("/", get(blog::home))
        .route("/explore/", get(blog::explore))
        .route("/create/", get(blog::create_form).post(blog::create_submit))
        .route("/my-posts/", get(blog::my_posts))
        .route("/category/{slug}/", get(blog::category_posts))
        .route("/post/{slug}/", get(blog::post_detail))
        .route(
            "/post/{slug}/edit/",
            get(blog::edit_form).post(blog::edit_submit),
        )
        .route(
            "/post/{slug}/delete/",
            get(blog::delete_confirm).post(blog::delete_submit),
        )
        .route("/post/{slug}/like/", post(blog::post_like))
        .route(
            "/post/{slug}/comment/",
            get(blog::comment_redirect).post(blog::add_comment),
        )
        .route("/comment/{id}/delete/", post(blog::delete_comment))
        .route(
            "/accounts/signup/",
            get(accounts::signup_form).post(accounts::signup_submit),
        )
        .route(
            "/accounts/login/",
            get(accounts::login_form).post(accounts::login_submit),
        )
        .route(
            "/accounts/logout/",
            get(accounts::logout).post(accounts::logout),
        )
        .route("/accounts/profile/", get(accounts::profile))
        .route(
            "/accounts/profile/edit/",
            get(accounts::profile_edit_form).post(accounts::profile_edit_submit),
        )
        .route("/health", get(health::health_ping))
        .route("/health/database", get(health::health_database))
        .route("/health/ready", get(health::health_ready))
        .nest_service("/media", ServeDir::new(&CONFIG.media_root))
        .fallback(not_found)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        // Caps multipart uploads; individual images are limited separately
        .layer(RequestBodyLimitLayer::new(CONFIG.max_body_bytes))
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Dropping the guards stops the background log writers.
    let _log_guards = logging::init(&CONFIG);

    health::init_start_time();

    // Refuse to start in production with the published default secret.
    if CONFIG.is_production() && CONFIG.has_insecure_secret() {
        panic!(
            "FATAL: SESSION_SECRET must be set to a secure, unique value in production. \
             Refusing to start with the default secret."
        );
    }
    if CONFIG.is_production() && !CONFIG.secure_cookies {
        tracing::warn!("SECURE_COOKIES is off in production; session cookies will be sent over plain HTTP");
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
                match db::sessions::purge_expired(&pool).await {
                    Ok(purged) if purged > 0 => tracing::info!("Purged {} expired sessions", purged),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Pages will return 503 until it is available.",
                    e
                );
            }
        }
    } else {
        tracing::warn!("DATABASE_URL not set. Running without database connection.");
    }

    let app = create_app();

    let addr: SocketAddr = CONFIG
        .bind_addr()
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting {} on {}", CONFIG.site_name, addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unknown_path_renders_404_page() {
        let res = create_app()
            .oneshot(Request::get("/no/such/page").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("Page not found"));
    }

    #[tokio::test]
    async fn test_missing_media_is_404() {
        let res = create_app()
            .oneshot(
                Request::get("/media/blog/missing.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let res = create_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
    }
}
