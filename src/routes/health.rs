/**
 * Health Routes
 * Liveness and readiness probes for the blog server
 */
use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Result of pinging the pool.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCheck {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatabaseCheck {
    async fn run() -> Self {
        match crate::db::health_check().await {
            Ok(elapsed) => Self {
                healthy: true,
                response_time: Some(elapsed.as_millis() as u64),
                error: None,
            },
            Err(e) => Self {
                healthy: false,
                response_time: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
}

impl Readiness {
    fn now(ready: bool) -> Self {
        Self {
            ready,
            timestamp: Utc::now(),
            uptime: SERVER_START.elapsed().as_secs(),
        }
    }
}

/// GET /health - process is up
pub async fn health_ping() -> impl IntoResponse {
    Json(Readiness::now(true))
}

/// GET /health/database - always 200; the body says whether the pool answers
pub async fn health_database() -> impl IntoResponse {
    Json(DatabaseCheck::run().await)
}

/// GET /health/ready - 503 until the database answers, every page needs it
pub async fn health_ready() -> impl IntoResponse {
    let check = DatabaseCheck::run().await;
    let status = if check.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(Readiness::now(check.healthy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn test_router() -> Router {
        Router::new()
            .route("/health", get(health_ping))
            .route("/health/database", get(health_database))
            .route("/health/ready", get(health_ready))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(uri: &str) -> (StatusCode, T) {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        let res = test_router().oneshot(req).await.unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_database_check_skips_empty_fields() {
        let check = DatabaseCheck {
            healthy: true,
            response_time: Some(10),
            error: None,
        };
        let json = serde_json::to_string(&check).unwrap();
        assert_eq!(json, r#"{"healthy":true,"responseTime":10}"#);
    }

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        init_start_time();
        let (status, body) = get_json::<Readiness>("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ready);
    }

    #[tokio::test]
    async fn test_health_database_returns_when_no_pool() {
        let (status, body) = get_json::<DatabaseCheck>("/health/database").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.healthy);
        assert!(body.error.is_some());
    }

    #[tokio::test]
    async fn test_health_ready_without_database_is_not_ready() {
        let (status, body) = get_json::<Readiness>("/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.ready);
    }
}
