//! Request handlers, one module per area of the site.

pub mod accounts;
pub mod blog;
pub mod health;

use axum::{
    http::Uri,
    response::{Html, Redirect, Response},
};
use serde::Deserialize;
use sqlx::PgPool;

use crate::error::AppError;
use crate::session::Session;
use crate::views::Layout;

/// `?page=` and `?search=` on list pages. Kept as strings so a malformed
/// value falls back to defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub search: Option<String>,
}

/// 303 to `to`, carrying any session cookie change.
pub fn redirect(session: Session, to: &str) -> Response {
    session.respond(Redirect::to(to))
}

pub fn html(session: Session, body: String) -> Response {
    session.respond(Html(body))
}

pub async fn load_layout(session: &mut Session, pool: &PgPool) -> Result<Layout, AppError> {
    Layout::load(session, Some(pool)).await
}

/// Path and query of the current request, used as the post-login target.
pub fn request_path(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}
