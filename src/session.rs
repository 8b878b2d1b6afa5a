//! Cookie sessions and one-time flash messages.
//!
//! The cookie holds a signed token naming a random session id. Only the
//! SHA-256 of that id is stored, alongside the logged-in user (if any) and the
//! flash messages waiting for the next rendered page.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::config::CONFIG;
use crate::db::{self, models::User, sessions, users};
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "bloghub_session";

pub const LOGIN_PATH: &str = "/accounts/login/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }
}

/// Notification shown once on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sid: String,
    iat: i64,
    exp: i64,
}

fn generate_session_id() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

fn hash_session_id(sid: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sid.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn encode_cookie_token(sid: &str, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = SessionClaims {
        sid: sid.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(CONFIG.session_secret.as_bytes()),
    )
}

fn decode_cookie_token(token: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(CONFIG.session_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.sid)
}

/// Value of cookie `name` across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if CONFIG.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}

fn expired_cookie() -> String {
    session_cookie("", 0)
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

pub fn login_url(next: &str) -> String {
    if next.is_empty() {
        LOGIN_PATH.to_string()
    } else {
        format!("{LOGIN_PATH}?next={}", encode_component(next))
    }
}

/// Only same-site absolute paths are followed after login. Browsers drop
/// tabs and newlines from URLs, so any control character is refused.
pub fn is_safe_redirect(next: &str) -> bool {
    next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(char::is_control)
}

pub struct Session {
    sid: Option<String>,
    user: Option<User>,
    set_cookie: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            sid: None,
            user: None,
            set_cookie: None,
        }
    }

    /// Anonymous, and tell the browser to drop its stale cookie.
    fn cleared() -> Self {
        Self {
            set_cookie: Some(expired_cookie()),
            ..Self::anonymous()
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The logged-in user, or a redirect to the login page that returns to `next`.
    pub fn require_user(&self, next: &str) -> Result<User, AppError> {
        self.user.clone().ok_or_else(|| AppError::LoginRequired {
            next: next.to_string(),
        })
    }

    async fn start(
        &mut self,
        pool: &PgPool,
        user: Option<&User>,
        flash: &[Message],
    ) -> Result<String, AppError> {
        let sid = generate_session_id();
        let token_hash = hash_session_id(&sid);
        let ttl = Duration::days(CONFIG.session_ttl_days);

        sessions::create(pool, &token_hash, user.map(|u| u.id), flash, Utc::now() + ttl).await?;
        let token = encode_cookie_token(&sid, ttl).map_err(AppError::internal)?;

        self.set_cookie = Some(session_cookie(&token, ttl.num_seconds()));
        self.sid = Some(sid);
        Ok(token_hash)
    }

    async fn ensure(&mut self, pool: &PgPool) -> Result<String, AppError> {
        match &self.sid {
            Some(sid) => Ok(hash_session_id(sid)),
            None => self.start(pool, None, &[]).await,
        }
    }

    /// Queue a message for the next rendered page, opening an anonymous
    /// session when the visitor has none.
    pub async fn flash(
        &mut self,
        pool: &PgPool,
        level: Level,
        text: impl Into<String>,
    ) -> Result<(), AppError> {
        let token_hash = self.ensure(pool).await?;
        let message = Message {
            level,
            text: text.into(),
        };
        sessions::push_flash(pool, &token_hash, &message).await?;
        Ok(())
    }

    /// Pending messages; reading them clears them.
    pub async fn take_messages(&mut self, pool: &PgPool) -> Result<Vec<Message>, AppError> {
        match &self.sid {
            Some(sid) => Ok(sessions::take_flash(pool, &hash_session_id(sid)).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Rotate to a fresh session owned by `user`, carrying over pending messages.
    pub async fn login(&mut self, pool: &PgPool, user: User) -> Result<(), AppError> {
        let pending = match self.sid.take() {
            Some(sid) => {
                let token_hash = hash_session_id(&sid);
                let pending = sessions::take_flash(pool, &token_hash).await?;
                sessions::delete(pool, &token_hash).await?;
                pending
            }
            None => Vec::new(),
        };

        self.start(pool, Some(&user), &pending).await?;
        users::touch_last_login(pool, user.id).await?;
        tracing::info!(user = %user.username, "user logged in");
        self.user = Some(user);
        Ok(())
    }

    pub async fn logout(&mut self, pool: &PgPool) -> Result<(), AppError> {
        if let Some(sid) = self.sid.take() {
            sessions::delete(pool, &hash_session_id(&sid)).await?;
        }
        if let Some(user) = self.user.take() {
            tracing::info!(user = %user.username, "user logged out");
        }
        self.set_cookie = Some(expired_cookie());
        Ok(())
    }

    /// Attach any pending `Set-Cookie` to the response.
    pub fn respond(self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if let Some(cookie) = self.set_cookie {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::error!("Invalid session cookie header: {}", e),
            }
        }
        response
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = cookie_value(&parts.headers, SESSION_COOKIE) else {
            return Ok(Self::anonymous());
        };
        if token.is_empty() {
            return Ok(Self::anonymous());
        }
        let Some(pool) = db::get_pool() else {
            return Ok(Self::anonymous());
        };

        let sid = match decode_cookie_token(token) {
            Ok(sid) => sid,
            Err(e) => {
                tracing::debug!("Discarding invalid session cookie: {}", e);
                return Ok(Self::cleared());
            }
        };

        let Some(row) = sessions::find(&pool, &hash_session_id(&sid)).await? else {
            return Ok(Self::cleared());
        };

        let user = match row.user_id {
            Some(user_id) => users::find_by_id(&pool, user_id).await?,
            None => None,
        };

        Ok(Self {
            sid: Some(sid),
            user,
            set_cookie: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; bloghub_session=abc.def.ghi; lang=en"),
        );
        assert_eq!(cookie_value(&headers, SESSION_COOKIE), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_value_scans_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));
        assert_eq!(cookie_value(&headers, "b"), Some("2"));
    }

    #[test]
    fn test_cookie_token_decodes_to_same_session_id() {
        let sid = generate_session_id();
        assert_eq!(sid.len(), 64);
        let token = encode_cookie_token(&sid, Duration::days(1)).unwrap();
        assert_eq!(decode_cookie_token(&token).unwrap(), sid);
    }

    #[test]
    fn test_expired_or_tampered_token_is_rejected() {
        let token = encode_cookie_token("abc", Duration::days(-2)).unwrap();
        assert!(decode_cookie_token(&token).is_err());
        assert!(decode_cookie_token("not.a.token").is_err());
    }

    #[test]
    fn test_session_id_hash_is_hex_sha256() {
        let hash = hash_session_id("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_login_url_encodes_next() {
        assert_eq!(login_url(""), "/accounts/login/");
        assert_eq!(login_url("/create/"), "/accounts/login/?next=%2Fcreate%2F");
    }

    #[test]
    fn test_is_safe_redirect() {
        assert!(is_safe_redirect("/my-posts/"));
        assert!(!is_safe_redirect("//evil.example"));
        assert!(!is_safe_redirect("https://evil.example"));
        assert!(!is_safe_redirect("/\\evil.example"));
        assert!(!is_safe_redirect(""));
    }

    #[test]
    fn test_is_safe_redirect_refuses_control_characters() {
        for next in ["/\t/evil.example", "/\n/evil.example", "/\r/evil.example", "/posts/\u{7f}"] {
            assert!(!is_safe_redirect(next), "{next:?}");
        }
        assert!(is_safe_redirect("/post/hello-world/?page=2"));
    }

    #[test]
    fn test_require_user_redirects_anonymous() {
        let session = Session::anonymous();
        assert!(!session.is_authenticated());
        match session.require_user("/my-posts/") {
            Err(AppError::LoginRequired { next }) => assert_eq!(next, "/my-posts/"),
            other => panic!("expected login redirect, got {:?}", other.map(|u| u.username)),
        }
    }

    #[test]
    fn test_respond_sets_cookie_only_when_needed() {
        let res = Session::anonymous().respond("ok");
        assert!(res.headers().get(header::SET_COOKIE).is_none());

        let res = Session::cleared().respond("ok");
        let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("bloghub_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
