//! Server-rendered HTML.
//!
//! Pages are assembled with `format!`; every interpolated user value goes
//! through [`escape_html`] unless it was sanitised by [`render_content`].

pub mod accounts;
pub mod blog;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::config::CONFIG;
use crate::db::models::User;
use crate::error::AppError;
use crate::forms::FormErrors;
use crate::pagination::PageInfo;
use crate::session::{Level, Message, Session};

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

pub fn format_date(dt: &DateTime<Utc>) -> String {
    dt.format("%b %-d, %Y").to_string()
}

/// First `words` words of `text`, with an ellipsis when cut.
pub fn truncate_words(text: &str, words: usize) -> String {
    let mut parts = text.split_whitespace();
    let kept: Vec<&str> = parts.by_ref().take(words).collect();
    let mut out = kept.join(" ");
    if parts.next().is_some() {
        out.push_str(" …");
    }
    out
}

fn paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.replace('\n', "<br>"))
        .collect()
}

/// Plain text as escaped `<p>` paragraphs, single newlines as `<br>`.
pub fn linebreaks(text: &str) -> String {
    paragraphs(&escape_html(text))
        .into_iter()
        .map(|p| format!("<p>{p}</p>"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Post body: paragraphs as in [`linebreaks`], author HTML kept only where
/// the sanitiser allows it.
pub fn render_content(content: &str) -> String {
    let html = paragraphs(content)
        .into_iter()
        .map(|p| format!("<p>{p}</p>"))
        .collect::<Vec<_>>()
        .join("\n");
    ammonia::clean(&html)
}

/// Chrome shared by every page: who is logged in and the pending messages.
#[derive(Debug, Clone)]
pub struct Layout {
    pub site_name: String,
    pub user: Option<User>,
    pub messages: Vec<Message>,
}

impl Layout {
    /// Consumes the session's pending messages. Without a pool only the user
    /// is known.
    pub async fn load(session: &mut Session, pool: Option<&PgPool>) -> Result<Self, AppError> {
        let messages = match pool {
            Some(pool) => session.take_messages(pool).await?,
            None => Vec::new(),
        };
        Ok(Self {
            site_name: CONFIG.site_name.clone(),
            user: session.user().cloned(),
            messages,
        })
    }

    /// Show a message on this page without storing it.
    pub fn push(&mut self, level: Level, text: impl Into<String>) {
        self.messages.push(Message {
            level,
            text: text.into(),
        });
    }

    fn nav(&self) -> String {
        let account = match &self.user {
            Some(user) => format!(
                r#"<a href="/create/">Write</a>
      <a href="/my-posts/">My posts</a>
      <a href="/accounts/profile/">{}</a>
      <form method="post" action="/accounts/logout/" class="inline"><button type="submit" class="link">Log out</button></form>"#,
                escape_html(&user.username)
            ),
            None => r#"<a href="/accounts/login/">Log in</a>
      <a href="/accounts/signup/" class="button">Sign up</a>"#
                .to_string(),
        };
        format!(
            r#"<nav class="site-nav">
    <a href="/" class="brand">{}</a>
    <a href="/">Home</a>
    <a href="/explore/">Explore</a>
    <span class="spacer"></span>
    {}
  </nav>"#,
            escape_html(&self.site_name),
            account
        )
    }

    fn messages_html(&self) -> String {
        if self.messages.is_empty() {
            return String::new();
        }
        let items: String = self
            .messages
            .iter()
            .map(|m| {
                format!(
                    r#"<li class="alert alert-{}">{}</li>"#,
                    m.level.as_str(),
                    escape_html(&m.text)
                )
            })
            .collect();
        format!(r#"<ul class="messages">{items}</ul>"#)
    }
}

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; color: #222; background: #fafafa; }
main { max-width: 960px; margin: 0 auto; padding: 1.5rem; }
.site-nav { display: flex; gap: 1rem; align-items: center; padding: .75rem 1.5rem; background: #fff; border-bottom: 1px solid #e5e5e5; }
.site-nav .brand { font-weight: 700; }
.site-nav .spacer { flex: 1; }
a { color: #2458c6; text-decoration: none; }
.inline { display: inline; }
button.link { background: none; border: 0; color: #2458c6; cursor: pointer; padding: 0; font: inherit; }
.messages { list-style: none; padding: 0; }
.alert { padding: .75rem 1rem; border-radius: 4px; margin-bottom: .5rem; }
.alert-success { background: #e6f4ea; } .alert-error { background: #fdecea; }
.alert-info { background: #e8f0fe; } .alert-warning { background: #fff4e5; }
.cards { display: grid; grid-template-columns: repeat(auto-fill, minmax(260px, 1fr)); gap: 1rem; }
.card { background: #fff; border: 1px solid #e5e5e5; border-radius: 6px; padding: 1rem; }
.card img, .cover { max-width: 100%; border-radius: 4px; }
.meta { color: #666; font-size: .875rem; }
.badge { display: inline-block; padding: .1rem .5rem; border-radius: 999px; background: #eef; font-size: .8rem; }
.errorlist { color: #b00020; margin: .25rem 0; padding-left: 1rem; }
.field { margin-bottom: 1rem; }
.field label { display: block; font-weight: 600; margin-bottom: .25rem; }
.field input[type=text], .field input[type=email], .field input[type=password], .field input[type=url], .field textarea, .field select { width: 100%; padding: .5rem; box-sizing: border-box; }
.pagination { display: flex; gap: .75rem; margin: 1.5rem 0; align-items: center; }
"#;

/// Full document around `body`.
pub fn page(layout: &Layout, title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title} | {site}</title>
  <style>{STYLE}</style>
</head>
<body>
  {nav}
  <main>
    {messages}
    {body}
  </main>
</body>
</html>"#,
        title = escape_html(title),
        site = escape_html(&layout.site_name),
        nav = layout.nav(),
        messages = layout.messages_html(),
        body = body,
    )
}

/// Standalone page for error responses; no session is available there.
pub fn error_page(status: StatusCode, title: &str, message: &str) -> String {
    let layout = Layout {
        site_name: CONFIG.site_name.clone(),
        user: None,
        messages: Vec::new(),
    };
    page(
        &layout,
        title,
        &format!(
            r#"<section class="error">
      <h1>{} {}</h1>
      <p>{}</p>
      <p><a href="/">Back to the home page</a></p>
    </section>"#,
            status.as_u16(),
            escape_html(title),
            escape_html(message)
        ),
    )
}

/// Previous/next links preserving `extra_query` (already URL-encoded,
/// e.g. `search=rust`).
pub fn pagination_nav(info: &PageInfo, extra_query: &str) -> String {
    if !info.has_other_pages() {
        return String::new();
    }
    let href = |page: i64| {
        if extra_query.is_empty() {
            format!("?page={page}")
        } else {
            format!("?{extra_query}&amp;page={page}")
        }
    };

    let mut out = String::from(r#"<nav class="pagination">"#);
    if info.has_previous() {
        out.push_str(&format!(
            r#"<a href="{}">&laquo; first</a><a href="{}">previous</a>"#,
            href(1),
            href(info.number - 1)
        ));
    }
    out.push_str(&format!(
        r#"<span class="current">Page {} of {}</span>"#,
        info.number, info.num_pages
    ));
    if info.has_next() {
        out.push_str(&format!(
            r#"<a href="{}">next</a><a href="{}">last &raquo;</a>"#,
            href(info.number + 1),
            href(info.num_pages)
        ));
    }
    out.push_str("</nav>");
    out
}

fn error_list(messages: &[String]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let items: String = messages
        .iter()
        .map(|m| format!("<li>{}</li>", escape_html(m)))
        .collect();
    format!(r#"<ul class="errorlist">{items}</ul>"#)
}

pub fn field_errors(errors: &FormErrors, field: &str) -> String {
    error_list(errors.field(field))
}

pub fn non_field_errors(errors: &FormErrors) -> String {
    error_list(errors.non_field())
}

/// Labelled `<input>` with its errors.
pub fn input_field(
    errors: &FormErrors,
    name: &str,
    label: &str,
    input_type: &str,
    value: &str,
    attrs: &str,
) -> String {
    format!(
        r#"<div class="field">
      <label for="id_{name}">{label}</label>
      <input type="{input_type}" name="{name}" id="id_{name}" value="{value}" {attrs}>
      {errors}
    </div>"#,
        label = escape_html(label),
        value = escape_html(value),
        errors = field_errors(errors, name),
    )
}

/// Labelled `<textarea>` with its errors.
pub fn textarea_field(
    errors: &FormErrors,
    name: &str,
    label: &str,
    value: &str,
    rows: u32,
    placeholder: &str,
) -> String {
    format!(
        r#"<div class="field">
      <label for="id_{name}">{label}</label>
      <textarea name="{name}" id="id_{name}" rows="{rows}" placeholder="{placeholder}">{value}</textarea>
      {errors}
    </div>"#,
        label = escape_html(label),
        placeholder = escape_html(placeholder),
        value = escape_html(value),
        errors = field_errors(errors, name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_linebreaks_escapes_and_splits() {
        assert_eq!(
            linebreaks("one\ntwo\n\n<three>"),
            "<p>one<br>two</p>\n<p>&lt;three&gt;</p>"
        );
    }

    #[test]
    fn test_render_content_strips_scripts() {
        let html = render_content("Hello <strong>world</strong><script>alert(1)</script>");
        assert!(html.contains("<strong>world</strong>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("a b c d", 2), "a b …");
        assert_eq!(truncate_words("a b", 5), "a b");
    }

    #[test]
    fn test_pagination_nav() {
        let single = PageInfo::resolve(None, 3, 6);
        assert_eq!(pagination_nav(&single, ""), "");

        let middle = PageInfo::resolve(Some("2"), 20, 6);
        let nav = pagination_nav(&middle, "search=rust");
        assert!(nav.contains(r#"href="?search=rust&amp;page=1""#));
        assert!(nav.contains(r#"href="?search=rust&amp;page=3""#));
        assert!(nav.contains("Page 2 of 4"));
    }

    #[test]
    fn test_page_shows_messages_and_user_nav() {
        let mut layout = Layout {
            site_name: "BlogHub".to_string(),
            user: None,
            messages: Vec::new(),
        };
        layout.push(Level::Success, "Saved <ok>");
        let html = page(&layout, "Home", "<p>body</p>");
        assert!(html.contains(r#"<li class="alert alert-success">Saved &lt;ok&gt;</li>"#));
        assert!(html.contains("/accounts/login/"));
        assert!(html.contains("<title>Home | BlogHub</title>"));
    }

    #[test]
    fn test_error_page_mentions_status() {
        let html = error_page(StatusCode::NOT_FOUND, "Page not found", "Gone");
        assert!(html.contains("404 Page not found"));
    }
}
