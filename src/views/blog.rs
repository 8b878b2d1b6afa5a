use crate::db::models::{
    Category, CategoryWithCount, CommentWithAuthor, Post, PostCard, PostStatus, Tag, User,
};
use crate::forms::{FormErrors, PostForm};
use crate::pagination::Page;
use crate::session::encode_component;
use crate::uploads::media_url;

use super::{
    escape_html, field_errors, format_date, input_field, linebreaks, non_field_errors, page,
    pagination_nav, render_content, textarea_field, truncate_words, Layout,
};

const EXCERPT_FALLBACK_WORDS: usize = 30;

/// Path of a post. The slug is percent-encoded so a path segment taken from
/// the request is always a valid `Location`.
pub fn post_url(slug: &str) -> String {
    format!("/post/{}/", encode_component(slug))
}

fn post_card(card: &PostCard) -> String {
    let post = &card.post;
    let image = post
        .featured_image
        .as_deref()
        .map(|img| {
            format!(
                r#"<a href="{}"><img src="{}" alt=""></a>"#,
                post_url(&post.slug),
                escape_html(&media_url(img))
            )
        })
        .unwrap_or_default();
    let category = match (&card.category_name, &card.category_slug) {
        (Some(name), Some(slug)) => format!(
            r#"<a class="badge" href="/category/{}/">{}</a>"#,
            slug,
            escape_html(name)
        ),
        _ => String::new(),
    };
    let summary = if post.excerpt.is_empty() {
        truncate_words(&post.content, EXCERPT_FALLBACK_WORDS)
    } else {
        post.excerpt.clone()
    };
    let draft = if post.is_published() {
        ""
    } else {
        r#" <span class="badge">Draft</span>"#
    };
    let date = post.published_at.unwrap_or(post.created_at);

    format!(
        r#"<article class="card">
      {image}
      {category}
      <h3><a href="{url}">{title}</a>{draft}</h3>
      <p>{summary}</p>
      <p class="meta">By {author} &middot; {date} &middot; {minutes} min read</p>
      <p class="meta">{views} views &middot; {likes} likes &middot; {comments} comments</p>
    </article>"#,
        url = post_url(&post.slug),
        title = escape_html(&post.title),
        summary = escape_html(&summary),
        author = escape_html(&card.author_username),
        date = format_date(&date),
        minutes = post.reading_time(),
        views = post.views,
        likes = card.like_count,
        comments = card.comment_count,
    )
}

fn card_grid(cards: &[PostCard], empty: &str) -> String {
    if cards.is_empty() {
        return format!(r#"<p class="empty">{}</p>"#, escape_html(empty));
    }
    let items: String = cards.iter().map(post_card).collect();
    format!(r#"<div class="cards">{items}</div>"#)
}

fn category_links(categories: &[Category]) -> String {
    let items: String = categories
        .iter()
        .map(|c| {
            format!(
                r#"<li><a href="/category/{}/">{}</a></li>"#,
                c.slug,
                escape_html(&c.name)
            )
        })
        .collect();
    format!(r#"<aside class="categories"><h2>Categories</h2><ul>{items}</ul></aside>"#)
}

pub fn home(layout: &Layout, posts: &Page<PostCard>, categories: &[Category], search: &str) -> String {
    let (heading, empty, query) = if search.is_empty() {
        ("Latest posts".to_string(), "No posts yet.".to_string(), String::new())
    } else {
        (
            format!("Results for “{}”", search),
            format!("No posts match “{}”.", search),
            format!("search={}", encode_component(search)),
        )
    };

    let body = format!(
        r#"<form method="get" action="/" class="search">
      <input type="text" name="search" value="{search}" placeholder="Search posts...">
      <button type="submit">Search</button>
    </form>
    <h1>{heading}</h1>
    {grid}
    {pagination}
    {categories}"#,
        search = escape_html(search),
        heading = escape_html(&heading),
        grid = card_grid(&posts.items, &empty),
        pagination = pagination_nav(&posts.info, &query),
        categories = category_links(categories),
    );
    page(layout, "Home", &body)
}

pub fn explore(
    layout: &Layout,
    trending: &[PostCard],
    popular: &[PostCard],
    categories: &[CategoryWithCount],
) -> String {
    let category_items: String = categories
        .iter()
        .map(|c| {
            format!(
                r#"<li><a href="/category/{}/">{}</a> <span class="meta">({} posts)</span></li>"#,
                c.category.slug,
                escape_html(&c.category.name),
                c.post_count
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Explore</h1>
    <section><h2>Trending</h2>{trending}</section>
    <section><h2>Most liked</h2>{popular}</section>
    <section><h2>Categories</h2><ul>{category_items}</ul></section>"#,
        trending = card_grid(trending, "Nothing trending yet."),
        popular = card_grid(popular, "No liked posts yet."),
    );
    page(layout, "Explore", &body)
}

/// Everything the post page shows.
pub struct PostDetail<'a> {
    pub card: &'a PostCard,
    pub tags: &'a [Tag],
    pub related: &'a [PostCard],
    pub comments: &'a [CommentWithAuthor],
    pub liked: bool,
    pub viewer: Option<&'a User>,
}

fn comment_html(comment: &CommentWithAuthor, viewer: Option<&User>) -> String {
    let delete = match viewer {
        Some(user) if comment.comment.is_authored_by(user) => format!(
            r#"<form method="post" action="/comment/{}/delete/" class="inline"><button type="submit" class="link">Delete</button></form>"#,
            comment.comment.id
        ),
        _ => String::new(),
    };
    format!(
        r#"<li class="comment" id="comment-{id}">
        <p class="meta"><strong>{author}</strong> &middot; {date} {delete}</p>
        {content}
      </li>"#,
        id = comment.comment.id,
        author = escape_html(&comment.author_username),
        date = format_date(&comment.comment.created_at),
        content = linebreaks(&comment.comment.content),
        delete = delete,
    )
}

const LIKE_SCRIPT: &str = r#"
document.querySelectorAll('[data-like-url]').forEach(function (button) {
  button.addEventListener('click', function () {
    fetch(button.dataset.likeUrl, { method: 'POST', credentials: 'same-origin' })
      .then(function (res) {
        if (res.redirected || !res.ok) { window.location = '/accounts/login/?next=' + encodeURIComponent(window.location.pathname); return null; }
        return res.json();
      })
      .then(function (data) {
        if (!data) { return; }
        button.textContent = (data.liked ? 'Unlike' : 'Like') + ' (' + data.total_likes + ')';
      });
  });
});
"#;

pub fn post_detail(layout: &Layout, detail: &PostDetail<'_>) -> String {
    let card = detail.card;
    let post = &card.post;

    let image = post
        .featured_image
        .as_deref()
        .map(|img| format!(r#"<img class="cover" src="{}" alt="">"#, escape_html(&media_url(img))))
        .unwrap_or_default();
    let category = match (&card.category_name, &card.category_slug) {
        (Some(name), Some(slug)) => format!(
            r#"<a class="badge" href="/category/{}/">{}</a>"#,
            slug,
            escape_html(name)
        ),
        _ => String::new(),
    };
    let tags: String = detail
        .tags
        .iter()
        .map(|t| format!(r#"<span class="badge">#{}</span> "#, escape_html(&t.name)))
        .collect();

    let owner_actions = match detail.viewer {
        Some(user) if post.is_authored_by(user) => format!(
            r#"<p><a href="/post/{slug}/edit/">Edit</a> &middot; <a href="/post/{slug}/delete/">Delete</a></p>"#,
            slug = post.slug
        ),
        _ => String::new(),
    };

    let like = match detail.viewer {
        Some(_) => format!(
            r#"<button type="button" data-like-url="/post/{}/like/">{} ({})</button>"#,
            post.slug,
            if detail.liked { "Unlike" } else { "Like" },
            card.like_count
        ),
        None => format!(
            r#"<p class="meta">{} likes &middot; <a href="/accounts/login/?next={}">Log in</a> to like this post.</p>"#,
            card.like_count,
            encode_component(&post_url(&post.slug))
        ),
    };

    let comment_form = match detail.viewer {
        Some(_) => format!(
            r#"<form method="post" action="/post/{}/comment/">
        <div class="field">
          <textarea name="content" rows="4" placeholder="Share your thoughts..." required></textarea>
        </div>
        <button type="submit">Post comment</button>
      </form>"#,
            post.slug
        ),
        None => format!(
            r#"<p><a href="/accounts/login/?next={}">Log in</a> to join the discussion.</p>"#,
            encode_component(&post_url(&post.slug))
        ),
    };

    let comments: String = detail
        .comments
        .iter()
        .map(|c| comment_html(c, detail.viewer))
        .collect();

    let draft = if post.is_published() {
        ""
    } else {
        r#"<p class="alert alert-warning">This post is a draft and only visible to you.</p>"#
    };
    let date = post.published_at.unwrap_or(post.created_at);

    let body = format!(
        r#"<article class="post">
      {draft}
      {category}
      <h1>{title}</h1>
      <p class="meta">By {author} &middot; {date} &middot; {minutes} min read &middot; {views} views</p>
      {owner_actions}
      {image}
      <div class="content">{content}</div>
      <p>{tags}</p>
      {like}
    </article>
    <section class="comments">
      <h2>Comments ({comment_count})</h2>
      {comment_form}
      <ul>{comments}</ul>
    </section>
    <section class="related">
      <h2>Related posts</h2>
      {related}
    </section>
    <script>{LIKE_SCRIPT}</script>"#,
        title = escape_html(&post.title),
        author = escape_html(&card.author_username),
        date = format_date(&date),
        minutes = post.reading_time(),
        views = post.views,
        content = render_content(&post.content),
        comment_count = detail.comments.len(),
        related = card_grid(detail.related, "No related posts."),
    );
    page(layout, &post.title, &body)
}

/// Whether the post form creates a new post or updates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    Create,
    Update,
}

impl FormAction {
    fn label(&self) -> &'static str {
        match self {
            FormAction::Create => "Create",
            FormAction::Update => "Update",
        }
    }
}

pub struct PostFormPage<'a> {
    pub action: FormAction,
    pub form: &'a PostForm,
    pub errors: &'a FormErrors,
    pub categories: &'a [Category],
    pub tags: &'a [Tag],
    pub post: Option<&'a Post>,
}

pub fn post_form(layout: &Layout, view: &PostFormPage<'_>) -> String {
    let form = view.form;
    let errors = view.errors;

    let target = match (view.action, view.post) {
        (FormAction::Update, Some(post)) => format!("/post/{}/edit/", post.slug),
        _ => "/create/".to_string(),
    };

    let category_options: String = view
        .categories
        .iter()
        .map(|c| {
            let id = c.id.to_string();
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                id,
                if form.category == id { " selected" } else { "" },
                escape_html(&c.name)
            )
        })
        .collect();
    let tag_options: String = view
        .tags
        .iter()
        .map(|t| {
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                t.id,
                if form.has_tag(t.id) { " selected" } else { "" },
                escape_html(&t.name)
            )
        })
        .collect();
    let status_options: String = PostStatus::ALL
        .iter()
        .map(|s| {
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                s.as_str(),
                if form.status == s.as_str() { " selected" } else { "" },
                s.label()
            )
        })
        .collect();

    let current_image = view
        .post
        .and_then(|p| p.featured_image.as_deref())
        .map(|img| {
            format!(
                r#"<p class="meta">Current image: <a href="{0}">{0}</a></p>"#,
                escape_html(&media_url(img))
            )
        })
        .unwrap_or_default();

    let cancel = match view.post {
        Some(post) => post_url(&post.slug),
        None => "/".to_string(),
    };

    let body = format!(
        r#"<h1>{label} post</h1>
    <form method="post" action="{target}" enctype="multipart/form-data">
      {non_field}
      {title}
      {slug}
      <div class="field">
        <label for="id_category">Category</label>
        <select name="category" id="id_category">
          <option value="">---------</option>
          {category_options}
        </select>
        {category_errors}
      </div>
      <div class="field">
        <label for="id_tags">Tags</label>
        <select name="tags" id="id_tags" multiple size="5">{tag_options}</select>
        {tag_errors}
      </div>
      {content}
      {excerpt}
      <div class="field">
        <label for="id_featured_image">Featured image</label>
        {current_image}
        <input type="file" name="featured_image" id="id_featured_image" accept="image/*">
        {image_errors}
      </div>
      <div class="field">
        <label for="id_status">Status</label>
        <select name="status" id="id_status">{status_options}</select>
        {status_errors}
      </div>
      <button type="submit">{label} post</button>
      <a href="{cancel}">Cancel</a>
    </form>"#,
        label = view.action.label(),
        non_field = non_field_errors(errors),
        title = input_field(
            errors,
            "title",
            "Title",
            "text",
            &form.title,
            r#"maxlength="250" placeholder="Enter an engaging title for your post" required"#
        ),
        slug = input_field(
            errors,
            "slug",
            "Slug",
            "text",
            &form.slug,
            r#"maxlength="250" placeholder="url-friendly-slug (derived from the title when blank)""#
        ),
        category_errors = field_errors(errors, "category"),
        tag_errors = field_errors(errors, "tags"),
        content = textarea_field(
            errors,
            "content",
            "Content",
            &form.content,
            15,
            "Write your amazing content here..."
        ),
        excerpt = textarea_field(
            errors,
            "excerpt",
            "Excerpt",
            &form.excerpt,
            3,
            "Brief summary (shown in post previews)"
        ),
        image_errors = field_errors(errors, "featured_image"),
        status_errors = field_errors(errors, "status"),
    );
    page(layout, &format!("{} post", view.action.label()), &body)
}

pub fn confirm_delete(layout: &Layout, post: &Post) -> String {
    let body = format!(
        r#"<h1>Delete post</h1>
    <p>Are you sure you want to delete “{title}”? This cannot be undone.</p>
    <form method="post" action="/post/{slug}/delete/">
      <button type="submit">Yes, delete</button>
      <a href="{url}">Cancel</a>
    </form>"#,
        title = escape_html(&post.title),
        slug = post.slug,
        url = post_url(&post.slug),
    );
    page(layout, "Delete post", &body)
}

pub fn category_posts(layout: &Layout, category: &Category, posts: &Page<PostCard>) -> String {
    let body = format!(
        r#"<h1>{name}</h1>
    <p>{description}</p>
    {grid}
    {pagination}"#,
        name = escape_html(&category.name),
        description = escape_html(&category.description),
        grid = card_grid(&posts.items, "No posts in this category yet."),
        pagination = pagination_nav(&posts.info, ""),
    );
    page(layout, &category.name, &body)
}

pub fn my_posts(layout: &Layout, posts: &Page<PostCard>) -> String {
    let rows: String = posts
        .items
        .iter()
        .map(|card| {
            let post = &card.post;
            format!(
                r#"<tr>
          <td><a href="{url}">{title}</a></td>
          <td>{status}</td>
          <td>{date}</td>
          <td>{views}</td>
          <td>{likes}</td>
          <td>{comments}</td>
          <td><a href="/post/{slug}/edit/">Edit</a> &middot; <a href="/post/{slug}/delete/">Delete</a></td>
        </tr>"#,
                url = post_url(&post.slug),
                title = escape_html(&post.title),
                status = post.status().label(),
                date = format_date(&post.created_at),
                views = post.views,
                likes = card.like_count,
                comments = card.comment_count,
                slug = post.slug,
            )
        })
        .collect();

    let table = if posts.is_empty() {
        r#"<p class="empty">You haven't written anything yet. <a href="/create/">Write your first post</a>.</p>"#
            .to_string()
    } else {
        format!(
            r#"<table class="posts">
      <thead><tr><th>Title</th><th>Status</th><th>Created</th><th>Views</th><th>Likes</th><th>Comments</th><th></th></tr></thead>
      <tbody>{rows}</tbody>
    </table>"#
        )
    };

    let body = format!(
        r#"<h1>My posts</h1>
    <p class="meta">{total} posts</p>
    {table}
    {pagination}"#,
        total = posts.info.total,
        pagination = pagination_nav(&posts.info, ""),
    );
    page(layout, "My posts", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageInfo;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_post_url_encodes_unusual_slugs() {
        assert_eq!(post_url("hello-world"), "/post/hello-world/");
        assert_eq!(post_url("a\nb"), "/post/a%0Ab/");
        assert!(axum::http::HeaderValue::from_str(&post_url("a\r\nb c")).is_ok());
    }

    fn layout() -> Layout {
        Layout {
            site_name: "BlogHub".to_string(),
            user: None,
            messages: Vec::new(),
        }
    }

    fn card(title: &str, status: PostStatus) -> PostCard {
        PostCard {
            post: Post {
                id: 1,
                title: title.to_string(),
                slug: "a-post".to_string(),
                author_id: Uuid::new_v4(),
                category_id: None,
                content: "word ".repeat(410),
                excerpt: String::new(),
                featured_image: None,
                status: status.as_str().to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                published_at: None,
                views: 7,
            },
            author_username: "john_doe".to_string(),
            category_name: Some("Tech".to_string()),
            category_slug: Some("tech".to_string()),
            like_count: 2,
            comment_count: 0,
        }
    }

    #[test]
    fn test_card_escapes_title_and_shows_reading_time() {
        let html = post_card(&card("<b>Hi</b>", PostStatus::Published));
        assert!(html.contains("&lt;b&gt;Hi&lt;/b&gt;"));
        assert!(html.contains("3 min read"));
        assert!(html.contains(r#"href="/category/tech/""#));
        assert!(!html.contains("Draft"));
    }

    #[test]
    fn test_card_marks_drafts() {
        assert!(post_card(&card("Mine", PostStatus::Draft)).contains("Draft"));
    }

    #[test]
    fn test_home_keeps_search_in_pagination() {
        let cards: Vec<PostCard> = (0..6).map(|_| card("Hi", PostStatus::Published)).collect();
        let posts = Page::new(cards, PageInfo::resolve(None, 13, 6));
        let html = home(&layout(), &posts, &[], "rust & go");
        assert!(html.contains("?search=rust%20%26%20go&amp;page=2"));
        assert!(html.contains(r#"value="rust &amp; go""#));
    }

    #[test]
    fn test_home_empty_state() {
        let posts = Page::new(Vec::new(), PageInfo::resolve(None, 0, 6));
        assert!(home(&layout(), &posts, &[], "").contains("No posts yet."));
    }

    #[test]
    fn test_post_form_preselects_values() {
        let form = PostForm {
            category: "2".to_string(),
            tags: vec!["5".to_string()],
            status: "published".to_string(),
            ..PostForm::default()
        };
        let categories = vec![Category {
            id: 2,
            name: "Tech".to_string(),
            slug: "tech".to_string(),
            description: String::new(),
            created_at: Utc::now(),
        }];
        let tags = vec![Tag {
            id: 5,
            name: "Rust".to_string(),
            slug: "rust".to_string(),
        }];
        let errors = FormErrors::default();
        let html = post_form(
            &layout(),
            &PostFormPage {
                action: FormAction::Create,
                form: &form,
                errors: &errors,
                categories: &categories,
                tags: &tags,
                post: None,
            },
        );
        assert!(html.contains(r#"<option value="2" selected>Tech</option>"#));
        assert!(html.contains(r#"<option value="5" selected>Rust</option>"#));
        assert!(html.contains(r#"<option value="published" selected>Published</option>"#));
        assert!(html.contains(r#"action="/create/""#));
    }
}
