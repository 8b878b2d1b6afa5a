use axum::{
    extract::{Multipart, Path, Query},
    http::Uri,
    response::Response,
    Form, Json,
};
use sqlx::PgPool;

use crate::db::{
    self, comments,
    models::{Post, User},
    posts, taxonomy,
};
use crate::error::{is_unique_violation, AppError};
use crate::forms::{CommentForm, FormErrors, MultipartFields, PostForm};
use crate::pagination::{Page, PageInfo};
use crate::session::{Level, Session};
use crate::uploads::{self, MediaFolder};
use crate::views::{
    self,
    blog::{post_url, FormAction, PostDetail, PostFormPage},
};

use super::{html, load_layout, redirect, request_path, ListQuery};

const HOME_PAGE_SIZE: i64 = 6;
const CATEGORY_PAGE_SIZE: i64 = 6;
const MY_POSTS_PAGE_SIZE: i64 = 10;
const EXPLORE_LIMIT: i64 = 6;
const RELATED_LIMIT: i64 = 3;

const FORM_INVALID: &str = "Please fix the errors in the form below.";
const SLUG_TAKEN: &str = "Post with this Slug already exists.";

/// GET / - published posts, optionally searched
pub async fn home(
    mut session: Session,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let pool = db::require_pool()?;
    let search = query.search.as_deref().map(str::trim).unwrap_or("");
    let filter = (!search.is_empty()).then_some(search);

    let total = posts::count_published(&pool, filter).await?;
    let info = PageInfo::resolve(query.page.as_deref(), total, HOME_PAGE_SIZE);
    let items = posts::list_published(&pool, filter, info.limit(), info.offset()).await?;
    let categories = taxonomy::all_categories(&pool).await?;

    let layout = load_layout(&mut session, &pool).await?;
    let body = views::blog::home(&layout, &Page::new(items, info), &categories, search);
    Ok(html(session, body))
}

/// GET /explore/ - most viewed, most liked, categories with counts
pub async fn explore(mut session: Session) -> Result<Response, AppError> {
    let pool = db::require_pool()?;
    let trending = posts::trending(&pool, EXPLORE_LIMIT).await?;
    let popular = posts::popular(&pool, EXPLORE_LIMIT).await?;
    let categories = taxonomy::categories_with_counts(&pool).await?;

    let layout = load_layout(&mut session, &pool).await?;
    let body = views::blog::explore(&layout, &trending, &popular, &categories);
    Ok(html(session, body))
}

/// GET /post/{slug}/
///
/// Drafts are only shown to their author; everyone else gets a 404.
pub async fn post_detail(
    mut session: Session,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let pool = db::require_pool()?;
    let mut card = posts::card_by_slug(&pool, &slug)
        .await?
        .ok_or(AppError::NotFound)?;

    let is_author = session.user().is_some_and(|u| card.post.is_authored_by(u));
    if !card.post.is_published() && !is_author {
        return Err(AppError::NotFound);
    }

    card.post.views = posts::increment_views(&pool, card.post.id).await?;

    let tags = taxonomy::tags_for_post(&pool, card.post.id).await?;
    let related = posts::related(&pool, &card.post, RELATED_LIMIT).await?;
    let comments = comments::for_post(&pool, card.post.id).await?;
    let liked = match session.user() {
        Some(user) => posts::is_liked_by(&pool, card.post.id, user.id).await?,
        None => false,
    };

    let layout = load_layout(&mut session, &pool).await?;
    let body = views::blog::post_detail(
        &layout,
        &PostDetail {
            card: &card,
            tags: &tags,
            related: &related,
            comments: &comments,
            liked,
            viewer: layout.user.as_ref(),
        },
    );
    Ok(html(session, body))
}

async fn render_post_form(
    mut session: Session,
    pool: &PgPool,
    action: FormAction,
    form: &PostForm,
    errors: &FormErrors,
    post: Option<&Post>,
) -> Result<Response, AppError> {
    let categories = taxonomy::all_categories(pool).await?;
    let tags = taxonomy::all_tags(pool).await?;

    let mut layout = load_layout(&mut session, pool).await?;
    if !errors.is_empty() {
        layout.push(Level::Error, FORM_INVALID);
    }
    let body = views::blog::post_form(
        &layout,
        &PostFormPage {
            action,
            form,
            errors,
            categories: &categories,
            tags: &tags,
            post,
        },
    );
    Ok(html(session, body))
}

/// GET /create/
pub async fn create_form(session: Session) -> Result<Response, AppError> {
    session.require_user("/create/")?;
    let pool = db::require_pool()?;
    render_post_form(
        session,
        &pool,
        FormAction::Create,
        &PostForm::default(),
        &FormErrors::default(),
        None,
    )
    .await
}

/// POST /create/
pub async fn create_submit(
    mut session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let user = session.require_user("/create/")?;
    let pool = db::require_pool()?;
    let form = PostForm::from_fields(MultipartFields::read(multipart).await?);

    let cleaned = match form.clean(&pool, None).await? {
        Ok(cleaned) => cleaned,
        Err(errors) => {
            return render_post_form(session, &pool, FormAction::Create, &form, &errors, None)
                .await;
        }
    };

    let mut draft = cleaned.draft;
    if let Some(image) = &cleaned.image {
        draft.featured_image = Some(uploads::store_image(MediaFolder::Blog, image).await?);
    }

    let post = match posts::create(&pool, user.id, &draft).await {
        Ok(post) => post,
        Err(e) if is_unique_violation(&e) => {
            if let Some(path) = &draft.featured_image {
                uploads::remove_image(path).await;
            }
            let mut errors = FormErrors::default();
            errors.add("slug", SLUG_TAKEN);
            return render_post_form(session, &pool, FormAction::Create, &form, &errors, None)
                .await;
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user = %user.username, post = %post.slug, status = %post.status, "post created");
    session
        .flash(
            &pool,
            Level::Success,
            format!("Post \"{}\" created successfully!", post.title),
        )
        .await?;
    Ok(redirect(session, &post_url(&post.slug)))
}

/// The post named by `slug` if `user` wrote it. Otherwise flashes `denied`
/// and returns `None`; the caller redirects to the post.
async fn authored_post(
    session: &mut Session,
    pool: &PgPool,
    user: &User,
    slug: &str,
    denied: &str,
) -> Result<Option<Post>, AppError> {
    let post = posts::find_by_slug(pool, slug)
        .await?
        .ok_or(AppError::NotFound)?;

    if post.is_authored_by(user) {
        return Ok(Some(post));
    }

    tracing::warn!(user = %user.username, post = %post.slug, "rejected change to another user's post");
    session.flash(pool, Level::Error, denied).await?;
    Ok(None)
}

/// GET /post/{slug}/edit/
pub async fn edit_form(
    mut session: Session,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let user = session.require_user(&format!("/post/{slug}/edit/"))?;
    let pool = db::require_pool()?;
    let Some(post) = authored_post(
        &mut session,
        &pool,
        &user,
        &slug,
        "You can only edit your own posts.",
    )
    .await?
    else {
        return Ok(redirect(session, &post_url(&slug)));
    };

    let tag_ids = posts::tag_ids(&pool, post.id).await?;
    let form = PostForm::from_post(&post, &tag_ids);
    render_post_form(
        session,
        &pool,
        FormAction::Update,
        &form,
        &FormErrors::default(),
        Some(&post),
    )
    .await
}

/// POST /post/{slug}/edit/
pub async fn edit_submit(
    mut session: Session,
    Path(slug): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let user = session.require_user(&format!("/post/{slug}/edit/"))?;
    let pool = db::require_pool()?;
    let Some(post) = authored_post(
        &mut session,
        &pool,
        &user,
        &slug,
        "You can only edit your own posts.",
    )
    .await?
    else {
        return Ok(redirect(session, &post_url(&slug)));
    };

    let form = PostForm::from_fields(MultipartFields::read(multipart).await?);
    let cleaned = match form.clean(&pool, Some(post.id)).await? {
        Ok(cleaned) => cleaned,
        Err(errors) => {
            return render_post_form(
                session,
                &pool,
                FormAction::Update,
                &form,
                &errors,
                Some(&post),
            )
            .await;
        }
    };

    let mut draft = cleaned.draft;
    let new_image = match &cleaned.image {
        Some(image) => Some(uploads::store_image(MediaFolder::Blog, image).await?),
        None => None,
    };
    draft.featured_image = new_image.clone().or_else(|| post.featured_image.clone());

    let updated = match posts::update(&pool, post.id, &draft).await {
        Ok(updated) => updated,
        Err(e) if is_unique_violation(&e) => {
            if let Some(path) = &new_image {
                uploads::remove_image(path).await;
            }
            let mut errors = FormErrors::default();
            errors.add("slug", SLUG_TAKEN);
            return render_post_form(
                session,
                &pool,
                FormAction::Update,
                &form,
                &errors,
                Some(&post),
            )
            .await;
        }
        Err(e) => return Err(e.into()),
    };

    if let (Some(_), Some(old)) = (&new_image, &post.featured_image) {
        uploads::remove_image(old).await;
    }

    tracing::info!(user = %user.username, post = %updated.slug, status = %updated.status, "post updated");
    session
        .flash(&pool, Level::Success, "Post updated successfully!")
        .await?;
    Ok(redirect(session, &post_url(&updated.slug)))
}

/// GET /post/{slug}/delete/ - confirmation page
pub async fn delete_confirm(
    mut session: Session,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let user = session.require_user(&format!("/post/{slug}/delete/"))?;
    let pool = db::require_pool()?;
    let Some(post) = authored_post(
        &mut session,
        &pool,
        &user,
        &slug,
        "You can only delete your own posts.",
    )
    .await?
    else {
        return Ok(redirect(session, &post_url(&slug)));
    };

    let layout = load_layout(&mut session, &pool).await?;
    let body = views::blog::confirm_delete(&layout, &post);
    Ok(html(session, body))
}

/// POST /post/{slug}/delete/
pub async fn delete_submit(
    mut session: Session,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let user = session.require_user(&format!("/post/{slug}/delete/"))?;
    let pool = db::require_pool()?;
    let Some(post) = authored_post(
        &mut session,
        &pool,
        &user,
        &slug,
        "You can only delete your own posts.",
    )
    .await?
    else {
        return Ok(redirect(session, &post_url(&slug)));
    };

    if posts::delete(&pool, post.id).await? {
        if let Some(path) = &post.featured_image {
            uploads::remove_image(path).await;
        }
        tracing::info!(user = %user.username, post = %post.slug, "post deleted");
    }

    session
        .flash(&pool, Level::Success, "Post deleted successfully!")
        .await?;
    Ok(redirect(session, "/"))
}

/// GET /category/{slug}/
pub async fn category_posts(
    mut session: Session,
    Path(slug): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let pool = db::require_pool()?;
    let category = taxonomy::category_by_slug(&pool, &slug)
        .await?
        .ok_or(AppError::NotFound)?;

    let total = posts::count_in_category(&pool, category.id).await?;
    let info = PageInfo::resolve(query.page.as_deref(), total, CATEGORY_PAGE_SIZE);
    let items = posts::list_in_category(&pool, category.id, info.limit(), info.offset()).await?;

    let layout = load_layout(&mut session, &pool).await?;
    let body = views::blog::category_posts(&layout, &category, &Page::new(items, info));
    Ok(html(session, body))
}

/// GET /my-posts/ - the user's posts, drafts included
pub async fn my_posts(
    mut session: Session,
    uri: Uri,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let user = session.require_user(&request_path(&uri))?;
    let pool = db::require_pool()?;

    let total = posts::count_by_author(&pool, user.id).await?;
    let info = PageInfo::resolve(query.page.as_deref(), total, MY_POSTS_PAGE_SIZE);
    let items = posts::list_by_author(&pool, user.id, info.limit(), info.offset()).await?;

    let layout = load_layout(&mut session, &pool).await?;
    let body = views::blog::my_posts(&layout, &Page::new(items, info));
    Ok(html(session, body))
}

/// POST /post/{slug}/like/ - JSON `{"liked": bool, "total_likes": int}`
pub async fn post_like(session: Session, Path(slug): Path<String>) -> Result<Response, AppError> {
    let user = session.require_user(&post_url(&slug))?;
    let pool = db::require_pool()?;
    let post = posts::find_by_slug(&pool, &slug)
        .await?
        .ok_or(AppError::NotFound)?;

    let state = posts::toggle_like(&pool, post.id, user.id).await?;
    tracing::debug!(user = %user.username, post = %post.slug, liked = state.liked, "like toggled");
    Ok(session.respond(Json(state)))
}

/// GET /post/{slug}/comment/ - nothing to show, back to the post
pub async fn comment_redirect(
    session: Session,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    session.require_user(&post_url(&slug))?;
    Ok(redirect(session, &post_url(&slug)))
}

/// POST /post/{slug}/comment/
pub async fn add_comment(
    mut session: Session,
    Path(slug): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Response, AppError> {
    let user = session.require_user(&post_url(&slug))?;
    let pool = db::require_pool()?;
    let post = posts::find_by_slug(&pool, &slug)
        .await?
        .ok_or(AppError::NotFound)?;

    if form.validate().is_empty() {
        let comment = comments::create(&pool, post.id, user.id, form.content()).await?;
        tracing::info!(user = %user.username, post = %post.slug, comment = comment.id, "comment added");
        session
            .flash(&pool, Level::Success, "Comment added successfully!")
            .await?;
    } else {
        session
            .flash(&pool, Level::Error, "Error adding comment. Please try again.")
            .await?;
    }
    Ok(redirect(session, &post_url(&post.slug)))
}

/// POST /comment/{id}/delete/
pub async fn delete_comment(
    mut session: Session,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let user = session.require_user("/")?;
    let pool = db::require_pool()?;
    let comment = comments::find(&pool, id).await?.ok_or(AppError::NotFound)?;

    if !comment.is_authored_by(&user) {
        tracing::warn!(user = %user.username, comment = comment.id, "rejected deletion of another user's comment");
        session
            .flash(&pool, Level::Error, "You can only delete your own comments.")
            .await?;
        return Ok(redirect(session, "/"));
    }

    let post = posts::find_by_id(&pool, comment.post_id)
        .await?
        .ok_or(AppError::NotFound)?;
    comments::delete(&pool, comment.id).await?;
    tracing::info!(user = %user.username, comment = comment.id, "comment deleted");

    session
        .flash(&pool, Level::Success, "Comment deleted successfully!")
        .await?;
    Ok(redirect(session, &post_url(&post.slug)))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn send(req: Request<Body>) -> axum::response::Response {
        crate::create_app().oneshot(req).await.unwrap()
    }

    fn location(res: &axum::response::Response) -> &str {
        res.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_login() {
        let res = send(Request::get("/create/").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/accounts/login/?next=%2Fcreate%2F");
    }

    #[tokio::test]
    async fn test_my_posts_login_keeps_query() {
        let res = send(Request::get("/my-posts/?page=2").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&res),
            "/accounts/login/?next=%2Fmy-posts%2F%3Fpage%3D2"
        );
    }

    #[tokio::test]
    async fn test_like_requires_login_and_returns_to_post() {
        let res = send(
            Request::post("/post/hello-world/like/")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&res),
            "/accounts/login/?next=%2Fpost%2Fhello-world%2F"
        );
    }

    #[tokio::test]
    async fn test_edit_and_delete_require_login() {
        for uri in ["/post/hello-world/edit/", "/post/hello-world/delete/"] {
            let res = send(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(res.status(), StatusCode::SEE_OTHER, "{uri}");
            assert!(location(&res).starts_with("/accounts/login/?next="));
        }
    }

    #[tokio::test]
    async fn test_comment_delete_is_post_only() {
        let res = send(Request::get("/comment/1/delete/").body(Body::empty()).unwrap()).await;
        assert!(matches!(
            res.status(),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn test_public_pages_unavailable_without_database() {
        for uri in ["/", "/explore/", "/post/hello-world/", "/category/tech/"] {
            let res = send(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let res = send(Request::get("/nope/").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
