use axum::{
    extract::{Multipart, Query},
    response::Response,
    Form,
};
use serde::Deserialize;
use sqlx::PgPool;

use crate::db::{self, models::NewUser, posts, users};
use crate::error::{is_unique_violation, AppError};
use crate::forms::{FormErrors, LoginForm, MultipartFields, ProfileForm, SignUpForm, INVALID_LOGIN};
use crate::passwords;
use crate::session::{is_safe_redirect, Level, Session};
use crate::uploads::{self, MediaFolder};
use crate::views::{self, Layout};

use super::{html, load_layout, redirect};

const PROFILE_PATH: &str = "/accounts/profile/";
const PROFILE_EDIT_PATH: &str = "/accounts/profile/edit/";
const RECENT_POSTS: i64 = 5;
const USERNAME_TAKEN: &str = "A user with that username already exists.";

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

async fn render_signup(
    mut session: Session,
    pool: Option<&PgPool>,
    form: &SignUpForm,
    errors: &FormErrors,
) -> Result<Response, AppError> {
    let layout = Layout::load(&mut session, pool).await?;
    let body = views::accounts::signup(&layout, form, errors);
    Ok(html(session, body))
}

/// GET /accounts/signup/
pub async fn signup_form(session: Session) -> Result<Response, AppError> {
    if session.is_authenticated() {
        return Ok(redirect(session, "/"));
    }
    let pool = db::get_pool();
    render_signup(
        session,
        pool.as_deref(),
        &SignUpForm::default(),
        &FormErrors::default(),
    )
    .await
}

/// POST /accounts/signup/
pub async fn signup_submit(
    mut session: Session,
    Form(form): Form<SignUpForm>,
) -> Result<Response, AppError> {
    if session.is_authenticated() {
        return Ok(redirect(session, "/"));
    }

    let mut errors = form.validate();
    let pool = db::get_pool();
    if let Some(pool) = &pool {
        if !errors.has("username") && users::username_exists(pool, form.username()).await? {
            errors.add("username", USERNAME_TAKEN);
        }
    }
    if !errors.is_empty() {
        return render_signup(session, pool.as_deref(), &form, &errors).await;
    }

    let pool = db::require_pool()?;
    let new_user = NewUser {
        username: form.username().to_string(),
        email: form.email().to_string(),
        password_hash: passwords::hash_password(form.password1.clone()).await?,
        is_staff: false,
    };
    let user = match users::create(&pool, &new_user).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            errors.add("username", USERNAME_TAKEN);
            return render_signup(session, Some(&pool), &form, &errors).await;
        }
        Err(e) => return Err(e.into()),
    };
    users::get_or_create_profile(&pool, user.id).await?;
    tracing::info!(user = %user.username, "account created");

    session.login(&pool, user).await?;
    session
        .flash(&pool, Level::Success, "Account created successfully!")
        .await?;
    Ok(redirect(session, "/"))
}

async fn render_login(
    mut session: Session,
    pool: Option<&PgPool>,
    username: &str,
    next: &str,
    errors: &FormErrors,
) -> Result<Response, AppError> {
    let layout = Layout::load(&mut session, pool).await?;
    let body = views::accounts::login(&layout, username, next, errors);
    Ok(html(session, body))
}

/// GET /accounts/login/
pub async fn login_form(
    session: Session,
    Query(query): Query<NextQuery>,
) -> Result<Response, AppError> {
    if session.is_authenticated() {
        return Ok(redirect(session, "/"));
    }
    let pool = db::get_pool();
    let next = query.next.unwrap_or_default();
    render_login(session, pool.as_deref(), "", &next, &FormErrors::default()).await
}

/// POST /accounts/login/ - follows `next` only when it stays on this site
pub async fn login_submit(
    mut session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if session.is_authenticated() {
        return Ok(redirect(session, "/"));
    }

    let mut errors = form.validate();
    if !errors.is_empty() {
        let pool = db::get_pool();
        return render_login(session, pool.as_deref(), form.username(), &form.next, &errors)
            .await;
    }

    let pool = db::require_pool()?;
    let user = users::find_by_username(&pool, form.username()).await?;
    let verified = passwords::verify_password(
        form.password.clone(),
        user.as_ref().map(|u| u.password_hash.clone()),
    )
    .await;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            tracing::warn!(username = %form.username(), "failed login attempt");
            errors.add_non_field(INVALID_LOGIN);
            return render_login(session, Some(&pool), form.username(), &form.next, &errors)
                .await;
        }
    };

    let username = user.username.clone();
    session.login(&pool, user).await?;
    session
        .flash(&pool, Level::Success, format!("Welcome back, {}!", username))
        .await?;

    let target = if is_safe_redirect(&form.next) {
        form.next.as_str()
    } else {
        "/"
    };
    Ok(redirect(session, target))
}

/// GET or POST /accounts/logout/
pub async fn logout(mut session: Session) -> Result<Response, AppError> {
    let pool = db::require_pool()?;
    session.logout(&pool).await?;
    session
        .flash(&pool, Level::Info, "Logged out successfully.")
        .await?;
    Ok(redirect(session, "/"))
}

/// GET /accounts/profile/
pub async fn profile(mut session: Session) -> Result<Response, AppError> {
    let user = session.require_user(PROFILE_PATH)?;
    let pool = db::require_pool()?;

    let (profile, _) = users::get_or_create_profile(&pool, user.id).await?;
    let stats = users::stats(&pool, user.id).await?;
    let recent = posts::list_by_author(&pool, user.id, RECENT_POSTS, 0).await?;

    let layout = load_layout(&mut session, &pool).await?;
    let body = views::accounts::profile(&layout, &user, &profile, &stats, &recent);
    Ok(html(session, body))
}

/// GET /accounts/profile/edit/
pub async fn profile_edit_form(mut session: Session) -> Result<Response, AppError> {
    let user = session.require_user(PROFILE_EDIT_PATH)?;
    let pool = db::require_pool()?;
    let (profile, _) = users::get_or_create_profile(&pool, user.id).await?;

    let layout = load_layout(&mut session, &pool).await?;
    let body = views::accounts::profile_edit(
        &layout,
        &ProfileForm::from_profile(&profile),
        &FormErrors::default(),
        &profile,
    );
    Ok(html(session, body))
}

/// POST /accounts/profile/edit/
pub async fn profile_edit_submit(
    mut session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let user = session.require_user(PROFILE_EDIT_PATH)?;
    let pool = db::require_pool()?;
    let (mut profile, _) = users::get_or_create_profile(&pool, user.id).await?;
    let form = ProfileForm::from_fields(MultipartFields::read(multipart).await?);

    let picture = match form.clean() {
        Ok(picture) => picture,
        Err(errors) => {
            let mut layout = load_layout(&mut session, &pool).await?;
            layout.push(Level::Error, "Please correct the errors below.");
            let body = views::accounts::profile_edit(&layout, &form, &errors, &profile);
            return Ok(html(session, body));
        }
    };

    let replaced = match &picture {
        Some(image) => {
            let stored = uploads::store_image(MediaFolder::ProfilePics, image).await?;
            profile.profile_picture.replace(stored)
        }
        None => None,
    };
    form.apply(&mut profile);
    users::update_profile(&pool, &profile).await?;
    if let Some(old) = replaced {
        uploads::remove_image(&old).await;
    }

    tracing::info!(user = %user.username, "profile updated");
    session
        .flash(&pool, Level::Success, "Profile updated successfully!")
        .await?;
    Ok(redirect(session, PROFILE_PATH))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn send(req: Request<Body>) -> axum::response::Response {
        crate::create_app().oneshot(req).await.unwrap()
    }

    async fn body_text(res: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn form_post(uri: &str, body: &'static str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_signup_page_renders_without_database() {
        let res = send(Request::get("/accounts/signup/").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains(r#"name="password2""#));
    }

    #[tokio::test]
    async fn test_signup_rerenders_with_errors() {
        let res = send(form_post(
            "/accounts/signup/",
            "username=bad+name%21&email=nope&password1=12345678&password2=12345678",
        ))
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("Enter a valid username."));
        assert!(html.contains("Enter a valid email address."));
        assert!(html.contains("This password is entirely numeric."));
        assert!(html.contains(r#"value="bad name!""#));
    }

    #[tokio::test]
    async fn test_login_page_carries_next() {
        let res = send(
            Request::get("/accounts/login/?next=%2Fcreate%2F")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains(r#"name="next" value="/create/""#));
    }

    #[tokio::test]
    async fn test_login_requires_fields() {
        let res = send(form_post("/accounts/login/", "username=&password=")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("This field is required."));
    }

    #[tokio::test]
    async fn test_login_without_database_is_unavailable() {
        let res = send(form_post("/accounts/login/", "username=jane&password=secret123")).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_profile_requires_login() {
        for uri in ["/accounts/profile/", "/accounts/profile/edit/"] {
            let res = send(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(res.status(), StatusCode::SEE_OTHER, "{uri}");
            assert!(res.headers()[header::LOCATION]
                .to_str()
                .unwrap()
                .starts_with("/accounts/login/?next=%2Faccounts%2Fprofile%2F"));
        }
    }
}
