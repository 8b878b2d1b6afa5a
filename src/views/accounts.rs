use crate::db::models::{PostCard, Profile, User, UserStats};
use crate::forms::{FormErrors, ProfileForm, SignUpForm};
use crate::uploads::media_url;

use super::{
    escape_html, field_errors, format_date, input_field, linebreaks, non_field_errors, page,
    textarea_field, Layout,
};

pub fn signup(layout: &Layout, form: &SignUpForm, errors: &FormErrors) -> String {
    let body = format!(
        r#"<h1>Create an account</h1>
    <form method="post" action="/accounts/signup/">
      {non_field}
      {username}
      {email}
      {password1}
      {password2}
      <button type="submit">Sign up</button>
    </form>
    <p>Already have an account? <a href="/accounts/login/">Log in</a></p>"#,
        non_field = non_field_errors(errors),
        username = input_field(
            errors,
            "username",
            "Username",
            "text",
            &form.username,
            r#"maxlength="150" placeholder="Username" required"#
        ),
        email = input_field(errors, "email", "Email", "email", &form.email, r#"placeholder="Email" required"#),
        password1 = input_field(errors, "password1", "Password", "password", "", r#"placeholder="Password" required"#),
        password2 = input_field(
            errors,
            "password2",
            "Confirm password",
            "password",
            "",
            r#"placeholder="Confirm Password" required"#
        ),
    );
    page(layout, "Sign up", &body)
}

pub fn login(layout: &Layout, username: &str, next: &str, errors: &FormErrors) -> String {
    let body = format!(
        r#"<h1>Log in</h1>
    <form method="post" action="/accounts/login/">
      {non_field}
      {username}
      {password}
      <input type="hidden" name="next" value="{next}">
      <button type="submit">Log in</button>
    </form>
    <p>New here? <a href="/accounts/signup/">Create an account</a></p>"#,
        non_field = non_field_errors(errors),
        username = input_field(errors, "username", "Username", "text", username, r#"placeholder="Username" required"#),
        password = input_field(errors, "password", "Password", "password", "", r#"placeholder="Password" required"#),
        next = escape_html(next),
    );
    page(layout, "Log in", &body)
}

fn avatar(profile: &Profile) -> String {
    match &profile.profile_picture {
        Some(path) => format!(
            r#"<img class="avatar" src="{}" alt="" width="120" height="120">"#,
            escape_html(&media_url(path))
        ),
        None => String::new(),
    }
}

pub fn profile(
    layout: &Layout,
    user: &User,
    profile: &Profile,
    stats: &UserStats,
    recent: &[PostCard],
) -> String {
    let website = if profile.website.is_empty() {
        String::new()
    } else {
        format!(
            r#"<p><a href="{0}" rel="nofollow noopener">{0}</a></p>"#,
            escape_html(&profile.website)
        )
    };
    let location = if profile.location.is_empty() {
        String::new()
    } else {
        format!(r#"<p class="meta">{}</p>"#, escape_html(&profile.location))
    };

    let recent_items: String = recent
        .iter()
        .map(|card| {
            format!(
                r#"<li><a href="/post/{}/">{}</a> <span class="meta">{} &middot; {}</span></li>"#,
                card.post.slug,
                escape_html(&card.post.title),
                card.post.status().label(),
                format_date(&card.post.created_at)
            )
        })
        .collect();
    let recent_html = if recent.is_empty() {
        r#"<p class="empty">No posts yet.</p>"#.to_string()
    } else {
        format!("<ul>{recent_items}</ul>")
    };

    let body = format!(
        r#"<section class="profile">
      {avatar}
      <h1>{username}</h1>
      <p class="meta">{email} &middot; Member since {joined}</p>
      {location}
      {website}
      <div class="bio">{bio}</div>
      <p><a href="/accounts/profile/edit/">Edit profile</a></p>
    </section>
    <section class="stats">
      <h2>Stats</h2>
      <ul>
        <li>{total_posts} posts ({published_posts} published)</li>
        <li>{total_views} views</li>
        <li>{total_likes} likes received</li>
        <li>{total_comments} comments written</li>
      </ul>
    </section>
    <section>
      <h2>Recent posts</h2>
      {recent_html}
    </section>"#,
        avatar = avatar(profile),
        username = escape_html(&user.username),
        email = escape_html(&user.email),
        joined = format_date(&user.date_joined),
        bio = linebreaks(&profile.bio),
        total_posts = stats.total_posts,
        published_posts = stats.published_posts,
        total_views = stats.total_views,
        total_likes = stats.total_likes,
        total_comments = stats.total_comments,
    );
    page(layout, "Profile", &body)
}

pub fn profile_edit(
    layout: &Layout,
    form: &ProfileForm,
    errors: &FormErrors,
    profile: &Profile,
) -> String {
    let body = format!(
        r#"<h1>Edit profile</h1>
    <form method="post" action="/accounts/profile/edit/" enctype="multipart/form-data">
      {non_field}
      <div class="field">
        <label for="id_profile_picture">Profile picture</label>
        {avatar}
        <input type="file" name="profile_picture" id="id_profile_picture" accept="image/*">
        {picture_errors}
      </div>
      {bio}
      {location}
      {website}
      <button type="submit">Save</button>
      <a href="/accounts/profile/">Cancel</a>
    </form>"#,
        non_field = non_field_errors(errors),
        avatar = avatar(profile),
        picture_errors = field_errors(errors, "profile_picture"),
        bio = textarea_field(errors, "bio", "Bio", &form.bio, 4, "Tell us about yourself..."),
        location = input_field(
            errors,
            "location",
            "Location",
            "text",
            &form.location,
            r#"maxlength="100" placeholder="City, Country""#
        ),
        website = input_field(
            errors,
            "website",
            "Website",
            "url",
            &form.website,
            r#"placeholder="https://yourwebsite.com""#
        ),
    );
    page(layout, "Edit profile", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout {
            site_name: "BlogHub".to_string(),
            user: None,
            messages: Vec::new(),
        }
    }

    #[test]
    fn test_signup_keeps_username_but_not_passwords() {
        let form = SignUpForm {
            username: "jane".to_string(),
            email: "jane@example.com".to_string(),
            password1: "secret-pass".to_string(),
            password2: "secret-pass".to_string(),
        };
        let mut errors = FormErrors::default();
        errors.add("username", "A user with that username already exists.");
        let html = signup(&layout(), &form, &errors);
        assert!(html.contains(r#"value="jane""#));
        assert!(!html.contains("secret-pass"));
        assert!(html.contains("A user with that username already exists."));
    }

    #[test]
    fn test_login_shows_non_field_error_and_next() {
        let mut errors = FormErrors::default();
        errors.add_non_field("Please enter a correct username and password.");
        let html = login(&layout(), "jane", "/my-posts/", &errors);
        assert!(html.contains(r#"<ul class="errorlist"><li>Please enter a correct username and password.</li></ul>"#));
        assert!(html.contains(r#"name="next" value="/my-posts/""#));
    }
}
