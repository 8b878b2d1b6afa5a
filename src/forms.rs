//! Form binding and validation.
//!
//! Each form keeps the raw submitted values so an invalid submission can be
//! re-rendered as typed, and collects errors per field in [`FormErrors`].

use std::collections::{BTreeMap, HashMap};

use axum::extract::Multipart;
use regex::Regex;
use serde::Deserialize;
use sqlx::PgPool;

use crate::db::{
    models::{Post, PostDraft, PostStatus, Profile},
    posts, taxonomy,
};
use crate::error::AppError;
use crate::uploads::{self, UploadedFile, ValidImage};

pub const REQUIRED: &str = "This field is required.";

pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const TITLE_MAX_LEN: usize = 250;
pub const SLUG_MAX_LEN: usize = 250;
pub const EXCERPT_MAX_LEN: usize = 300;
pub const LOCATION_MAX_LEN: usize = 100;
pub const WEBSITE_MAX_LEN: usize = 200;

lazy_static::lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$").unwrap();
    static ref SLUG_REGEX: Regex = Regex::new(r"^[-a-zA-Z0-9_]+$").unwrap();
    // Host is a dotted domain with a TLD, `localhost`, IPv4 or bracketed IPv6.
    static ref URL_REGEX: Regex = Regex::new(
        r"^(?i)https?://(?:[^\s:@/]+(?::[^\s@/]*)?@)?(?:localhost|\d{1,3}(?:\.\d{1,3}){3}|\[[0-9a-f:.]+\]|(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}\.?)(?::\d{1,5})?(?:[/?#]\S*)?$"
    )
    .unwrap();
}

/// Validation errors keyed by field name, plus errors about the form as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
    non_field: Vec<String>,
}

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }
}

fn max_length(errors: &mut FormErrors, field: &'static str, value: &str, max: usize) {
    let len = value.chars().count();
    if len > max {
        errors.add(
            field,
            format!("Ensure this value has at most {max} characters (it has {len})."),
        );
    }
}

/// Lowercase ASCII slug: alphanumerics kept, runs of spaces, hyphens and
/// underscores collapsed to one hyphen, everything else dropped.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_hyphen = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        }
    }
    slug.truncate(SLUG_MAX_LEN);
    slug.trim_end_matches('-').to_string()
}

/// Text and file parts of a multipart body. Text fields may repeat.
#[derive(Debug, Default)]
pub struct MultipartFields {
    text: HashMap<String, Vec<String>>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartFields {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut fields = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid multipart data: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await.map_err(|e| {
                        AppError::BadRequest(format!("Failed to read file data: {}", e))
                    })?;
                    // Browsers send an unselected file input as an empty, unnamed part.
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    fields.files.insert(name, UploadedFile { file_name, bytes });
                }
                None => {
                    let value = field.text().await.map_err(|e| {
                        AppError::BadRequest(format!("Invalid multipart data: {}", e))
                    })?;
                    fields.text.entry(name).or_default().push(value);
                }
            }
        }
        Ok(fields)
    }

    pub fn insert_text(&mut self, name: &str, value: &str) {
        self.text
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn insert_file(&mut self, name: &str, file: UploadedFile) {
        self.files.insert(name.to_string(), file);
    }

    /// First value of a text field, or empty.
    pub fn text(&self, name: &str) -> String {
        self.text
            .get(name)
            .and_then(|values| values.first())
            .cloned()
            .unwrap_or_default()
    }

    pub fn all(&self, name: &str) -> Vec<String> {
        self.text.get(name).cloned().unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

impl SignUpForm {
    /// Field rules; username uniqueness is checked by the caller.
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        let username = self.username.trim();
        let email = self.email.trim();

        if username.is_empty() {
            errors.add("username", REQUIRED);
        } else {
            max_length(&mut errors, "username", username, USERNAME_MAX_LEN);
            if !USERNAME_REGEX.is_match(username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
        }

        if email.is_empty() {
            errors.add("email", REQUIRED);
        } else if !EMAIL_REGEX.is_match(email) {
            errors.add("email", "Enter a valid email address.");
        }

        if self.password1.is_empty() {
            errors.add("password1", REQUIRED);
        }
        if self.password2.is_empty() {
            errors.add("password2", REQUIRED);
        }
        if errors.has("password1") || errors.has("password2") {
            return errors;
        }

        if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn’t match.");
        } else {
            if self.password2.chars().count() < PASSWORD_MIN_LEN {
                errors.add(
                    "password2",
                    format!(
                        "This password is too short. It must contain at least {PASSWORD_MIN_LEN} characters."
                    ),
                );
            }
            if self.password2.chars().all(|c| c.is_ascii_digit()) {
                errors.add("password2", "This password is entirely numeric.");
            }
        }

        errors
    }

    pub fn username(&self) -> &str {
        self.username.trim()
    }

    pub fn email(&self) -> &str {
        self.email.trim()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: String,
}

pub const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

impl LoginForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if self.username.trim().is_empty() {
            errors.add("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }
        errors
    }

    pub fn username(&self) -> &str {
        self.username.trim()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub content: String,
}

impl CommentForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if self.content.trim().is_empty() {
            errors.add("content", REQUIRED);
        }
        errors
    }

    pub fn content(&self) -> &str {
        self.content.trim()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub bio: String,
    pub location: String,
    pub website: String,
    pub profile_picture: Option<UploadedFile>,
}

impl ProfileForm {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            bio: profile.bio.clone(),
            location: profile.location.clone(),
            website: profile.website.clone(),
            profile_picture: None,
        }
    }

    pub fn from_fields(mut fields: MultipartFields) -> Self {
        Self {
            bio: fields.text("bio").trim().to_string(),
            location: fields.text("location").trim().to_string(),
            website: fields.text("website").trim().to_string(),
            profile_picture: fields.take_file("profile_picture"),
        }
    }

    /// On success, the validated new picture if one was uploaded.
    pub fn clean(&self) -> Result<Option<ValidImage>, FormErrors> {
        let mut errors = FormErrors::default();

        max_length(&mut errors, "location", &self.location, LOCATION_MAX_LEN);
        if !self.website.is_empty() {
            max_length(&mut errors, "website", &self.website, WEBSITE_MAX_LEN);
            if !URL_REGEX.is_match(&self.website) {
                errors.add("website", "Enter a valid URL.");
            }
        }

        let picture = match &self.profile_picture {
            Some(file) => match uploads::validate_image(file) {
                Ok(image) => Some(image),
                Err(message) => {
                    errors.add("profile_picture", message);
                    None
                }
            },
            None => None,
        };

        if errors.is_empty() {
            Ok(picture)
        } else {
            Err(errors)
        }
    }

    pub fn apply(&self, profile: &mut Profile) {
        profile.bio = self.bio.clone();
        profile.location = self.location.clone();
        profile.website = self.website.clone();
    }
}

/// Values of the post form as submitted.
#[derive(Debug, Clone)]
pub struct PostForm {
    pub title: String,
    pub slug: String,
    pub category: String,
    pub tags: Vec<String>,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub featured_image: Option<UploadedFile>,
}

impl Default for PostForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            slug: String::new(),
            category: String::new(),
            tags: Vec::new(),
            content: String::new(),
            excerpt: String::new(),
            status: PostStatus::Draft.as_str().to_string(),
            featured_image: None,
        }
    }
}

/// A valid post submission: the row values and an optional new cover image.
#[derive(Debug, Clone)]
pub struct CleanedPost {
    pub draft: PostDraft,
    pub image: Option<ValidImage>,
}

impl PostForm {
    pub fn from_post(post: &Post, tag_ids: &[i64]) -> Self {
        Self {
            title: post.title.clone(),
            slug: post.slug.clone(),
            category: post.category_id.map(|id| id.to_string()).unwrap_or_default(),
            tags: tag_ids.iter().map(i64::to_string).collect(),
            content: post.content.clone(),
            excerpt: post.excerpt.clone(),
            status: post.status.clone(),
            featured_image: None,
        }
    }

    pub fn from_fields(mut fields: MultipartFields) -> Self {
        Self {
            title: fields.text("title").trim().to_string(),
            slug: fields.text("slug").trim().to_string(),
            category: fields.text("category").trim().to_string(),
            tags: fields
                .all("tags")
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            content: fields.text("content").trim().to_string(),
            excerpt: fields.text("excerpt").trim().to_string(),
            status: fields.text("status").trim().to_string(),
            featured_image: fields.take_file("featured_image"),
        }
    }

    pub fn has_tag(&self, id: i64) -> bool {
        let id = id.to_string();
        self.tags.iter().any(|t| *t == id)
    }

    /// Rules that need no database. Returns the parsed category and tag ids.
    fn check_fields(&self, errors: &mut FormErrors) -> (Option<i64>, Vec<i64>, PostStatus) {
        if self.title.is_empty() {
            errors.add("title", REQUIRED);
        } else {
            max_length(errors, "title", &self.title, TITLE_MAX_LEN);
        }

        if !self.slug.is_empty() {
            max_length(errors, "slug", &self.slug, SLUG_MAX_LEN);
            if !SLUG_REGEX.is_match(&self.slug) {
                errors.add(
                    "slug",
                    "Enter a valid “slug” consisting of letters, numbers, underscores or hyphens.",
                );
            }
        } else if !self.title.is_empty() && slugify(&self.title).is_empty() {
            errors.add("slug", "Enter a slug; none can be derived from this title.");
        }

        if self.content.is_empty() {
            errors.add("content", REQUIRED);
        }
        max_length(errors, "excerpt", &self.excerpt, EXCERPT_MAX_LEN);

        let status = match PostStatus::parse(&self.status) {
            Some(status) => status,
            None => {
                let message = if self.status.is_empty() {
                    REQUIRED.to_string()
                } else {
                    format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        self.status
                    )
                };
                errors.add("status", message);
                PostStatus::Draft
            }
        };

        let category_id = if self.category.is_empty() {
            None
        } else {
            match self.category.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add(
                        "category",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    None
                }
            }
        };

        let mut tag_ids = Vec::with_capacity(self.tags.len());
        for raw in &self.tags {
            match raw.parse::<i64>() {
                Ok(id) if !tag_ids.contains(&id) => tag_ids.push(id),
                Ok(_) => {}
                Err(_) => errors.add(
                    "tags",
                    format!("“{raw}” is not a valid value."),
                ),
            }
        }

        (category_id, tag_ids, status)
    }

    /// Full validation against the database. `editing` is the id of the post
    /// being edited, excluded from the slug uniqueness check.
    pub async fn clean(
        &self,
        pool: &PgPool,
        editing: Option<i64>,
    ) -> Result<Result<CleanedPost, FormErrors>, AppError> {
        let mut errors = FormErrors::default();
        let (category_id, tag_ids, status) = self.check_fields(&mut errors);

        if let Some(id) = category_id {
            if !taxonomy::category_exists(pool, id).await? {
                errors.add(
                    "category",
                    "Select a valid choice. That choice is not one of the available choices.",
                );
            }
        }

        let existing = taxonomy::existing_tag_ids(pool, &tag_ids).await?;
        for id in tag_ids.iter().filter(|id| !existing.contains(id)) {
            errors.add(
                "tags",
                format!("Select a valid choice. {id} is not one of the available choices."),
            );
        }

        let slug = if self.slug.is_empty() {
            let base = slugify(&self.title);
            if base.is_empty() {
                String::new()
            } else {
                free_slug(pool, &base, editing).await?
            }
        } else {
            if !errors.has("slug") && posts::slug_exists(pool, &self.slug, editing).await? {
                errors.add("slug", "Post with this Slug already exists.");
            }
            self.slug.clone()
        };

        let image = match &self.featured_image {
            Some(file) => match uploads::validate_image(file) {
                Ok(image) => Some(image),
                Err(message) => {
                    errors.add("featured_image", message);
                    None
                }
            },
            None => None,
        };

        if !errors.is_empty() {
            return Ok(Err(errors));
        }

        Ok(Ok(CleanedPost {
            draft: PostDraft {
                title: self.title.clone(),
                slug,
                category_id,
                tag_ids,
                content: self.content.clone(),
                excerpt: self.excerpt.clone(),
                featured_image: None,
                status,
            },
            image,
        }))
    }
}

/// `base`, or `base-2`, `base-3`, ... whichever is unused first.
async fn free_slug(pool: &PgPool, base: &str, editing: Option<i64>) -> Result<String, AppError> {
    if !posts::slug_exists(pool, base, editing).await? {
        return Ok(base.to_string());
    }
    let mut n = 2u32;
    loop {
        let suffix = format!("-{n}");
        let mut candidate = base.to_string();
        candidate.truncate(SLUG_MAX_LEN - suffix.len());
        candidate.push_str(&suffix);
        if !posts::slug_exists(pool, &candidate, editing).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn signup(username: &str, email: &str, p1: &str, p2: &str) -> SignUpForm {
        SignUpForm {
            username: username.to_string(),
            email: email.to_string(),
            password1: p1.to_string(),
            password2: p2.to_string(),
        }
    }

    #[test]
    fn test_valid_signup() {
        let form = signup("jane.doe+blog", "jane@example.com", "s3cretpass", "s3cretpass");
        assert!(form.validate().is_empty());
    }

    #[test]
    fn test_signup_requires_all_fields() {
        let errors = SignUpForm::default().validate();
        for field in ["username", "email", "password1", "password2"] {
            assert_eq!(errors.field(field), [REQUIRED.to_string()], "{field}");
        }
    }

    #[test]
    fn test_signup_rejects_bad_username_and_email() {
        let errors = signup("jane doe!", "not-an-email", "s3cretpass", "s3cretpass").validate();
        assert!(errors.has("username"));
        assert_eq!(errors.field("email"), ["Enter a valid email address.".to_string()]);
    }

    #[test]
    fn test_signup_username_length() {
        let long = "a".repeat(151);
        let errors = signup(&long, "a@b.co", "s3cretpass", "s3cretpass").validate();
        assert!(errors.field("username")[0].contains("at most 150"));
    }

    #[test]
    fn test_signup_password_rules() {
        let errors = signup("jane", "a@b.co", "abc", "abd").validate();
        assert_eq!(errors.field("password2").len(), 1);
        assert!(errors.field("password2")[0].contains("didn’t match"));

        let errors = signup("jane", "a@b.co", "1234", "1234").validate();
        assert_eq!(errors.field("password2").len(), 2);

        let errors = signup("jane", "a@b.co", "12345678", "12345678").validate();
        assert_eq!(
            errors.field("password2"),
            ["This password is entirely numeric.".to_string()]
        );
    }

    #[test]
    fn test_login_requires_fields() {
        let errors = LoginForm::default().validate();
        assert!(errors.has("username"));
        assert!(errors.has("password"));
        assert!(errors.non_field().is_empty());
    }

    #[test]
    fn test_comment_must_not_be_blank() {
        let form = CommentForm {
            content: "   \n".to_string(),
        };
        assert!(form.validate().has("content"));
        let form = CommentForm {
            content: " Nice post ".to_string(),
        };
        assert!(form.validate().is_empty());
        assert_eq!(form.content(), "Nice post");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust  --  2024 tips_and_tricks "), "rust-2024-tips-and-tricks");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify(&"x".repeat(300)).len(), SLUG_MAX_LEN);
    }

    #[test]
    fn test_post_form_field_rules() {
        let form = PostForm {
            title: "x".repeat(251),
            slug: "not a slug".to_string(),
            category: "abc".to_string(),
            tags: vec!["1".to_string(), "one".to_string()],
            status: "archived".to_string(),
            ..PostForm::default()
        };
        let mut errors = FormErrors::default();
        let (category_id, tag_ids, _) = form.check_fields(&mut errors);
        assert!(errors.has("title"));
        assert!(errors.has("slug"));
        assert!(errors.has("category"));
        assert!(errors.has("tags"));
        assert!(errors.has("status"));
        assert_eq!(errors.field("content"), [REQUIRED.to_string()]);
        assert_eq!(category_id, None);
        assert_eq!(tag_ids, vec![1]);
    }

    #[test]
    fn test_post_form_blank_slug_needs_sluggable_title() {
        let form = PostForm {
            title: "???".to_string(),
            content: "body".to_string(),
            ..PostForm::default()
        };
        let mut errors = FormErrors::default();
        form.check_fields(&mut errors);
        assert!(errors.has("slug"));
    }

    #[test]
    fn test_post_form_reads_multipart_fields() {
        let mut fields = MultipartFields::default();
        fields.insert_text("title", "  My Post ");
        fields.insert_text("tags", "3");
        fields.insert_text("tags", "5");
        fields.insert_text("status", "published");
        fields.insert_file(
            "featured_image",
            UploadedFile {
                file_name: "a.png".to_string(),
                bytes: Bytes::from_static(b"\x89PNG"),
            },
        );

        let form = PostForm::from_fields(fields);
        assert_eq!(form.title, "My Post");
        assert!(form.has_tag(3) && form.has_tag(5) && !form.has_tag(4));
        assert_eq!(form.status, "published");
        assert!(form.featured_image.is_some());
    }

    #[test]
    fn test_profile_form_rules() {
        let form = ProfileForm {
            location: "l".repeat(101),
            website: "ftp://example.com".to_string(),
            ..ProfileForm::default()
        };
        let errors = form.clean().unwrap_err();
        assert!(errors.has("location"));
        assert_eq!(errors.field("website"), ["Enter a valid URL.".to_string()]);

        let form = ProfileForm {
            bio: "Writer".to_string(),
            website: "https://example.com/me".to_string(),
            ..ProfileForm::default()
        };
        assert!(matches!(form.clean(), Ok(None)));
    }

    #[test]
    fn test_website_hosts() {
        for ok in [
            "http://localhost:8000",
            "http://localhost/blog/",
            "https://127.0.0.1:8080/x",
            "http://[::1]:3000/",
            "https://sub.example.co.uk/path?q=1#top",
            "HTTPS://EXAMPLE.COM",
        ] {
            assert!(URL_REGEX.is_match(ok), "{ok}");
        }
        for bad in [
            "http://",
            "http://example",
            "https://exa mple.com",
            "javascript:alert(1)",
            "//example.com",
        ] {
            assert!(!URL_REGEX.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn test_profile_form_rejects_bad_picture() {
        let form = ProfileForm {
            profile_picture: Some(UploadedFile {
                file_name: "me.png".to_string(),
                bytes: Bytes::from_static(b"not an image"),
            }),
            ..ProfileForm::default()
        };
        assert!(form.clean().unwrap_err().has("profile_picture"));
    }
}
